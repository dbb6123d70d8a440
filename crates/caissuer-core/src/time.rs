use crate::error::{CoreError, Result};
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};

/// Source of the current instant.
///
/// Reconciliation reads the clock once per pass so every decision in that pass
/// uses the same `now`.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock backed by `OffsetDateTime::now_utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Parse an ISO 8601 duration of the form `[-]P[nD][T[nH][nM][nS]]`.
///
/// Years, months and weeks are rejected since they have no fixed length.
pub fn parse_iso_duration(s: &str) -> Result<Duration> {
    let invalid = || CoreError::invalid_duration(s);

    let trimmed = s.trim();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let rest = rest.strip_prefix('P').ok_or_else(invalid)?;

    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return Err(invalid());
            }
            (date, Some(time))
        }
        None => (rest, None),
    };

    let mut total: i64 = 0;
    let mut components = 0;

    for (value, unit) in split_components(date_part).ok_or_else(invalid)? {
        let unit_secs = match unit {
            'D' => 86_400,
            _ => return Err(invalid()),
        };
        total = add_component(total, value, unit_secs).ok_or_else(invalid)?;
        components += 1;
    }

    if let Some(time_part) = time_part {
        for (value, unit) in split_components(time_part).ok_or_else(invalid)? {
            let unit_secs = match unit {
                'H' => 3_600,
                'M' => 60,
                'S' => 1,
                _ => return Err(invalid()),
            };
            total = add_component(total, value, unit_secs).ok_or_else(invalid)?;
            components += 1;
        }
    }

    if components == 0 {
        return Err(invalid());
    }

    let total = Duration::seconds(total);
    Ok(if negative { -total } else { total })
}

/// `total + value * unit_secs`, or `None` on overflow.
fn add_component(total: i64, value: i64, unit_secs: i64) -> Option<i64> {
    value.checked_mul(unit_secs)?.checked_add(total)
}

fn split_components(part: &str) -> Option<Vec<(i64, char)>> {
    let mut out = Vec::new();
    let mut digits = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            if digits.is_empty() {
                return None;
            }
            out.push((digits.parse().ok()?, c));
            digits.clear();
        }
    }
    if !digits.is_empty() {
        return None;
    }
    Some(out)
}

/// Format a duration as ISO 8601, dropping zero components.
///
/// Sub-second precision is truncated.
pub fn format_iso_duration(duration: Duration) -> String {
    let negative = duration.is_negative();
    let mut secs = duration.whole_seconds().unsigned_abs();

    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3_600;
    secs %= 3_600;
    let minutes = secs / 60;
    secs %= 60;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || secs > 0 || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if secs > 0 || (hours == 0 && minutes == 0) {
            out.push_str(&format!("{secs}S"));
        }
    }
    out
}

/// Serde adapter for `Option<time::Duration>` stored as ISO 8601 strings.
pub mod iso_duration_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_str(&super::format_iso_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        opt.map(|s| super::parse_iso_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Serde adapter for a required `time::Duration` stored as an ISO 8601 string.
pub mod iso_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_iso_duration(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_iso_duration(&s).map_err(serde::de::Error::custom)
    }
}
