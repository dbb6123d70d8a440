//! Default resolution for issuer timing parameters.

use caissuer_core::IssuerSpec;
use time::Duration;

/// Validity of a CA certificate when the spec leaves it unset (3 years).
pub const DEFAULT_CERT_DURATION: Duration = Duration::days(365 * 3);

/// Fraction of the validity reserved as renewal lead time when `renewBefore`
/// is unset or invalid.
pub const DEFAULT_RENEWAL_RATIO: f64 = 2.0 / 3.0;

/// Policy constants used to fill and repair timing fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenewalPolicy {
    pub default_duration: Duration,
    /// Must be in `(0, 1]`.
    pub renewal_ratio: f64,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            default_duration: DEFAULT_CERT_DURATION,
            renewal_ratio: DEFAULT_RENEWAL_RATIO,
        }
    }
}

impl RenewalPolicy {
    pub fn new(default_duration: Duration, renewal_ratio: f64) -> Result<Self, String> {
        if default_duration <= Duration::ZERO {
            return Err("default duration must be > 0".into());
        }
        if !(renewal_ratio > 0.0 && renewal_ratio <= 1.0) {
            return Err(format!("renewal ratio must be in (0, 1], got {renewal_ratio}"));
        }
        Ok(Self {
            default_duration,
            renewal_ratio,
        })
    }

    /// `duration * renewal_ratio`, rounded to whole seconds and kept within
    /// `(0, duration]`.
    pub fn renew_before_for(&self, duration: Duration) -> Duration {
        let secs = (duration.as_seconds_f64() * self.renewal_ratio).round();
        let renew_before = Duration::saturating_seconds_f64(secs);
        if renew_before <= Duration::ZERO || renew_before > duration {
            duration
        } else {
            renew_before
        }
    }
}

/// Timing fields after defaulting; both are guaranteed set and valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTiming {
    pub duration: Duration,
    pub renew_before: Duration,
}

impl ResolvedTiming {
    /// Window the CA engine floors `not_before` to.
    pub fn rounding(&self) -> Duration {
        self.duration - self.renew_before
    }
}

/// Fill unset timing fields and repair invalid combinations in place.
///
/// Only the working copy of the spec for the current pass is touched; the
/// stored spec is never rewritten. Applying it twice is a no-op.
pub fn apply_defaults(spec: &mut IssuerSpec, policy: &RenewalPolicy) -> ResolvedTiming {
    let duration = match spec.duration {
        Some(d) if d > Duration::ZERO => d,
        _ => policy.default_duration,
    };

    let renew_before = match spec.renew_before {
        Some(rb) if rb > Duration::ZERO && rb <= duration => rb,
        _ => policy.renew_before_for(duration),
    };

    spec.duration = Some(duration);
    spec.renew_before = Some(renew_before);

    ResolvedTiming {
        duration,
        renew_before,
    }
}
