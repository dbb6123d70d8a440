//! Typed status conditions attached to an issuer.
//!
//! Conditions are kept as an ordered set with at most one entry per type.
//! Merging a condition replaces the entry of the same type in place and keeps
//! its `last_transition_time` unless the status or reason actually changed.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Condition type reporting whether the issuer holds a usable CA certificate.
pub const CONDITION_READY: &str = "Ready";

/// Reason recorded when the certificate was issued (or is still current).
pub const REASON_ISSUED: &str = "Issued";

/// Reason recorded when reconciliation failed.
pub const REASON_FAILED: &str = "Failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_transition_time: OffsetDateTime,
}

impl Condition {
    pub fn new(
        condition_type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
        }
    }

    /// `Ready=True, reason=Issued` with an empty message.
    pub fn ready(now: OffsetDateTime) -> Self {
        Self::new(CONDITION_READY, ConditionStatus::True, REASON_ISSUED, "", now)
    }

    /// `Ready=False, reason=Failed` carrying the failure detail.
    pub fn not_ready(message: impl Into<String>, now: OffsetDateTime) -> Self {
        Self::new(
            CONDITION_READY,
            ConditionStatus::False,
            REASON_FAILED,
            message,
            now,
        )
    }

    fn is_transition_from(&self, previous: &Condition) -> bool {
        self.status != previous.status || self.reason != previous.reason
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.condition_type == condition_type)
    }

    /// Merge a condition by type.
    ///
    /// Returns `true` when the condition transitioned (new type, or status or
    /// reason changed).
    pub fn set(&mut self, mut condition: Condition) -> bool {
        match self
            .0
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) => {
                let transitioned = condition.is_transition_from(existing);
                if !transitioned {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
                transitioned
            }
            None => {
                self.0.push(condition);
                true
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.get(CONDITION_READY)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }
}
