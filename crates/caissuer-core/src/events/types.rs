//! Event types recorded against issuer resources.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::resource::ResourceKey;

/// Kind name used in object references for issuers.
pub const ISSUER_KIND: &str = "Issuer";

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Informational outcome (e.g. certificate issued).
    Info,
    /// Failure worth an operator's attention.
    Warning,
}

impl EventSeverity {
    /// Returns the string representation of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Info => "Normal",
            EventSeverity::Warning => "Warning",
        }
    }
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to the object an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn issuer(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ISSUER_KIND.to_string(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.namespace.clone(), self.name.clone())
    }
}

impl From<&ResourceKey> for ObjectRef {
    fn from(key: &ResourceKey) -> Self {
        Self::issuer(key.namespace.clone(), key.name.clone())
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// A single audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub object: ObjectRef,
    pub severity: EventSeverity,
    pub reason: String,
    pub message: String,
    /// Name of the component that emitted the event
    pub source: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl AuditEvent {
    pub fn new(
        object: ObjectRef,
        severity: EventSeverity,
        reason: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<String>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            object,
            severity,
            reason: reason.into(),
            message: message.into(),
            source: source.into(),
            timestamp,
        }
    }
}
