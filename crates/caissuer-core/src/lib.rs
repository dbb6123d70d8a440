pub mod condition;
pub mod error;
pub mod events;
pub mod resource;
pub mod time;

pub use condition::{
    Condition, ConditionStatus, Conditions, CONDITION_READY, REASON_FAILED, REASON_ISSUED,
};
pub use error::{CoreError, Result};
pub use events::{AuditEvent, EventBroadcaster, EventRecorder, EventSeverity, ObjectRef};
pub use resource::{Issuer, IssuerSpec, IssuerStatus, ObjectMeta, ResourceKey};
pub use time::{format_iso_duration, parse_iso_duration, Clock, FixedClock, SystemClock};
