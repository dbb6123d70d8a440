//! Audit event sink for issuer reconciliation.
//!
//! Every reconcile pass reports its outcome as an [`AuditEvent`] through an
//! [`EventRecorder`]. The recorder is handed to the controller explicitly, so
//! tests can subscribe to a private [`EventBroadcaster`] and inspect what was
//! emitted.
//!
//! # Example
//!
//! ```
//! use caissuer_core::events::{EventBroadcaster, EventRecorder, EventSeverity, ObjectRef};
//! use time::OffsetDateTime;
//!
//! let broadcaster = EventBroadcaster::new();
//! let mut receiver = broadcaster.subscribe();
//!
//! let object = ObjectRef::issuer("default", "root-ca");
//! broadcaster.record(&object, EventSeverity::Info, "Issued", "", OffsetDateTime::UNIX_EPOCH);
//!
//! let event = receiver.try_recv().unwrap();
//! assert_eq!(event.reason, "Issued");
//! ```

pub mod broadcaster;
pub mod types;

pub use broadcaster::{EventBroadcaster, EventRecorder};
pub use types::{AuditEvent, EventSeverity, ObjectRef};
