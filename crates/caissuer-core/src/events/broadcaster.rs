//! Event recorder backed by a tokio broadcast channel.

use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use super::types::{AuditEvent, EventSeverity, ObjectRef};

/// Default buffer size for the broadcast channel.
/// Events beyond this limit will cause older events to be dropped for slow receivers.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default component name stamped on recorded events.
const DEFAULT_SOURCE: &str = "issuer-controller";

/// Sink for audit events about issuers.
///
/// Implementations must be safe to call from concurrent reconciles of
/// distinct keys. `at` is the instant the reconcile pass observed.
pub trait EventRecorder: Send + Sync {
    fn record(
        &self,
        object: &ObjectRef,
        severity: EventSeverity,
        reason: &str,
        message: &str,
        at: OffsetDateTime,
    );
}

/// Broadcaster for audit events.
///
/// Cheap to clone; all clones publish into the same channel. Recording never
/// blocks and never fails: with no subscribers the event is dropped.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<AuditEvent>,
    source: Arc<str>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new broadcaster with custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            source: Arc::from(DEFAULT_SOURCE),
        }
    }

    /// Create a new broadcaster wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Override the component name stamped on events.
    pub fn with_source(mut self, source: impl AsRef<str>) -> Self {
        self.source = Arc::from(source.as_ref());
        self
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn send(&self, event: AuditEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    /// Subscribe to events.
    ///
    /// Events sent before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventRecorder for EventBroadcaster {
    fn record(
        &self,
        object: &ObjectRef,
        severity: EventSeverity,
        reason: &str,
        message: &str,
        at: OffsetDateTime,
    ) {
        let event = AuditEvent::new(
            object.clone(),
            severity,
            reason,
            message,
            self.source.as_ref(),
            at,
        );
        tracing::trace!(object = %object, severity = %severity, reason, "audit event recorded");
        self.send(event);
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("source", &self.source)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
