//! Ready condition bookkeeping and status persistence.

use std::sync::Arc;

use caissuer_core::{Condition, EventRecorder, EventSeverity, Issuer, IssuerStatus, ObjectRef};
use caissuer_storage::{DynIssuerStore, IssuerStore, StorageError};
use time::OffsetDateTime;

/// Writes the outcome of a reconcile pass.
///
/// Each entry point merges the Ready condition into the given working status,
/// records one audit event and persists the status in a single write guarded
/// by the resource version the issuer was read at.
#[derive(Clone)]
pub struct StatusReporter {
    store: DynIssuerStore,
    recorder: Arc<dyn EventRecorder>,
}

impl StatusReporter {
    pub fn new(store: DynIssuerStore, recorder: Arc<dyn EventRecorder>) -> Self {
        Self { store, recorder }
    }

    /// `Ready=True, reason=Issued`.
    pub async fn report_success(
        &self,
        issuer: &Issuer,
        status: IssuerStatus,
        now: OffsetDateTime,
    ) -> Result<Issuer, StorageError> {
        self.report(issuer, status, Condition::ready(now), EventSeverity::Info, now)
            .await
    }

    /// `Ready=False, reason=Failed` with `message` as detail.
    pub async fn report_failure(
        &self,
        issuer: &Issuer,
        status: IssuerStatus,
        message: &str,
        now: OffsetDateTime,
    ) -> Result<Issuer, StorageError> {
        self.report(
            issuer,
            status,
            Condition::not_ready(message, now),
            EventSeverity::Warning,
            now,
        )
        .await
    }

    async fn report(
        &self,
        issuer: &Issuer,
        mut status: IssuerStatus,
        condition: Condition,
        severity: EventSeverity,
        now: OffsetDateTime,
    ) -> Result<Issuer, StorageError> {
        let key = issuer.key();
        let reason = condition.reason.clone();
        let message = condition.message.clone();

        if status.conditions.set(condition) {
            tracing::debug!(issuer = %key, reason = %reason, "ready condition transitioned");
        }

        self.recorder
            .record(&ObjectRef::from(&key), severity, &reason, &message, now);

        self.store
            .update_status(&key, issuer.metadata.resource_version, &status)
            .await
    }
}
