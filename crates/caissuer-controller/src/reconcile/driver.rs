//! One reconcile pass for a single issuer.

use std::future::Future;
use std::sync::Arc;

use caissuer_ca::{encode_certificate_pem, CertificateRequest, DynCaEngine, Subject};
use caissuer_core::{Clock, EventRecorder, Issuer, IssuerStatus, ResourceKey, SystemClock};
use caissuer_storage::{DynIssuerStore, IssuerStore};
use time::Duration;
use tokio_util::sync::CancellationToken;

use super::defaults::{apply_defaults, RenewalPolicy};
use super::renewal::evaluate_renewal;
use super::status::StatusReporter;
use crate::error::ReconcileError;

/// Scheduling recommendation returned to the host after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileAction {
    /// Run again after this delay. Zero or negative means immediately.
    pub requeue_after: Option<Duration>,
}

impl ReconcileAction {
    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }

    /// Nothing to do until the issuer changes.
    pub fn await_change() -> Self {
        Self { requeue_after: None }
    }

    /// Requeue delay clamped to a non-negative std duration.
    pub fn requeue_delay(&self) -> Option<std::time::Duration> {
        self.requeue_after.map(|after| {
            if after <= Duration::ZERO {
                std::time::Duration::ZERO
            } else {
                std::time::Duration::try_from(after).unwrap_or(std::time::Duration::ZERO)
            }
        })
    }
}

/// Keeps the stored CA certificate of an issuer current.
///
/// Stateless between passes: everything carried from one pass to the next is
/// read back from the issuer status. Passes for distinct keys may run
/// concurrently; the host serializes passes for the same key.
#[derive(Clone)]
pub struct IssuerReconciler {
    store: DynIssuerStore,
    ca: DynCaEngine,
    reporter: StatusReporter,
    clock: Arc<dyn Clock>,
    policy: RenewalPolicy,
}

impl IssuerReconciler {
    pub fn new(store: DynIssuerStore, ca: DynCaEngine, recorder: Arc<dyn EventRecorder>) -> Self {
        Self {
            reporter: StatusReporter::new(store.clone(), recorder),
            store,
            ca,
            clock: Arc::new(SystemClock),
            policy: RenewalPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: RenewalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RenewalPolicy {
        &self.policy
    }

    /// Reconcile the issuer stored under `key`.
    ///
    /// A missing issuer is a no-op. Every failure is recorded in the Ready
    /// condition before it is returned. When `cancel` fires, the pending store
    /// or CA call is dropped and `ReconcileError::Cancelled` is returned
    /// without writing status.
    pub async fn reconcile(
        &self,
        key: &ResourceKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileAction, ReconcileError> {
        let Some(issuer) = or_cancelled(cancel, self.store.get(key)).await?? else {
            tracing::debug!(issuer = %key, "issuer not found, skipping");
            return Ok(ReconcileAction::await_change());
        };

        if issuer.spec.key_reference.is_empty() {
            let message = format!("Not a valid key: {:?}", issuer.spec.key_reference);
            let err = ReconcileError::validation(message.clone());
            return Err(self
                .fail(&issuer, issuer.status.clone(), &message, err, cancel)
                .await);
        }

        let mut spec = issuer.spec.clone();
        let timing = apply_defaults(&mut spec, &self.policy);
        let now = self.clock.now();

        let request = CertificateRequest {
            key_reference: spec.key_reference.clone(),
            subject: Subject::new(spec.common_name.clone()),
            duration: timing.duration,
            rounding: timing.rounding(),
            at: now,
        };

        let desired = match self.ca.preview(&request) {
            Ok(desired) => desired,
            Err(e) => {
                let message = format!("Failed to compute the desired certificate: {e}");
                let err = ReconcileError::validation(message.clone());
                return Err(self
                    .fail(&issuer, issuer.status.clone(), &message, err, cancel)
                    .await);
            }
        };

        let mut status = issuer.status.clone();
        if let Some(reason) =
            evaluate_renewal(status.certificate_bytes(), &desired, timing.renew_before, now)
        {
            tracing::info!(
                issuer = %key,
                reason = %reason,
                serial = %desired.serial,
                not_after = %desired.not_after,
                "generate certificate"
            );
            match or_cancelled(cancel, self.ca.sign_and_issue(&request)).await? {
                Ok(signed) => status.certificate = Some(encode_certificate_pem(&signed.der)),
                Err(e) => {
                    let message =
                        format!("Failed to generate the Certificate Authority Certificate: {e}");
                    return Err(self
                        .fail(&issuer, status, &message, ReconcileError::Signing(e), cancel)
                        .await);
                }
            }
        }

        or_cancelled(cancel, self.reporter.report_success(&issuer, status, now)).await??;

        let requeue_after = desired.not_after - timing.renew_before - self.clock.now();
        tracing::info!(
            issuer = %key,
            requeue_after = %requeue_after,
            "successfully reconciled issuer"
        );
        Ok(ReconcileAction::requeue(requeue_after))
    }

    /// Record `err` in the Ready condition and hand it back.
    ///
    /// A failed status write is logged; the original error still wins.
    async fn fail(
        &self,
        issuer: &Issuer,
        status: IssuerStatus,
        message: &str,
        err: ReconcileError,
        cancel: &CancellationToken,
    ) -> ReconcileError {
        let key = issuer.key();
        tracing::error!(
            issuer = %key,
            category = %err.category(),
            error = %err,
            "{message}"
        );

        let now = self.clock.now();
        match or_cancelled(cancel, self.reporter.report_failure(issuer, status, message, now))
            .await
        {
            Ok(Ok(_)) => err,
            Ok(Err(persist_err)) => {
                tracing::warn!(issuer = %key, error = %persist_err, "failed to record failure status");
                err
            }
            Err(cancelled) => cancelled,
        }
    }
}

/// Race `fut` against `cancel`; cancellation drops the future.
async fn or_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, ReconcileError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReconcileError::Cancelled),
        out = fut => Ok(out),
    }
}
