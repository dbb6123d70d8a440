//! Host scheduler driving a [`Reconcile`] implementation.
//!
//! The controller reconciles every stored issuer once at startup, then again
//! whenever the store reports a spec change or a requeue deadline elapses. A
//! key is never reconciled concurrently with itself: triggers arriving while
//! a pass is in flight are coalesced into a single follow-up pass. Failed
//! passes are retried with exponential backoff.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use caissuer_core::ResourceKey;
use caissuer_storage::{DynIssuerStore, IssuerStore, StorageError, StoreEventKind};
use futures_util::FutureExt;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ReconcileError;
use crate::reconcile::{IssuerReconciler, ReconcileAction};

/// Minimal contract between the scheduler and the reconcile logic.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    async fn reconcile(
        &self,
        key: &ResourceKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileAction, ReconcileError>;
}

#[async_trait]
impl Reconcile for IssuerReconciler {
    async fn reconcile(
        &self,
        key: &ResourceKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileAction, ReconcileError> {
        IssuerReconciler::reconcile(self, key, cancel).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Maximum number of concurrent passes across all keys.
    pub workers: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    /// `backoff_base * 2^attempt`, capped at `backoff_max`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

enum Outcome {
    Done(ReconcileAction),
    Failed(ReconcileError),
    Panicked,
}

#[derive(Default)]
struct KeyState {
    in_flight: bool,
    /// A trigger arrived while in flight.
    dirty: bool,
    failures: u32,
    timer: Option<AbortHandle>,
}

impl KeyState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Watches the store and schedules reconcile passes.
pub struct Controller<R: Reconcile> {
    reconciler: Arc<R>,
    store: DynIssuerStore,
    config: ControllerConfig,
}

impl<R: Reconcile> Controller<R> {
    pub fn new(reconciler: Arc<R>, store: DynIssuerStore, config: ControllerConfig) -> Self {
        Self {
            reconciler,
            store,
            config,
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// In-flight passes observe a child of `shutdown` and end with
    /// `ReconcileError::Cancelled`; they are drained before returning.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), StorageError> {
        // Subscribe before listing so no change between the two is missed
        let mut events = self.store.subscribe();
        let (requeue_tx, mut requeue_rx) = mpsc::unbounded_channel();
        let workers = self.config.workers.max(1);

        let mut scheduler = Scheduler {
            reconciler: self.reconciler,
            config: self.config,
            semaphore: Arc::new(Semaphore::new(workers)),
            tasks: JoinSet::new(),
            keys: HashMap::new(),
            requeue_tx,
            cancel: shutdown.child_token(),
        };

        info!(
            backend = self.store.backend_name(),
            workers,
            "issuer controller started"
        );
        resync(&self.store, &mut scheduler).await?;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => match event.kind {
                        StoreEventKind::Applied => scheduler.enqueue(event.key),
                        StoreEventKind::Deleted => scheduler.forget(&event.key),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "store events lagged, resyncing");
                        resync(&self.store, &mut scheduler).await?;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("store event stream closed");
                        break;
                    }
                },
                Some(key) = requeue_rx.recv() => scheduler.enqueue(key),
                Some(joined) = scheduler.tasks.join_next(), if !scheduler.tasks.is_empty() => {
                    match joined {
                        Ok((key, outcome)) => scheduler.complete(key, outcome),
                        Err(e) => error!(error = %e, "reconcile task failed to join"),
                    }
                }
            }
        }

        info!(in_flight = scheduler.tasks.len(), "issuer controller stopping");
        scheduler.cancel.cancel();
        for state in scheduler.keys.values_mut() {
            state.cancel_timer();
        }
        while scheduler.tasks.join_next().await.is_some() {}
        info!("issuer controller stopped");
        Ok(())
    }
}

async fn resync<R: Reconcile>(
    store: &DynIssuerStore,
    scheduler: &mut Scheduler<R>,
) -> Result<(), StorageError> {
    let issuers = store.list().await?;
    debug!(count = issuers.len(), "enqueueing stored issuers");
    for issuer in issuers {
        scheduler.enqueue(issuer.key());
    }
    Ok(())
}

struct Scheduler<R: Reconcile> {
    reconciler: Arc<R>,
    config: ControllerConfig,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<(ResourceKey, Outcome)>,
    keys: HashMap<ResourceKey, KeyState>,
    requeue_tx: mpsc::UnboundedSender<ResourceKey>,
    /// Handed to every pass; cancelled on shutdown.
    cancel: CancellationToken,
}

impl<R: Reconcile> Scheduler<R> {
    fn enqueue(&mut self, key: ResourceKey) {
        let state = self.keys.entry(key.clone()).or_default();
        state.cancel_timer();
        if state.in_flight {
            state.dirty = true;
            return;
        }
        state.in_flight = true;
        self.spawn(key);
    }

    fn forget(&mut self, key: &ResourceKey) {
        if let Some(state) = self.keys.get_mut(key) {
            state.cancel_timer();
            if !state.in_flight {
                self.keys.remove(key);
            }
        }
    }

    fn spawn(&mut self, key: ResourceKey) {
        let reconciler = Arc::clone(&self.reconciler);
        let semaphore = Arc::clone(&self.semaphore);
        let cancel = self.cancel.clone();

        self.tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (key, Outcome::Failed(ReconcileError::Cancelled));
            };
            let outcome = match AssertUnwindSafe(reconciler.reconcile(&key, &cancel))
                .catch_unwind()
                .await
            {
                Ok(Ok(action)) => Outcome::Done(action),
                Ok(Err(e)) => Outcome::Failed(e),
                Err(_) => Outcome::Panicked,
            };
            (key, outcome)
        });
    }

    fn complete(&mut self, key: ResourceKey, outcome: Outcome) {
        let Some(state) = self.keys.get_mut(&key) else {
            return;
        };
        state.in_flight = false;

        let requeue = match outcome {
            Outcome::Done(action) => {
                state.failures = 0;
                action.requeue_delay()
            }
            Outcome::Failed(ReconcileError::Cancelled) if self.cancel.is_cancelled() => None,
            Outcome::Failed(e) => {
                let delay = self.config.backoff(state.failures);
                state.failures = state.failures.saturating_add(1);
                warn!(
                    issuer = %key,
                    error = %e,
                    category = %e.category(),
                    retryable = e.is_retryable(),
                    attempt = state.failures,
                    retry_in_ms = delay.as_millis() as u64,
                    "reconcile failed"
                );
                Some(delay)
            }
            Outcome::Panicked => {
                let delay = self.config.backoff(state.failures);
                state.failures = state.failures.saturating_add(1);
                error!(issuer = %key, retry_in_ms = delay.as_millis() as u64, "reconcile panicked");
                Some(delay)
            }
        };

        if std::mem::take(&mut state.dirty) {
            state.in_flight = true;
            self.spawn(key);
            return;
        }

        match requeue {
            Some(delay) if delay.is_zero() => {
                state.in_flight = true;
                self.spawn(key);
            }
            Some(delay) => {
                let tx = self.requeue_tx.clone();
                let timer_key = key.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(timer_key);
                });
                state.timer = Some(handle.abort_handle());
                debug!(issuer = %key, requeue_in_ms = delay.as_millis() as u64, "requeue scheduled");
            }
            None => {
                self.keys.remove(&key);
            }
        }
    }
}

/// Reconcile every stored issuer once, sequentially.
///
/// Used for one-shot runs; no requeue or backoff is applied.
pub async fn reconcile_all<R: Reconcile>(
    reconciler: &R,
    store: &DynIssuerStore,
    cancel: &CancellationToken,
) -> Result<Vec<(ResourceKey, Result<ReconcileAction, ReconcileError>)>, StorageError> {
    let mut results = Vec::new();
    for issuer in store.list().await? {
        let key = issuer.key();
        let result = reconciler.reconcile(&key, cancel).await;
        results.push((key, result));
    }
    Ok(results)
}
