use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use caissuer_ca::{
    parse_certificate_pem, CaEngine, CaError, CaResult, CertificatePreview, CertificateRequest,
    Keyring, LocalCaEngine, SignedCertificate,
};
use caissuer_controller::{IssuerReconciler, ReconcileError};
use caissuer_core::{
    ConditionStatus, EventRecorder, EventSeverity, FixedClock, Issuer, IssuerSpec, IssuerStatus,
    ObjectRef, ResourceKey, CONDITION_READY, REASON_FAILED, REASON_ISSUED,
};
use caissuer_storage::{InMemoryIssuerStore, IssuerStore, StorageError, StoreEvent};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const T0: OffsetDateTime = datetime!(2024-01-01 10:47:13 UTC);

/// Local engine that counts signing calls and can be switched to fail.
struct CountingCa {
    inner: LocalCaEngine,
    signs: AtomicUsize,
    fail: AtomicBool,
}

impl CountingCa {
    fn new() -> Self {
        Self {
            inner: LocalCaEngine::new(Arc::new(Keyring::new().with_generate_missing(true))),
            signs: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    fn signs(&self) -> usize {
        self.signs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaEngine for CountingCa {
    fn preview(&self, request: &CertificateRequest) -> CaResult<CertificatePreview> {
        self.inner.preview(request)
    }

    async fn sign_and_issue(&self, request: &CertificateRequest) -> CaResult<SignedCertificate> {
        self.signs.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CaError::signing("backend unavailable"));
        }
        self.inner.sign_and_issue(request).await
    }

    fn engine_name(&self) -> &'static str {
        "counting"
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(EventSeverity, String, String)>>,
    times: Mutex<Vec<OffsetDateTime>>,
}

impl RecordingSink {
    fn last(&self) -> Option<(EventSeverity, String, String)> {
        self.events.lock().unwrap().last().cloned()
    }

    fn last_time(&self) -> Option<OffsetDateTime> {
        self.times.lock().unwrap().last().copied()
    }
}

impl EventRecorder for RecordingSink {
    fn record(
        &self,
        _object: &ObjectRef,
        severity: EventSeverity,
        reason: &str,
        message: &str,
        at: OffsetDateTime,
    ) {
        self.events
            .lock()
            .unwrap()
            .push((severity, reason.to_string(), message.to_string()));
        self.times.lock().unwrap().push(at);
    }
}

struct Harness {
    store: Arc<InMemoryIssuerStore>,
    ca: Arc<CountingCa>,
    clock: Arc<FixedClock>,
    sink: Arc<RecordingSink>,
    reconciler: IssuerReconciler,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryIssuerStore::new());
        let ca = Arc::new(CountingCa::new());
        let clock = Arc::new(FixedClock::new(T0));
        let sink = Arc::new(RecordingSink::default());
        let reconciler = IssuerReconciler::new(store.clone(), ca.clone(), sink.clone())
            .with_clock(clock.clone());
        Self {
            store,
            ca,
            clock,
            sink,
            reconciler,
        }
    }

    async fn apply(&self, name: &str, spec: IssuerSpec) -> ResourceKey {
        self.store
            .apply(Issuer::new("default", name, spec))
            .await
            .unwrap()
            .key()
    }

    async fn status(&self, key: &ResourceKey) -> IssuerStatus {
        self.store.get(key).await.unwrap().unwrap().status
    }
}

fn spec(key_reference: &str, common_name: &str) -> IssuerSpec {
    IssuerSpec {
        key_reference: key_reference.into(),
        common_name: common_name.into(),
        duration: Some(Duration::hours(1)),
        renew_before: None,
    }
}

#[tokio::test]
async fn first_reconcile_issues_and_second_is_idempotent() {
    let h = Harness::new();
    let key = h.apply("root-ca", spec("k1", "ca.example")).await;
    let cancel = CancellationToken::new();

    let action = h.reconciler.reconcile(&key, &cancel).await.unwrap();
    assert_eq!(h.ca.signs(), 1);

    let requeue = action.requeue_after.expect("requeue expected");
    assert!(requeue > Duration::ZERO);
    assert!(requeue <= Duration::minutes(20));

    let status = h.status(&key).await;
    let pem = status.certificate.clone().expect("certificate persisted");
    assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));

    let parsed = parse_certificate_pem(pem.as_bytes()).unwrap();
    assert!(parsed.not_after > T0 + Duration::minutes(40));
    assert!(parsed.not_after <= T0 + Duration::hours(1));
    assert_eq!(parsed.common_name.as_deref(), Some("ca.example"));
    assert!(parsed.is_ca);

    let ready = status.conditions.get(CONDITION_READY).unwrap().clone();
    assert_eq!(ready.status, ConditionStatus::True);
    assert_eq!(ready.reason, REASON_ISSUED);
    assert_eq!(ready.message, "");
    assert_eq!(ready.last_transition_time, T0);
    assert_eq!(
        h.sink.last(),
        Some((EventSeverity::Info, REASON_ISSUED.to_string(), String::new()))
    );
    assert_eq!(h.sink.last_time(), Some(T0));

    // Second pass before the requeue deadline
    h.clock.advance(Duration::minutes(1));
    h.reconciler.reconcile(&key, &cancel).await.unwrap();
    assert_eq!(h.ca.signs(), 1);

    let again = h.status(&key).await;
    assert_eq!(again.certificate.as_deref(), Some(pem.as_str()));
    let ready_again = again.conditions.get(CONDITION_READY).unwrap();
    assert_eq!(ready_again.status, ConditionStatus::True);
    assert_eq!(ready_again.last_transition_time, T0);
}

#[tokio::test]
async fn stored_spec_is_not_rewritten_by_defaulting() {
    let h = Harness::new();
    let key = h.apply("root-ca", spec("k1", "ca.example")).await;
    h.reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap();

    let stored = h.store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.spec.renew_before, None);
    assert_eq!(stored.metadata.generation, 1);
}

#[tokio::test]
async fn renews_once_inside_renewal_window() {
    let h = Harness::new();
    let key = h.apply("root-ca", spec("k1", "ca.example")).await;
    let cancel = CancellationToken::new();

    let action = h.reconciler.reconcile(&key, &cancel).await.unwrap();
    let first = h.status(&key).await.certificate.unwrap();
    let first_not_after = parse_certificate_pem(first.as_bytes()).unwrap().not_after;

    h.clock.advance(action.requeue_after.unwrap());
    h.reconciler.reconcile(&key, &cancel).await.unwrap();
    assert_eq!(h.ca.signs(), 2);

    let second = h.status(&key).await.certificate.unwrap();
    assert_ne!(second, first);
    let second_not_after = parse_certificate_pem(second.as_bytes()).unwrap().not_after;
    assert!(second_not_after > first_not_after);
}

#[tokio::test]
async fn spec_change_triggers_reissue() {
    let h = Harness::new();
    let key = h.apply("root-ca", spec("k1", "ca.example")).await;
    let cancel = CancellationToken::new();
    h.reconciler.reconcile(&key, &cancel).await.unwrap();

    h.apply("root-ca", spec("k1", "renamed.example")).await;
    h.reconciler.reconcile(&key, &cancel).await.unwrap();
    assert_eq!(h.ca.signs(), 2);

    let pem = h.status(&key).await.certificate.unwrap();
    let parsed = parse_certificate_pem(pem.as_bytes()).unwrap();
    assert_eq!(parsed.common_name.as_deref(), Some("renamed.example"));
}

#[tokio::test]
async fn corrupt_certificate_is_replaced() {
    let h = Harness::new();
    let key = h.apply("root-ca", spec("k1", "ca.example")).await;
    let issuer = h.store.get(&key).await.unwrap().unwrap();
    let corrupt = IssuerStatus {
        certificate: Some("garbage".into()),
        ..Default::default()
    };
    h.store
        .update_status(&key, issuer.metadata.resource_version, &corrupt)
        .await
        .unwrap();

    h.reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap();

    let pem = h.status(&key).await.certificate.unwrap();
    assert!(parse_certificate_pem(pem.as_bytes()).is_ok());
}

#[tokio::test]
async fn empty_key_reference_reports_failure() {
    let h = Harness::new();
    let key = h.apply("root-ca", spec("", "ca.example")).await;

    let err = h
        .reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));
    assert!(!err.is_retryable());
    assert_eq!(h.ca.signs(), 0);

    let status = h.status(&key).await;
    assert!(status.certificate.is_none());
    let ready = status.conditions.get(CONDITION_READY).unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, REASON_FAILED);
    assert!(ready.message.contains("Not a valid key"));

    let (severity, reason, _) = h.sink.last().unwrap();
    assert_eq!(severity, EventSeverity::Warning);
    assert_eq!(reason, REASON_FAILED);
}

#[tokio::test]
async fn whitespace_key_reference_is_a_real_reference() {
    let h = Harness::new();
    let key = h.apply("root-ca", spec(" ", "ca.example")).await;

    h.reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(h.ca.signs(), 1);

    let status = h.status(&key).await;
    assert!(status.conditions.is_ready());
    assert!(status.certificate.is_some());
}

#[tokio::test]
async fn oversized_duration_reports_failure_without_signing() {
    let h = Harness::new();
    let mut oversized = spec("k1", "ca.example");
    oversized.duration = Some(Duration::seconds(i64::MAX));
    let key = h.apply("root-ca", oversized).await;

    let err = h
        .reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));
    assert_eq!(h.ca.signs(), 0);

    let ready = h.status(&key).await.conditions.get(CONDITION_READY).cloned().unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
}

#[tokio::test]
async fn signing_failure_keeps_previous_certificate() {
    let h = Harness::new();
    let key = h.apply("root-ca", spec("k1", "ca.example")).await;
    let cancel = CancellationToken::new();
    h.reconciler.reconcile(&key, &cancel).await.unwrap();
    let issued = h.status(&key).await.certificate.unwrap();

    h.ca.fail.store(true, Ordering::SeqCst);
    h.apply("root-ca", spec("k1", "renamed.example")).await;

    let err = h.reconciler.reconcile(&key, &cancel).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Signing(_)));
    assert!(err.is_retryable());

    let status = h.status(&key).await;
    assert_eq!(status.certificate.as_deref(), Some(issued.as_str()));
    let ready = status.conditions.get(CONDITION_READY).unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert!(ready
        .message
        .starts_with("Failed to generate the Certificate Authority Certificate"));

    // Backend recovers
    h.ca.fail.store(false, Ordering::SeqCst);
    h.reconciler.reconcile(&key, &cancel).await.unwrap();
    assert!(h.status(&key).await.conditions.is_ready());
}

#[tokio::test]
async fn missing_issuer_is_a_noop() {
    let h = Harness::new();
    let action = h
        .reconciler
        .reconcile(&ResourceKey::new("default", "gone"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(action.requeue_after, None);
    assert!(h.sink.last().is_none());
}

#[tokio::test]
async fn cancelled_pass_writes_nothing() {
    let h = Harness::new();
    let key = h.apply("root-ca", spec("k1", "ca.example")).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h.reconciler.reconcile(&key, &cancel).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Cancelled));
    assert!(err.is_retryable());

    let stored = h.store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.metadata.resource_version, 1);
    assert!(stored.status.conditions.is_empty());
}

/// Store whose status writes always lose the optimistic concurrency race.
struct ConflictingStore {
    inner: InMemoryIssuerStore,
}

#[async_trait]
impl IssuerStore for ConflictingStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<Issuer>, StorageError> {
        self.inner.get(key).await
    }

    async fn update_status(
        &self,
        _key: &ResourceKey,
        resource_version: u64,
        _status: &IssuerStatus,
    ) -> Result<Issuer, StorageError> {
        Err(StorageError::conflict(resource_version, resource_version + 1))
    }

    async fn apply(&self, issuer: Issuer) -> Result<Issuer, StorageError> {
        self.inner.apply(issuer).await
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn list(&self) -> Result<Vec<Issuer>, StorageError> {
        self.inner.list().await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.subscribe()
    }

    fn backend_name(&self) -> &'static str {
        "conflicting"
    }
}

#[tokio::test]
async fn status_conflict_is_a_retryable_persistence_error() {
    let store = Arc::new(ConflictingStore {
        inner: InMemoryIssuerStore::new(),
    });
    let key = store
        .apply(Issuer::new("default", "root-ca", spec("k1", "ca.example")))
        .await
        .unwrap()
        .key();
    let reconciler = IssuerReconciler::new(
        store.clone(),
        Arc::new(CountingCa::new()),
        Arc::new(RecordingSink::default()),
    )
    .with_clock(Arc::new(FixedClock::new(T0)));

    let err = reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap_err();
    match &err {
        ReconcileError::Persistence(e) => assert!(e.is_conflict()),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_keys_reconcile_concurrently_without_interference() {
    let h = Arc::new(Harness::new());
    let mut keys = Vec::new();
    for i in 0..8 {
        keys.push(
            h.apply(&format!("ca-{i}"), spec(&format!("k{i}"), &format!("ca-{i}.example")))
                .await,
        );
    }

    let mut handles = Vec::new();
    for key in keys.clone() {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            h.reconciler
                .reconcile(&key, &CancellationToken::new())
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for (i, key) in keys.iter().enumerate() {
        let status = h.status(key).await;
        assert!(status.conditions.is_ready());
        let parsed = parse_certificate_pem(status.certificate.unwrap().as_bytes()).unwrap();
        let expected = format!("ca-{i}.example");
        assert_eq!(parsed.common_name.as_deref(), Some(expected.as_str()));
    }
    assert_eq!(h.ca.signs(), 8);
}
