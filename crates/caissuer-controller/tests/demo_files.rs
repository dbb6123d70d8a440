use std::path::PathBuf;
use std::sync::Arc;

use caissuer_controller::config::loader::load_config;
use caissuer_controller::manifest::{load_manifest, seed_store};
use caissuer_controller::{build_ca_engine, reconcile_all, IssuerReconciler, ReconcileError};
use caissuer_core::EventBroadcaster;
use caissuer_storage::{DynIssuerStore, InMemoryIssuerStore, IssuerStore};
use tokio_util::sync::CancellationToken;

fn demo(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos").join(file)
}

#[tokio::test]
async fn demo_manifest_reconciles_with_demo_config() {
    let cfg = load_config(demo("caissuer.toml").to_str()).expect("demo config");
    let issuers = load_manifest(demo("issuers.toml")).expect("demo manifest");
    assert_eq!(issuers.len(), 3);

    let store: DynIssuerStore = Arc::new(InMemoryIssuerStore::new());
    assert_eq!(seed_store(&store, issuers).await.unwrap(), 3);

    let ca = build_ca_engine(&cfg.ca).unwrap();
    let reconciler = IssuerReconciler::new(
        store.clone(),
        Arc::new(ca),
        Arc::new(EventBroadcaster::new()),
    )
    .with_policy(cfg.renewal_policy().unwrap());

    let results = reconcile_all(&reconciler, &store, &CancellationToken::new())
        .await
        .unwrap();
    for (key, result) in &results {
        match key.name.as_str() {
            "broken" => assert!(matches!(result, Err(ReconcileError::Validation(_)))),
            _ => assert!(result.is_ok(), "{key}: {result:?}"),
        }
    }

    let stored = store.list().await.unwrap();
    let ready = stored.iter().filter(|i| i.status.conditions.is_ready()).count();
    assert_eq!(ready, 2);
}
