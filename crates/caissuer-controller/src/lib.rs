pub mod config;
pub mod controller;
pub mod error;
pub mod manifest;
pub mod observability;
pub mod reconcile;

use std::sync::Arc;

use caissuer_ca::{Keyring, LocalCaEngine};

pub use config::AppConfig;
pub use controller::{reconcile_all, Controller, ControllerConfig, Reconcile};
pub use error::{ErrorCategory, ManifestError, ReconcileError};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use reconcile::{IssuerReconciler, ReconcileAction, RenewalPolicy, StatusReporter};

/// Build the local CA engine described by the `[ca]` config section.
///
/// Configured key files are loaded eagerly; an unreadable key fails here.
pub fn build_ca_engine(config: &config::CaSettings) -> Result<LocalCaEngine, caissuer_ca::CaError> {
    let keyring = Keyring::new().with_generate_missing(config.generate_missing_keys);
    for key in &config.keys {
        keyring.load_pem_file(key.id.clone(), &key.pem_path)?;
        tracing::info!(key_reference = %key.id, path = %key.pem_path.display(), "signing key loaded");
    }
    Ok(LocalCaEngine::new(Arc::new(keyring)))
}
