// Tracing initialization with a configurable and reloadable log level.
use std::sync::OnceLock;

use caissuer_core::{AuditEvent, EventSeverity};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    // RUST_LOG wins over the configured level
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init();
}

/// Apply a new logging level at runtime if the reload handle is configured.
///
/// A filter taken from `RUST_LOG` is left untouched. Returns whether the
/// level was applied.
pub fn apply_logging_level(level: &str) -> bool {
    if std::env::var_os("RUST_LOG").is_some() {
        return false;
    }
    match LOG_RELOAD_HANDLE.get() {
        Some(handle) => handle
            .modify(|f| {
                *f = EnvFilter::new(level);
            })
            .is_ok(),
        None => false,
    }
}

/// Forward audit events to the log until `shutdown` fires.
pub async fn log_audit_events(
    mut events: broadcast::Receiver<AuditEvent>,
    shutdown: CancellationToken,
) {
    loop {
        // Drain what is already queued before honouring shutdown
        let event = tokio::select! {
            biased;
            received = events.recv() => received,
            _ = shutdown.cancelled() => break,
        };
        match event {
            Ok(event) => match event.severity {
                EventSeverity::Info => tracing::info!(
                    object = %event.object,
                    reason = %event.reason,
                    source = %event.source,
                    "{}",
                    event.message
                ),
                EventSeverity::Warning => tracing::warn!(
                    object = %event.object,
                    reason = %event.reason,
                    source = %event.source,
                    "{}",
                    event.message
                ),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "audit event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
