use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use caissuer_controller::config::loader::load_config;
use caissuer_controller::manifest::{load_manifest, seed_store};
use caissuer_controller::observability::{
    apply_logging_level, init_tracing, log_audit_events,
};
use caissuer_controller::{
    build_ca_engine, reconcile_all, AppConfig, Controller, IssuerReconciler,
};
use caissuer_ca::CaEngine;
use caissuer_core::{EventBroadcaster, EventRecorder};
use caissuer_storage::{DynIssuerStore, InMemoryIssuerStore, IssuerStore};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "caissuer")]
#[command(about = "Keeps Issuer CA certificates issued and renewed")]
#[command(version, long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT"), ")"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the issuers of a manifest
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Config file (defaults to caissuer.toml when present)
    #[arg(short, long, env = "CAISSUER_CONFIG")]
    config: Option<String>,
    /// Issuer manifest with `[[issuer]]` tables
    #[arg(short, long)]
    issuers: PathBuf,
    /// Reconcile every issuer once, print the statuses and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let cfg = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    if !apply_logging_level(&cfg.logging.level) {
        tracing::debug!(level = %cfg.logging.level, "RUST_LOG is set, configured level ignored");
    }
    tracing::info!(
        path = args.config.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let store: DynIssuerStore = Arc::new(InMemoryIssuerStore::new());
    let issuers = load_manifest(&args.issuers)
        .with_context(|| format!("loading manifest {}", args.issuers.display()))?;
    let seeded = seed_store(&store, issuers).await?;
    tracing::info!(count = seeded, backend = store.backend_name(), "issuers seeded");

    let shutdown = CancellationToken::new();
    let events = Arc::new(EventBroadcaster::new());
    let audit_log = tokio::spawn(log_audit_events(events.subscribe(), shutdown.clone()));

    let reconciler = build_reconciler(&cfg, store.clone(), events.clone())?;

    let outcome = if args.once {
        run_once(&reconciler, &store, &shutdown).await
    } else {
        let controller = Controller::new(
            Arc::new(reconciler),
            store.clone(),
            cfg.controller_config(),
        );
        let ctrl_c = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
            ctrl_c.cancel();
        });
        controller.run(shutdown.clone()).await.map_err(Into::into)
    };

    shutdown.cancel();
    let _ = audit_log.await;
    outcome
}

fn build_reconciler(
    cfg: &AppConfig,
    store: DynIssuerStore,
    recorder: Arc<dyn EventRecorder>,
) -> anyhow::Result<IssuerReconciler> {
    let policy = cfg.renewal_policy().map_err(anyhow::Error::msg)?;
    let ca = build_ca_engine(&cfg.ca).context("building CA engine")?;
    tracing::info!(
        engine = ca.engine_name(),
        keys = ca.keyring().len(),
        "CA engine ready"
    );
    Ok(IssuerReconciler::new(store, Arc::new(ca), recorder).with_policy(policy))
}

async fn run_once(
    reconciler: &IssuerReconciler,
    store: &DynIssuerStore,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let results = reconcile_all(reconciler, store, cancel).await?;
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();

    let issuers = store.list().await?;
    println!("{}", serde_json::to_string_pretty(&issuers)?);

    if failed > 0 {
        anyhow::bail!("{failed} of {} issuers failed to reconcile", results.len());
    }
    Ok(())
}
