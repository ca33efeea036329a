mod metrics;
mod seed;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediaimport_core::{
    load_config, validate_config, HandlerSet, ImportRegistry, JsonBatchImporter, MediaDomain,
    SqliteMediaCatalog, SqliteRegistryStore, SyncOrchestrator, SyncRunner,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("MEDIAIMPORT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));
    let metrics_file = std::env::var("MEDIAIMPORT_METRICS_FILE")
        .ok()
        .map(PathBuf::from);

    info!(version = VERSION, "Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        config_hash = &config_hash[..16],
        sources = config.sources.len(),
        imports = config.imports.len(),
        "Configuration loaded"
    );

    let catalog = Arc::new(
        SqliteMediaCatalog::new(&config.database.catalog_path).with_context(|| {
            format!(
                "Failed to open catalog {:?}",
                config.database.catalog_path
            )
        })?,
    );
    info!("Catalog opened at {:?}", config.database.catalog_path);

    let registries = vec![
        open_registry(MediaDomain::Video, &config.database.video_registry_path)?,
        open_registry(MediaDomain::Music, &config.database.music_registry_path)?,
    ];
    seed::seed_registries(&config, &registries)?;

    // Touch the registry so every metric is registered before the first sweep
    once_cell::sync::Lazy::force(&metrics::REGISTRY);
    metrics::collect_registry_metrics(&registries);

    let orchestrator = SyncOrchestrator::new(HandlerSet::standard(catalog));
    let importer = Arc::new(JsonBatchImporter::new(config.sync.batches_dir.clone()));
    info!("Reading batches from {:?}", config.sync.batches_dir);

    let runner = Arc::new(SyncRunner::new(
        config.sync.clone(),
        registries.clone(),
        orchestrator,
        importer,
    ));

    if !config.sync.enabled {
        // One sweep, then exit
        info!("Periodic sync disabled, running a single sweep");
        let outcomes = runner.sync_all().await?;
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(imports = outcomes.len(), failed, "Sweep finished");
        write_metrics(metrics_file.as_deref(), &registries);
        if failed > 0 {
            anyhow::bail!("{} of {} imports failed", failed, outcomes.len());
        }
        return Ok(());
    }

    runner.start().await;
    metrics::SYNC_LOOP_RUNNING.set(1);

    shutdown_signal().await;

    info!("Shutting down...");
    runner.stop().await;
    metrics::SYNC_LOOP_RUNNING.set(0);
    write_metrics(metrics_file.as_deref(), &registries);

    info!("Stopped");
    Ok(())
}

fn write_metrics(path: Option<&Path>, registries: &[Arc<ImportRegistry>]) {
    let Some(path) = path else {
        return;
    };
    metrics::collect_registry_metrics(registries);
    match metrics::write_snapshot(path) {
        Ok(()) => info!("Metrics snapshot written to {:?}", path),
        Err(e) => warn!("Failed to write metrics snapshot to {:?}: {}", path, e),
    }
}

fn open_registry(domain: MediaDomain, path: &Path) -> Result<Arc<ImportRegistry>> {
    let store = SqliteRegistryStore::new(path)
        .with_context(|| format!("Failed to open {} registry {:?}", domain.as_str(), path))?;
    let registry = ImportRegistry::new(domain, Arc::new(store));
    registry
        .initialize()
        .with_context(|| format!("Failed to load {} registry", domain.as_str()))?;
    info!(domain = domain.as_str(), "Registry opened at {:?}", path);
    Ok(Arc::new(registry))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
