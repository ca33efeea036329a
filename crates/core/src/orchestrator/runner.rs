//! Sync runner.
//!
//! Retrieves batches through the importer and hands them to the
//! orchestrator on blocking worker threads:
//! - Retrieval: async, one media type after the other per import
//! - Synchronisation: blocking, up to `max_concurrent_imports` imports at once
//! - Periodic sweeps: one background loop, stopped through a broadcast channel

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::importer::{ImporterError, MediaImporter};
use crate::media::{GroupedMediaTypes, MediaItem};
use crate::metrics;
use crate::registry::{Import, ImportRegistry, RegistryError};
use crate::task::TaskPhase;

use super::config::SyncConfig;
use super::sync::SyncOrchestrator;
use super::types::{CancellationFlag, OrchestratorError, SyncReport};

/// Result of synchronising one import during a sweep.
#[derive(Debug)]
pub struct ImportOutcome {
    pub import: Import,
    pub result: Result<SyncReport, OrchestratorError>,
}

/// Runs synchronisation passes for the imports of one or more registries.
pub struct SyncRunner {
    config: SyncConfig,
    registries: Vec<Arc<ImportRegistry>>,
    orchestrator: Arc<SyncOrchestrator>,
    importer: Arc<dyn MediaImporter>,
    cancel: CancellationFlag,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SyncRunner {
    /// Create a new runner. Registries must already be initialized.
    pub fn new(
        config: SyncConfig,
        registries: Vec<Arc<ImportRegistry>>,
        orchestrator: SyncOrchestrator,
        importer: Arc<dyn MediaImporter>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            registries,
            orchestrator: Arc::new(orchestrator),
            importer,
            cancel: CancellationFlag::new(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registries(&self) -> &[Arc<ImportRegistry>] {
        &self.registries
    }

    /// Flag shared by every pass this runner starts.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Registry holding imports of `media_types`.
    pub fn registry_for(&self, media_types: &GroupedMediaTypes) -> Option<Arc<ImportRegistry>> {
        self.registries
            .iter()
            .find(|registry| registry.domain().supports_all(media_types))
            .cloned()
    }

    /// Start the periodic sync loop.
    pub async fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            info!("Periodic sync disabled");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Sync runner already running");
            return;
        }

        info!(
            interval_secs = self.config.interval_secs,
            max_concurrent = self.config.max_concurrent_imports,
            "Starting sync runner"
        );
        self.cancel.reset();
        self.spawn_sync_loop();
    }

    /// Stop the loop and cancel passes in flight.
    ///
    /// Cancelled passes roll back their open transaction. Passes started
    /// afterwards are cancelled too until the runner is started again.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Sync runner not running");
            return;
        }

        info!("Stopping sync runner");
        self.cancel.cancel();
        let _ = self.shutdown_tx.send(());
        info!("Sync runner stopped");
    }

    fn spawn_sync_loop(self: &Arc<Self>) {
        let runner = Arc::clone(self);
        let running = Arc::clone(&self.running);
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Sync loop started");
            if runner.config.sync_on_start {
                runner.sweep().await;
            }
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Sync loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        runner.sweep().await;
                    }
                }
            }
            info!("Sync loop stopped");
        });
    }

    async fn sweep(&self) {
        match self.sync_all().await {
            Ok(outcomes) => {
                let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
                info!(imports = outcomes.len(), failed, "Sync sweep finished");
            }
            Err(e) => error!("Sync sweep failed: {}", e),
        }
    }

    // =========================================================================
    // Synchronisation
    // =========================================================================

    /// Retrieve and synchronise one import.
    ///
    /// A retrieval failure fails the whole import before the catalog is
    /// touched.
    pub async fn sync_import(&self, import: Import) -> Result<SyncReport, OrchestratorError> {
        let registry = self
            .registry_for(&import.media_types)
            .ok_or_else(|| OrchestratorError::NoRegistry(import.media_types.clone()))?;
        if !registry.is_source_active(&import.source.identifier)? {
            return Err(OrchestratorError::SourceInactive(
                import.source.identifier.clone(),
            ));
        }

        let mut batches = HashMap::new();
        for media_type in import.media_types.iter() {
            if self.cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            let items = self
                .importer
                .retrieve(&import, media_type)
                .await
                .inspect_err(|e| {
                    warn!(
                        import = %import.describe(),
                        media_type = %media_type,
                        importer = self.importer.name(),
                        "Retrieval failed: {}", e
                    );
                    metrics::HANDLER_FAILURES
                        .with_label_values(&[media_type.as_str(), TaskPhase::Retrieval.as_str()])
                        .inc();
                })?;
            debug!(
                import = %import.describe(),
                media_type = %media_type,
                items = items.len(),
                "Retrieved batch"
            );
            metrics::ITEMS_RETRIEVED
                .with_label_values(&[media_type.as_str()])
                .inc_by(items.len() as u64);
            batches.insert(media_type, items);
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let cancel = self.cancel.clone();
        let mut import = import;
        tokio::task::spawn_blocking(move || {
            orchestrator.synchronise(&registry, &mut import, batches, &cancel)
        })
        .await
        .map_err(|e| OrchestratorError::Worker(e.to_string()))?
    }

    /// Synchronise every import of a source. Inactive sources are skipped.
    pub async fn sync_source(
        &self,
        source_id: &str,
    ) -> Result<Vec<ImportOutcome>, OrchestratorError> {
        let mut imports = Vec::new();
        for registry in &self.registries {
            imports.extend(registry.get_imports_by_source(source_id)?);
        }
        Ok(self.sync_many(imports).await)
    }

    /// Synchronise every import of every registry. Imports of inactive
    /// sources are skipped.
    pub async fn sync_all(&self) -> Result<Vec<ImportOutcome>, OrchestratorError> {
        let mut imports = Vec::new();
        for registry in &self.registries {
            imports.extend(registry.get_imports()?);
        }
        Ok(self.sync_many(imports).await)
    }

    async fn sync_many(&self, imports: Vec<Import>) -> Vec<ImportOutcome> {
        let mut runnable = Vec::with_capacity(imports.len());
        for import in imports {
            match self.is_active(&import) {
                Ok(true) => runnable.push(import),
                Ok(false) => debug!(import = %import.describe(), "Skipping inactive source"),
                Err(e) => {
                    warn!(import = %import.describe(), "Activity check failed: {}", e);
                    runnable.push(import);
                }
            }
        }

        let limit = self.config.max_concurrent_imports.max(1);
        stream::iter(runnable)
            .map(|import| async move {
                let result = self.sync_import(import.clone()).await;
                if let Err(e) = &result {
                    warn!(import = %import.describe(), "Import failed: {}", e);
                }
                ImportOutcome { import, result }
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }

    fn is_active(&self, import: &Import) -> Result<bool, OrchestratorError> {
        match self.registry_for(&import.media_types) {
            Some(registry) => Ok(registry.is_source_active(&import.source.identifier)?),
            None => Ok(true),
        }
    }

    // =========================================================================
    // Source state, updates and removal
    // =========================================================================

    /// Mark a source online or offline and enable or disable every item its
    /// imports brought in. Returns the number of items whose state changed.
    pub async fn set_source_active(
        &self,
        source_id: &str,
        active: bool,
    ) -> Result<usize, OrchestratorError> {
        let mut known = false;
        let mut changed = 0;

        for registry in &self.registries {
            if registry.get_source(source_id)?.is_none() {
                continue;
            }
            known = true;
            if !registry.set_source_active(source_id, active)? {
                continue;
            }

            for import in registry.get_imports_by_source(source_id)? {
                let orchestrator = Arc::clone(&self.orchestrator);
                changed += tokio::task::spawn_blocking(move || {
                    orchestrator.set_items_enabled(&import, active)
                })
                .await
                .map_err(|e| OrchestratorError::Worker(e.to_string()))??;
            }
        }

        if !known {
            return Err(RegistryError::UnknownSource(source_id.to_string()).into());
        }
        info!(source = %source_id, active, items = changed, "Source state changed");
        Ok(changed)
    }

    /// Push a locally changed item back to the import's source.
    pub async fn push_item_update(
        &self,
        import: &Import,
        item: &MediaItem,
    ) -> Result<(), OrchestratorError> {
        if !self.is_active(import)? {
            return Err(OrchestratorError::SourceInactive(
                import.source.identifier.clone(),
            ));
        }

        let result = self.importer.update_on_source(import, item).await;
        let label = match &result {
            Ok(()) => "success",
            Err(ImporterError::Unsupported(_)) => "unsupported",
            Err(_) => "failed",
        };
        metrics::SOURCE_UPDATES.with_label_values(&[label]).inc();

        match result {
            Ok(()) => {
                debug!(import = %import.describe(), item = %item.label(), "Pushed item update");
                Ok(())
            }
            Err(e) => {
                warn!(
                    import = %import.describe(),
                    item = %item.label(),
                    phase = TaskPhase::Update.as_str(),
                    "Update not pushed: {}", e
                );
                Err(e.into())
            }
        }
    }

    /// Remove everything an import brought in, then the import itself.
    /// Returns the number of catalog items removed.
    pub async fn remove_import(&self, import: &Import) -> Result<usize, OrchestratorError> {
        let registry = self
            .registry_for(&import.media_types)
            .ok_or_else(|| OrchestratorError::NoRegistry(import.media_types.clone()))?;
        if registry
            .get_import(&import.path, &import.media_types)?
            .is_none()
        {
            return Err(RegistryError::NotFound(import.describe()).into());
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let target = import.clone();
        let removed =
            tokio::task::spawn_blocking(move || orchestrator.remove_imported_items(&target))
                .await
                .map_err(|e| OrchestratorError::Worker(e.to_string()))??;

        registry.remove_import(import)?;
        Ok(removed)
    }
}
