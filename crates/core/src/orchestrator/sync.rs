//! One synchronisation pass over one import.
//!
//! The orchestrator resolves the handlers of an import's media types, orders
//! them so required types run first and drives each through its changeset and
//! synchronisation phases. Containers are cleaned up once every handler of
//! the pass is done, so child counts are final.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn};

use crate::handler::{
    ChangesetVerdict, HandlerError, HandlerSet, LocalItems, MediaImportHandler, SyncTransaction,
};
use crate::media::{GroupedMediaTypes, MediaItem, MediaType};
use crate::metrics;
use crate::registry::{Import, ImportRegistry};
use crate::task::{TaskPhase, TaskProgress};

use super::types::{CancellationFlag, MediaTypeReport, OrchestratorError, SyncReport};

/// Callback invoked as a pass makes progress.
pub type ProgressCallback = Arc<dyn Fn(&Import, &TaskProgress) + Send + Sync>;

/// Failure of one media type, with the phase it failed in.
struct StepError {
    phase: TaskPhase,
    error: OrchestratorError,
}

impl StepError {
    fn new(phase: TaskPhase, error: impl Into<OrchestratorError>) -> Self {
        Self {
            phase,
            error: error.into(),
        }
    }
}

/// Drives imports through their handlers. Holds no state between passes.
#[derive(Clone)]
pub struct SyncOrchestrator {
    handlers: HandlerSet,
    progress: Option<ProgressCallback>,
}

impl SyncOrchestrator {
    pub fn new(handlers: HandlerSet) -> Self {
        Self {
            handlers,
            progress: None,
        }
    }

    /// Set a callback receiving progress updates.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn handlers(&self) -> &HandlerSet {
        &self.handlers
    }

    /// Handlers for `media_types` in execution order.
    ///
    /// Required media types are hard edges: they must be part of the group.
    /// Dependencies only order the handlers when they are present. Among
    /// handlers that are ready at the same time, group order wins.
    pub fn plan(
        &self,
        media_types: &GroupedMediaTypes,
    ) -> Result<Vec<Arc<dyn MediaImportHandler>>, OrchestratorError> {
        let handlers = media_types
            .iter()
            .map(|t| {
                self.handlers
                    .get(t)
                    .ok_or(OrchestratorError::MissingHandler(t))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut indegree = vec![0usize; handlers.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); handlers.len()];

        for (i, handler) in handlers.iter().enumerate() {
            for &required in handler.required_media_types() {
                let j = media_types.position(required).ok_or(
                    OrchestratorError::MissingRequiredMediaType {
                        media_type: handler.media_type(),
                        required,
                    },
                )?;
                dependents[j].push(i);
                indegree[i] += 1;
            }
            for &dependency in handler.dependencies() {
                if let Some(j) = media_types.position(dependency) {
                    dependents[j].push(i);
                    indegree[i] += 1;
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..handlers.len())
            .filter(|&i| indegree[i] == 0)
            .collect();
        let mut ordered = Vec::with_capacity(handlers.len());
        while let Some(i) = ready.pop_first() {
            ordered.push(i);
            for &dependent in &dependents[i] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if ordered.len() != handlers.len() {
            return Err(OrchestratorError::DependencyCycle(media_types.clone()));
        }
        Ok(ordered.into_iter().map(|i| handlers[i].clone()).collect())
    }

    /// Run one pass for `import` over the retrieved `batches`.
    ///
    /// A failing media type is rolled back and reported; media types that
    /// require it are skipped. The import's last sync time is only updated
    /// when every media type succeeded. Configuration errors and
    /// cancellation are returned as errors.
    pub fn synchronise(
        &self,
        registry: &ImportRegistry,
        import: &mut Import,
        mut batches: HashMap<MediaType, Vec<MediaItem>>,
        cancel: &CancellationFlag,
    ) -> Result<SyncReport, OrchestratorError> {
        let span = info_span!("sync", import = %import.describe());
        let _enter = span.enter();
        let started = Instant::now();

        let plan = self.plan(&import.media_types)?;
        let mut report = SyncReport::new(import);
        let mut failed: HashSet<MediaType> = HashSet::new();
        let mut synced: Vec<Arc<dyn MediaImportHandler>> = Vec::new();

        info!(handlers = plan.len(), "Starting synchronisation");

        for handler in &plan {
            let media_type = handler.media_type();
            if cancel.is_cancelled() {
                return Err(self.cancelled(&report, started));
            }

            if let Some(blocker) = handler
                .required_media_types()
                .iter()
                .find(|&&t| failed.contains(&t))
            {
                warn!(media_type = %media_type, blocker = %blocker, "Skipping media type");
                report.record_failure(
                    media_type,
                    TaskPhase::Changeset,
                    format!("skipped because {} failed", blocker),
                );
                failed.insert(media_type);
                continue;
            }

            let items = batches.remove(&media_type).unwrap_or_default();
            match self.synchronise_media_type(handler.as_ref(), import, items, cancel) {
                Ok(counts) => {
                    record_verdicts(&counts);
                    report.media_types.push(counts);
                    synced.push(handler.clone());
                }
                Err(StepError {
                    error: OrchestratorError::Cancelled,
                    ..
                }) => return Err(self.cancelled(&report, started)),
                Err(StepError { phase, error }) => {
                    error!(
                        media_type = %media_type,
                        phase = phase.as_str(),
                        error = %error,
                        "Media type failed"
                    );
                    metrics::HANDLER_FAILURES
                        .with_label_values(&[media_type.as_str(), phase.as_str()])
                        .inc();
                    report.record_failure(media_type, phase, error);
                    failed.insert(media_type);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(self.cancelled(&report, started));
        }

        for handler in synced.iter().rev().filter(|h| h.is_container()) {
            let media_type = handler.media_type();
            // Child counts are not final when a child type failed.
            if handler
                .child_media_types()
                .iter()
                .any(|t| failed.contains(t))
            {
                debug!(media_type = %media_type, "Skipping cleanup, a child type failed");
                continue;
            }
            self.notify(import, TaskProgress::new(TaskPhase::Cleanup, Some(media_type), 0));
            match handler.cleanup_imported_items(import) {
                Ok(removed) => {
                    if removed > 0 {
                        info!(media_type = %media_type, removed, "Removed empty containers");
                        metrics::ITEMS_CLEANED_UP
                            .with_label_values(&[media_type.as_str()])
                            .inc_by(removed as u64);
                    }
                    report.record_cleanup(media_type, removed);
                }
                Err(e) => {
                    error!(media_type = %media_type, error = %e, "Cleanup failed");
                    metrics::HANDLER_FAILURES
                        .with_label_values(&[media_type.as_str(), TaskPhase::Cleanup.as_str()])
                        .inc();
                    report.record_failure(media_type, TaskPhase::Cleanup, e);
                }
            }
        }

        report.finished_at = Some(Utc::now());
        if report.is_success() {
            registry.update_last_sync(import)?;
        }

        let label = report.result_label();
        metrics::SYNC_PASSES.with_label_values(&[label]).inc();
        metrics::SYNC_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        info!(
            result = label,
            added = report.total(ChangesetVerdict::Added),
            changed = report.total(ChangesetVerdict::Changed),
            removed = report.total(ChangesetVerdict::Removed),
            failures = report.failures.len(),
            "Synchronisation finished"
        );
        Ok(report)
    }

    /// Delete everything `import` brought into the catalog, children before
    /// their containers. Each handler runs in its own transaction. Returns
    /// the number of items removed.
    pub fn remove_imported_items(&self, import: &Import) -> Result<usize, OrchestratorError> {
        let span = info_span!("remove", import = %import.describe());
        let _enter = span.enter();

        let plan = self.plan(&import.media_types)?;
        let mut removed = 0;

        for handler in plan.iter().rev() {
            let media_type = handler.media_type();
            let items = handler.get_local_items(import)?;
            let mut progress = TaskProgress::new(TaskPhase::Removal, Some(media_type), items.len());

            let tx = handler.start_synchronisation(import)?;
            let mut outcome = Ok(());
            for item in &items {
                if let Err(e) = handler.remove_imported_item(&tx, import, item) {
                    outcome = Err(e);
                    break;
                }
                progress.advance();
                self.notify(import, progress.clone());
            }

            match outcome {
                Ok(()) => tx.commit().map_err(HandlerError::from)?,
                Err(e) => {
                    metrics::HANDLER_FAILURES
                        .with_label_values(&[media_type.as_str(), TaskPhase::Removal.as_str()])
                        .inc();
                    if let Err(rb) = handler.rollback_synchronisation(tx) {
                        warn!(media_type = %media_type, error = %rb, "Rollback failed");
                    }
                    return Err(e.into());
                }
            }

            debug!(media_type = %media_type, removed = items.len(), "Removed imported items");
            removed += items.len();
        }

        info!(removed, "Removed import from catalog");
        Ok(removed)
    }

    /// Enable or disable every item brought in by `import`.
    pub fn set_items_enabled(
        &self,
        import: &Import,
        enabled: bool,
    ) -> Result<usize, OrchestratorError> {
        let mut changed = 0;
        for handler in self.plan(&import.media_types)? {
            changed += handler.set_items_enabled(import, enabled)?;
        }
        debug!(import = %import.describe(), enabled, changed, "Toggled imported items");
        Ok(changed)
    }

    fn synchronise_media_type(
        &self,
        handler: &dyn MediaImportHandler,
        import: &Import,
        remote_items: Vec<MediaItem>,
        cancel: &CancellationFlag,
    ) -> Result<MediaTypeReport, StepError> {
        let media_type = handler.media_type();
        let span = info_span!("media_type", media_type = %media_type);
        let _enter = span.enter();
        let mut report = MediaTypeReport::new(media_type);

        // Changeset
        let local = handler
            .get_local_items(import)
            .map_err(|e| StepError::new(TaskPhase::Changeset, e))?;
        let mut local_items = LocalItems::new(local);
        let mut ctx = handler
            .start_changeset(import)
            .map_err(|e| StepError::new(TaskPhase::Changeset, e))?;

        let mut progress =
            TaskProgress::new(TaskPhase::Changeset, Some(media_type), remote_items.len());
        let mut added = Vec::new();
        let mut changed = Vec::new();
        let mut outcome = Ok(());

        for mut item in remote_items {
            if cancel.is_cancelled() {
                outcome = Err(OrchestratorError::Cancelled);
                break;
            }
            match handler.determine_changeset(&mut ctx, import, &mut item, &mut local_items) {
                Ok(ChangesetVerdict::Added) => added.push(item),
                Ok(ChangesetVerdict::Changed) => changed.push(item),
                Ok(_) => report.unchanged += 1,
                Err(e) => {
                    outcome = Err(e.into());
                    break;
                }
            }
            progress.advance();
            self.notify(import, progress.clone());
        }

        if let Err(e) = handler.finish_changeset(ctx) {
            warn!(error = %e, "Failed to finish changeset");
        }
        outcome.map_err(|e| StepError::new(TaskPhase::Changeset, e))?;

        let removals = if import.settings.allow_removal {
            local_items.into_items()
        } else {
            Vec::new()
        };

        debug!(
            added = added.len(),
            changed = changed.len(),
            unchanged = report.unchanged,
            removed = removals.len(),
            "Changeset determined"
        );

        if cancel.is_cancelled() {
            return Err(StepError::new(
                TaskPhase::Synchronisation,
                OrchestratorError::Cancelled,
            ));
        }

        // Synchronisation
        let tx = handler
            .start_synchronisation(import)
            .map_err(|e| StepError::new(TaskPhase::Synchronisation, e))?;
        let mut progress = TaskProgress::new(
            TaskPhase::Synchronisation,
            Some(media_type),
            added.len() + changed.len() + removals.len(),
        );

        let applied = self.apply_changeset(
            handler,
            &tx,
            import,
            &mut added,
            &mut changed,
            &removals,
            cancel,
            &mut progress,
        );
        match applied {
            Ok(()) => handler
                .finish_synchronisation(tx, import)
                .map_err(|e| StepError::new(TaskPhase::Synchronisation, e))?,
            Err(e) => {
                if let Err(rb) = handler.rollback_synchronisation(tx) {
                    warn!(error = %rb, "Rollback failed");
                }
                return Err(StepError::new(TaskPhase::Synchronisation, e));
            }
        }

        report.added = added.len();
        report.changed = changed.len();
        report.removed = removals.len();
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_changeset(
        &self,
        handler: &dyn MediaImportHandler,
        tx: &SyncTransaction,
        import: &Import,
        added: &mut [MediaItem],
        changed: &mut [MediaItem],
        removals: &[MediaItem],
        cancel: &CancellationFlag,
        progress: &mut TaskProgress,
    ) -> Result<(), OrchestratorError> {
        for item in added.iter_mut() {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            handler.add_imported_item(tx, import, item)?;
            progress.advance();
            self.notify(import, progress.clone());
        }

        for item in changed.iter_mut() {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            handler.update_imported_item(tx, import, item)?;
            progress.advance();
            self.notify(import, progress.clone());
        }

        for item in removals {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            handler.remove_imported_item(tx, import, item)?;
            progress.advance();
            self.notify(import, progress.clone());
        }
        Ok(())
    }

    fn notify(&self, import: &Import, progress: TaskProgress) {
        if let Some(callback) = &self.progress {
            callback(import, &progress);
        }
    }

    fn cancelled(&self, report: &SyncReport, started: Instant) -> OrchestratorError {
        info!(
            completed = report.media_types.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Synchronisation cancelled"
        );
        metrics::SYNC_PASSES.with_label_values(&["cancelled"]).inc();
        OrchestratorError::Cancelled
    }
}

fn record_verdicts(counts: &MediaTypeReport) {
    for verdict in [
        ChangesetVerdict::Added,
        ChangesetVerdict::Changed,
        ChangesetVerdict::Unchanged,
        ChangesetVerdict::Removed,
    ] {
        let n = counts.count(verdict);
        if n > 0 {
            metrics::CHANGESET_VERDICTS
                .with_label_values(&[counts.media_type.as_str(), verdict.as_str()])
                .inc_by(n as u64);
        }
    }
}
