//! Types for the synchronization orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handler::{ChangesetVerdict, HandlerError};
use crate::importer::ImporterError;
use crate::media::{GroupedMediaTypes, MediaType};
use crate::registry::{Import, RegistryError};
use crate::task::TaskPhase;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No handler registered for a media type of the import.
    #[error("no handler for media type {0}")]
    MissingHandler(MediaType),

    /// A handler requires a media type the import does not group.
    #[error("{media_type} requires {required} in the same import")]
    MissingRequiredMediaType {
        media_type: MediaType,
        required: MediaType,
    },

    /// The handlers of a group depend on each other in a cycle.
    #[error("dependency cycle between media types {0}")]
    DependencyCycle(GroupedMediaTypes),

    /// No registry holds imports of these media types.
    #[error("no registry for media types {0}")]
    NoRegistry(GroupedMediaTypes),

    /// The import's source is marked inactive.
    #[error("source is inactive: {0}")]
    SourceInactive(String),

    /// The pass was cancelled between two steps.
    #[error("synchronisation cancelled")]
    Cancelled,

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Importer error.
    #[error("importer error: {0}")]
    Importer(#[from] ImporterError),

    /// Handler error.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// A blocking worker panicked or was aborted.
    #[error("worker failed: {0}")]
    Worker(String),
}

/// Shared flag a caller sets to abort running passes.
///
/// Passes check it before every changeset item and between phases.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counts for one media type of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTypeReport {
    pub media_type: MediaType,
    pub added: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// Empty containers removed during cleanup.
    pub cleaned_up: usize,
}

impl MediaTypeReport {
    pub fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            added: 0,
            changed: 0,
            unchanged: 0,
            removed: 0,
            cleaned_up: 0,
        }
    }

    pub fn count(&self, verdict: ChangesetVerdict) -> usize {
        match verdict {
            ChangesetVerdict::Added => self.added,
            ChangesetVerdict::Changed => self.changed,
            ChangesetVerdict::Unchanged => self.unchanged,
            ChangesetVerdict::Removed => self.removed,
        }
    }
}

/// A media type that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub media_type: MediaType,
    pub phase: TaskPhase,
    pub error: String,
}

/// Outcome of one synchronisation pass over an import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub import: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Media types that synchronised, in the order they ran.
    pub media_types: Vec<MediaTypeReport>,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn new(import: &Import) -> Self {
        Self {
            import: import.describe(),
            started_at: Utc::now(),
            finished_at: None,
            media_types: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// True when every media type of the pass completed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn get(&self, media_type: MediaType) -> Option<&MediaTypeReport> {
        self.media_types
            .iter()
            .find(|report| report.media_type == media_type)
    }

    pub fn failed_media_types(&self) -> Vec<MediaType> {
        self.failures.iter().map(|f| f.media_type).collect()
    }

    /// Sum of one verdict across every media type.
    pub fn total(&self, verdict: ChangesetVerdict) -> usize {
        self.media_types.iter().map(|r| r.count(verdict)).sum()
    }

    pub(crate) fn record_failure(
        &mut self,
        media_type: MediaType,
        phase: TaskPhase,
        error: impl ToString,
    ) {
        self.failures.push(SyncFailure {
            media_type,
            phase,
            error: error.to_string(),
        });
    }

    pub(crate) fn record_cleanup(&mut self, media_type: MediaType, removed: usize) {
        if let Some(report) = self
            .media_types
            .iter_mut()
            .find(|report| report.media_type == media_type)
        {
            report.cleaned_up += removed;
        }
    }

    /// Result label used in logs and metrics.
    pub fn result_label(&self) -> &'static str {
        if self.failures.is_empty() {
            "success"
        } else if self.media_types.is_empty() {
            "failed"
        } else {
            "partial"
        }
    }
}
