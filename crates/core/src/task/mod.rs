//! Phases of an import task.
//!
//! The orchestrator and the handlers label their work with these phases in
//! tracing spans, metrics and failure reports.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::media::MediaType;

/// A step of an import task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    /// Fetching remote items from the source.
    Retrieval,
    /// Comparing remote items against the catalog.
    Changeset,
    /// Writing the changeset into the catalog.
    Synchronisation,
    /// Removing containers that lost all their children.
    Cleanup,
    /// Pushing a local change back to the source.
    Update,
    /// Removing an import and everything it brought in.
    Removal,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Retrieval => "retrieval",
            TaskPhase::Changeset => "changeset",
            TaskPhase::Synchronisation => "synchronisation",
            TaskPhase::Cleanup => "cleanup",
            TaskPhase::Update => "update",
            TaskPhase::Removal => "removal",
        }
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a running import task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub phase: TaskPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    pub processed: usize,
    pub total: usize,
}

impl TaskProgress {
    pub fn new(phase: TaskPhase, media_type: Option<MediaType>, total: usize) -> Self {
        Self {
            phase,
            media_type,
            processed: 0,
            total,
        }
    }

    pub fn advance(&mut self) {
        self.processed += 1;
    }

    /// Completed share in percent; 100 for an empty task.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed.min(self.total) * 100) / self.total) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_tags() {
        assert_eq!(TaskPhase::Synchronisation.as_str(), "synchronisation");
        assert_eq!(
            serde_json::to_string(&TaskPhase::Cleanup).unwrap(),
            "\"cleanup\""
        );
    }

    #[test]
    fn test_progress_percent() {
        let mut progress = TaskProgress::new(TaskPhase::Changeset, Some(MediaType::Episode), 4);
        assert_eq!(progress.percent(), 0);
        progress.advance();
        assert_eq!(progress.percent(), 25);

        let empty = TaskProgress::new(TaskPhase::Cleanup, None, 0);
        assert_eq!(empty.percent(), 100);
    }
}
