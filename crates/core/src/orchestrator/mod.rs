//! Synchronization orchestrator.
//!
//! Drives imports through their media type handlers:
//! - **Planning**: handlers ordered so required media types run first
//! - **Passes**: changeset then synchronisation per media type, cleanup last
//! - **Runner**: async retrieval, blocking passes, periodic sweeps

mod config;
mod runner;
mod sync;
mod types;

pub use config::SyncConfig;
pub use runner::{ImportOutcome, SyncRunner};
pub use sync::{ProgressCallback, SyncOrchestrator};
pub use types::{CancellationFlag, MediaTypeReport, OrchestratorError, SyncFailure, SyncReport};
