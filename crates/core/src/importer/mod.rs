//! Retrieval seam: where remote item batches come from.
//!
//! The engine has no opinion on how a source produces its items. An
//! importer hands over one batch per import and media type, and may push
//! local changes back to the source.

mod json_batch;

pub use json_batch::JsonBatchImporter;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

/// Errors for importer operations.
#[derive(Debug, Error)]
pub enum ImporterError {
    /// Source is offline or cannot be reached.
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read batch {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed batch {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The batch carries items of another media type.
    #[error("Batch for {expected} contains a {found} item")]
    UnexpectedMediaType {
        expected: MediaType,
        found: MediaType,
    },

    #[error("Importer does not support {0}")]
    Unsupported(&'static str),
}

/// A producer of remote items.
#[async_trait]
pub trait MediaImporter: Send + Sync {
    /// Returns the name of this importer implementation.
    fn name(&self) -> &str;

    /// Fetch the remote items of one media type for an import.
    async fn retrieve(
        &self,
        import: &Import,
        media_type: MediaType,
    ) -> Result<Vec<MediaItem>, ImporterError>;

    /// Push a locally changed item (e.g. new playback state) to the source.
    async fn update_on_source(
        &self,
        _import: &Import,
        _item: &MediaItem,
    ) -> Result<(), ImporterError> {
        Err(ImporterError::Unsupported("updating items on the source"))
    }
}
