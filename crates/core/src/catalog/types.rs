//! Types for the persisted media catalog.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::MediaType;
use crate::registry::Import;

/// What every imported catalog record is tagged with, so later passes of the
/// same import can find it again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportTag {
    /// Identifier of the source the item came from.
    pub source_id: String,
    /// Path of the import the item belongs to.
    pub import_path: String,
}

impl ImportTag {
    pub fn new(source_id: impl Into<String>, import_path: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            import_path: import_path.into(),
        }
    }
}

impl From<&Import> for ImportTag {
    fn from(import: &Import) -> Self {
        Self::new(import.source.identifier.clone(), import.path.clone())
    }
}

/// Row counts, mostly for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub items: u64,
    pub enabled_items: u64,
    pub paths: u64,
}

/// Errors for catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("{0} {1} not found")]
    NotFound(MediaType, i64),

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self {
        CatalogError::Database(e.to_string())
    }
}
