//! Persisted media catalog.
//!
//! Handlers are the only writers. Each synchronization pass opens its own
//! session, so two imports synchronizing concurrently never share a
//! transaction.

mod sqlite;
mod types;

pub use sqlite::SqliteMediaCatalog;
pub use types::{CatalogError, CatalogStats, ImportTag};

use std::collections::HashMap;

use crate::media::{ArtMap, MediaItem, MediaType};

/// A persisted media catalog.
pub trait MediaCatalog: Send + Sync {
    /// Open a new session. Dropping the session closes it; an open
    /// transaction is rolled back at that point.
    fn open(&self) -> Result<Box<dyn CatalogSession>, CatalogError>;
}

/// An open catalog connection.
pub trait CatalogSession {
    /// Begin a write transaction.
    fn begin_transaction(&self) -> Result<(), CatalogError>;

    fn commit_transaction(&self) -> Result<(), CatalogError>;

    fn rollback_transaction(&self) -> Result<(), CatalogError>;

    fn in_transaction(&self) -> bool;

    /// Items of one media type tagged with the given import, without art.
    fn get_items(
        &self,
        media_type: MediaType,
        tag: &ImportTag,
    ) -> Result<Vec<MediaItem>, CatalogError>;

    /// A single item with its art.
    fn get_item(&self, media_type: MediaType, id: i64) -> Result<Option<MediaItem>, CatalogError>;

    /// Art of every item of one media type tagged with the given import,
    /// keyed by item id.
    fn get_art_for_import(
        &self,
        media_type: MediaType,
        tag: &ImportTag,
    ) -> Result<HashMap<i64, ArtMap>, CatalogError>;

    /// Insert (`id` is `None`) or update an item, tagging it with the import.
    ///
    /// Container links are rewritten from the item's linkage ids and its art
    /// is replaced. Returns the item's database id.
    fn set_details(&self, item: &MediaItem, tag: &ImportTag) -> Result<i64, CatalogError>;

    /// Delete an item. Its links, art and path links go with it.
    fn delete_item(&self, media_type: MediaType, id: i64) -> Result<bool, CatalogError>;

    /// Register a path, returning its id. Registering a known path returns
    /// the existing id.
    fn add_path(&self, path: &str) -> Result<i64, CatalogError>;

    fn link_path(&self, item_id: i64, path_id: i64) -> Result<(), CatalogError>;

    /// Detach every path from an item and drop paths nothing refers to anymore.
    fn remove_path_from_item(&self, item_id: i64) -> Result<(), CatalogError>;

    fn get_paths_for_item(&self, item_id: i64) -> Result<Vec<String>, CatalogError>;

    /// Number of items of the given types linked to a container, across all
    /// imports.
    fn count_children(
        &self,
        parent_id: i64,
        child_types: &[MediaType],
    ) -> Result<u64, CatalogError>;

    /// Enable or disable every item of one media type tagged with the import.
    /// Returns the number of rows whose state changed.
    fn set_import_items_enabled(
        &self,
        media_type: MediaType,
        tag: &ImportTag,
        enabled: bool,
    ) -> Result<usize, CatalogError>;

    /// Whether an item is enabled. `None` if the item does not exist.
    fn is_item_enabled(&self, id: i64) -> Result<Option<bool>, CatalogError>;

    fn stats(&self) -> Result<CatalogStats, CatalogError>;
}
