//! Backing store for the import registry.

use chrono::{DateTime, Utc};

use super::{Import, RegistryError, Source};
use crate::media::GroupedMediaTypes;

/// A durable store of sources and imports.
///
/// `open` hands out a session; dropping the session closes the store again.
/// The registry always follows open, mutate, close, and only then touches
/// its cache.
pub trait RegistryStore: Send + Sync {
    /// Open the store.
    fn open(&self) -> Result<Box<dyn RegistrySession + '_>, RegistryError>;
}

/// An open handle on a registry store.
pub trait RegistrySession {
    /// Load every source.
    fn get_sources(&self) -> Result<Vec<Source>, RegistryError>;

    /// Insert a source, replacing an existing row with the same identifier.
    fn add_source(&self, source: &Source) -> Result<(), RegistryError>;

    /// Update an existing source. Returns false if no row matched.
    fn update_source(&self, source: &Source) -> Result<bool, RegistryError>;

    /// Remove a source and every import that references it.
    /// Returns false if no row matched.
    fn remove_source(&self, identifier: &str) -> Result<bool, RegistryError>;

    /// Load every import with its source attached.
    fn get_imports(&self) -> Result<Vec<Import>, RegistryError>;

    /// Insert an import, replacing an existing row with the same key.
    fn add_import(&self, import: &Import) -> Result<(), RegistryError>;

    /// Update an existing import. Returns false if no row matched.
    fn update_import(&self, import: &Import) -> Result<bool, RegistryError>;

    /// Remove an import. Returns false if no row matched.
    fn remove_import(
        &self,
        path: &str,
        media_types: &GroupedMediaTypes,
    ) -> Result<bool, RegistryError>;

    /// Record a completed synchronization on both the import and its source.
    fn update_last_sync(&self, import: &Import, at: DateTime<Utc>) -> Result<(), RegistryError>;
}
