//! Source and import types held by the registry.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::{GroupedMediaTypes, MediaType};

/// A registered external catalog provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Stable, unique key.
    pub identifier: String,
    pub friendly_name: String,
    /// Media types the provider can supply.
    #[serde(default)]
    pub media_types: BTreeSet<MediaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

impl Source {
    pub fn new(
        identifier: impl Into<String>,
        friendly_name: impl Into<String>,
        media_types: impl IntoIterator<Item = MediaType>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            friendly_name: friendly_name.into(),
            media_types: media_types.into_iter().collect(),
            last_synced: None,
        }
    }

    /// Whether the source can supply every type in the group.
    pub fn provides(&self, media_types: &GroupedMediaTypes) -> bool {
        media_types.iter().all(|t| self.media_types.contains(&t))
    }
}

/// Per-import synchronization flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Apply remote changes to items that already exist locally.
    pub update_imported_items: bool,
    /// Take play counts and resume points from the source.
    pub update_playback_metadata_from_source: bool,
    /// Remove local items that the source no longer reports.
    pub allow_removal: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            update_imported_items: true,
            update_playback_metadata_from_source: true,
            allow_removal: true,
        }
    }
}

/// Registry key of an import.
pub type ImportKey = (String, GroupedMediaTypes);

/// One reconciliation stream: a path on a source plus the media types
/// synchronized together from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    pub media_types: GroupedMediaTypes,
    /// Denormalized copy of the owning source.
    pub source: Source,
    #[serde(default)]
    pub settings: ImportSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

impl Import {
    pub fn new(path: impl Into<String>, media_types: GroupedMediaTypes, source: Source) -> Self {
        Self {
            path: path.into(),
            media_types,
            source,
            settings: ImportSettings::default(),
            last_synced: None,
        }
    }

    pub fn with_settings(mut self, settings: ImportSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn key(&self) -> ImportKey {
        (self.path.clone(), self.media_types.clone())
    }

    /// Short human readable name for logs.
    pub fn describe(&self) -> String {
        format!(
            "{}:{} [{}]",
            self.source.identifier, self.path, self.media_types
        )
    }
}

/// Errors for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry has not been initialized")]
    NotInitialized,

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Invalid import: {0}")]
    InvalidImport(String),

    #[error("Media types {0} are not supported by the {1} registry")]
    UnsupportedMediaTypes(GroupedMediaTypes, &'static str),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Registry lock poisoned")]
    LockPoisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_settings_default_enable_everything() {
        let settings = ImportSettings::default();
        assert!(settings.update_imported_items);
        assert!(settings.update_playback_metadata_from_source);
        assert!(settings.allow_removal);
    }

    #[test]
    fn test_import_settings_partial_deserialize() {
        let settings: ImportSettings = toml::from_str("allow_removal = false").unwrap();
        assert!(!settings.allow_removal);
        assert!(settings.update_imported_items);
    }

    #[test]
    fn test_source_provides() {
        let source = Source::new("upnp://nas", "NAS", [MediaType::Movie, MediaType::TvShow]);
        assert!(source.provides(&GroupedMediaTypes::single(MediaType::Movie)));
        assert!(!source.provides(
            &GroupedMediaTypes::new([MediaType::TvShow, MediaType::Episode]).unwrap()
        ));
    }

    #[test]
    fn test_import_key_and_describe() {
        let source = Source::new("upnp://nas", "NAS", [MediaType::Movie]);
        let import = Import::new(
            "/movies",
            GroupedMediaTypes::single(MediaType::Movie),
            source,
        );
        assert_eq!(
            import.key(),
            ("/movies".to_string(), GroupedMediaTypes::single(MediaType::Movie))
        );
        assert_eq!(import.describe(), "upnp://nas:/movies [movie]");
    }

    #[test]
    fn test_error_display() {
        let err = RegistryError::UnsupportedMediaTypes(
            GroupedMediaTypes::single(MediaType::Song),
            "video",
        );
        assert_eq!(
            err.to_string(),
            "Media types song are not supported by the video registry"
        );
    }
}
