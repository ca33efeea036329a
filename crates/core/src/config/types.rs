use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::media::{GroupedMediaTypes, MediaType};
use crate::orchestrator::SyncConfig;
use crate::registry::{Import, ImportSettings, Source};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Sources registered at startup.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Imports registered at startup.
    #[serde(default)]
    pub imports: Vec<ImportConfig>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Catalog shared by every media type.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default = "default_video_registry_path")]
    pub video_registry_path: PathBuf,
    #[serde(default = "default_music_registry_path")]
    pub music_registry_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            video_registry_path: default_video_registry_path(),
            music_registry_path: default_music_registry_path(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("catalog.db")
}

fn default_video_registry_path() -> PathBuf {
    PathBuf::from("video-imports.db")
}

fn default_music_registry_path() -> PathBuf {
    PathBuf::from("music-imports.db")
}

/// A source seeded from configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub identifier: String,
    pub friendly_name: String,
    #[serde(default)]
    pub media_types: Vec<MediaType>,
}

impl SourceConfig {
    pub fn to_source(&self) -> Source {
        Source::new(
            self.identifier.clone(),
            self.friendly_name.clone(),
            self.media_types.iter().copied(),
        )
    }
}

/// An import seeded from configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportConfig {
    /// Identifier of the owning source.
    pub source: String,
    pub path: String,
    pub media_types: Vec<MediaType>,
    #[serde(default)]
    pub settings: ImportSettings,
}

impl ImportConfig {
    /// Build the import for `source`. Fails on duplicate or missing media
    /// types.
    pub fn to_import(&self, source: Source) -> Result<Import, super::ConfigError> {
        let media_types = GroupedMediaTypes::new(self.media_types.iter().copied())
            .map_err(|e| super::ConfigError::ValidationError(format!("{}: {}", self.path, e)))?;
        if media_types.is_empty() {
            return Err(super::ConfigError::ValidationError(format!(
                "{}: no media types given",
                self.path
            )));
        }
        Ok(Import::new(self.path.clone(), media_types, source).with_settings(self.settings))
    }
}

impl Config {
    pub fn seeded_sources(&self) -> Vec<Source> {
        self.sources.iter().map(SourceConfig::to_source).collect()
    }

    /// Seeded imports linked to their seeded source.
    pub fn seeded_imports(&self) -> Result<Vec<Import>, super::ConfigError> {
        self.imports
            .iter()
            .map(|import| {
                let source = self
                    .sources
                    .iter()
                    .find(|s| s.identifier == import.source)
                    .map(SourceConfig::to_source)
                    .ok_or_else(|| {
                        super::ConfigError::ValidationError(format!(
                            "import {} references unknown source {}",
                            import.path, import.source
                        ))
                    })?;
                import.to_import(source)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            sources: vec![SourceConfig {
                identifier: "upnp://nas".to_string(),
                friendly_name: "NAS".to_string(),
                media_types: vec![MediaType::TvShow, MediaType::Season, MediaType::Episode],
            }],
            imports: vec![ImportConfig {
                source: "upnp://nas".to_string(),
                path: "/tv".to_string(),
                media_types: vec![MediaType::TvShow, MediaType::Season, MediaType::Episode],
                settings: ImportSettings::default(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_database_paths() {
        let database = DatabaseConfig::default();
        assert_eq!(database.catalog_path, PathBuf::from("catalog.db"));
        assert_eq!(database.music_registry_path, PathBuf::from("music-imports.db"));
    }

    #[test]
    fn test_seeded_imports_link_sources() {
        let imports = config().seeded_imports().unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].source.friendly_name, "NAS");
        assert_eq!(imports[0].media_types.len(), 3);
    }

    #[test]
    fn test_seeded_import_with_unknown_source_fails() {
        let mut config = config();
        config.imports[0].source = "smb://other".to_string();
        assert!(config.seeded_imports().is_err());
    }

    #[test]
    fn test_duplicate_media_types_rejected() {
        let mut config = config();
        config.imports[0].media_types = vec![MediaType::TvShow, MediaType::TvShow];
        assert!(config.seeded_imports().is_err());
    }
}
