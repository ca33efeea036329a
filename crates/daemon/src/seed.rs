//! Registers the sources and imports listed in the configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use mediaimport_core::{Config, ImportRegistry};

/// Counts of what seeding added.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub sources_added: usize,
    pub imports_added: usize,
}

/// Add every configured source to each registry whose domain it supplies
/// types for, and every configured import to the registry of its domain.
///
/// Sync timestamps of entries already registered are carried over, so an
/// entry whose configuration did not change is left alone.
pub fn seed_registries(config: &Config, registries: &[Arc<ImportRegistry>]) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    for seeded in config.seeded_sources() {
        let mut placed = false;
        for registry in registries {
            let domain = registry.domain();
            if !seeded
                .media_types
                .iter()
                .any(|t| domain.supported_media_types().contains(t))
            {
                continue;
            }
            placed = true;

            let mut source = seeded.clone();
            if let Some(existing) = registry.get_source(&source.identifier)? {
                source.last_synced = existing.last_synced;
            }
            if registry
                .add_source(&source)
                .with_context(|| format!("Failed to register source {}", source.identifier))?
            {
                summary.sources_added += 1;
            }
        }
        if !placed {
            warn!(source = %seeded.identifier, "Source provides no supported media type");
        }
    }

    for mut import in config.seeded_imports()? {
        let registry = registries
            .iter()
            .find(|registry| registry.domain().supports_all(&import.media_types))
            .with_context(|| format!("No registry holds imports of {}", import.media_types))?;
        if let Some(existing) = registry.get_import(&import.path, &import.media_types)? {
            import.last_synced = existing.last_synced;
        }

        if registry
            .add_import(&import)
            .with_context(|| format!("Failed to register import {}", import.describe()))?
        {
            summary.imports_added += 1;
        } else {
            debug!(import = %import.describe(), "Import already registered");
        }
    }

    info!(
        sources = summary.sources_added,
        imports = summary.imports_added,
        "Seeded registries from configuration"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaimport_core::{
        load_config_from_str, GroupedMediaTypes, MediaDomain, MediaType, SqliteRegistryStore,
    };

    fn registries() -> Vec<Arc<ImportRegistry>> {
        [MediaDomain::Video, MediaDomain::Music]
            .into_iter()
            .map(|domain| {
                let registry =
                    ImportRegistry::new(domain, Arc::new(SqliteRegistryStore::in_memory().unwrap()));
                registry.initialize().unwrap();
                Arc::new(registry)
            })
            .collect()
    }

    const CONFIG: &str = r#"
[[sources]]
identifier = "upnp://nas"
friendly_name = "NAS"
media_types = ["movie", "set", "tvshow", "season", "episode", "artist", "album", "song"]

[[sources]]
identifier = "smb://films"
friendly_name = "Films"
media_types = ["movie"]

[[imports]]
source = "upnp://nas"
path = "/tv"
media_types = ["tvshow", "season", "episode"]

[[imports]]
source = "upnp://nas"
path = "/music"
media_types = ["artist", "album", "song"]

[[imports]]
source = "smb://films"
path = "/"
media_types = ["movie"]
"#;

    #[test]
    fn test_seeds_each_domain() {
        let config = load_config_from_str(CONFIG).unwrap();
        let registries = registries();

        let summary = seed_registries(&config, &registries).unwrap();
        // NAS lands in both registries, films only in the video one
        assert_eq!(summary.sources_added, 3);
        assert_eq!(summary.imports_added, 3);

        let video = &registries[0];
        let music = &registries[1];
        assert_eq!(video.get_imports().unwrap().len(), 2);
        assert_eq!(music.get_imports().unwrap().len(), 1);
        assert!(music.get_source("smb://films").unwrap().is_none());
    }

    #[test]
    fn test_seeding_twice_adds_nothing() {
        let config = load_config_from_str(CONFIG).unwrap();
        let registries = registries();

        seed_registries(&config, &registries).unwrap();
        let summary = seed_registries(&config, &registries).unwrap();
        assert_eq!(summary, SeedSummary::default());
    }

    #[test]
    fn test_reseeding_keeps_sync_timestamps() {
        let config = load_config_from_str(CONFIG).unwrap();
        let registries = registries();
        seed_registries(&config, &registries).unwrap();

        let video = &registries[0];
        let types = GroupedMediaTypes::new([MediaType::TvShow, MediaType::Season, MediaType::Episode])
            .unwrap();
        let mut import = video.get_import("/tv", &types).unwrap().unwrap();
        video.update_last_sync(&mut import).unwrap();
        let synced_at = import.last_synced;
        assert!(synced_at.is_some());

        let summary = seed_registries(&config, &registries).unwrap();
        assert_eq!(summary, SeedSummary::default());

        let import = video.get_import("/tv", &types).unwrap().unwrap();
        assert_eq!(import.last_synced, synced_at);
        assert_eq!(import.source.last_synced, synced_at);
        assert_eq!(
            video.get_source("upnp://nas").unwrap().unwrap().last_synced,
            synced_at
        );
    }
}
