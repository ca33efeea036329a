use std::collections::HashSet;

use super::{types::Config, ConfigError};
use crate::media::MediaDomain;

/// Validate configuration
/// Currently validates:
/// - Sync interval and concurrency are positive
/// - Source identifiers are non-empty and unique
/// - Seeded imports reference a seeded source that provides their media
///   types, and their media types belong to a single domain
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.sync.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "sync.interval_secs cannot be 0".to_string(),
        ));
    }
    if config.sync.max_concurrent_imports == 0 {
        return Err(ConfigError::ValidationError(
            "sync.max_concurrent_imports cannot be 0".to_string(),
        ));
    }

    let mut identifiers = HashSet::new();
    for source in &config.sources {
        if source.identifier.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "source identifier cannot be empty".to_string(),
            ));
        }
        if !identifiers.insert(source.identifier.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "source {} declared twice",
                source.identifier
            )));
        }
    }

    for import in config.seeded_imports()? {
        if !import.source.provides(&import.media_types) {
            return Err(ConfigError::ValidationError(format!(
                "source {} does not provide {}",
                import.source.identifier, import.media_types
            )));
        }
        let single_domain = [MediaDomain::Video, MediaDomain::Music]
            .iter()
            .any(|domain| domain.supports_all(&import.media_types));
        if !single_domain {
            return Err(ConfigError::ValidationError(format!(
                "import {} mixes video and music media types",
                import.describe()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImportConfig, SourceConfig};
    use crate::media::MediaType;
    use crate::registry::ImportSettings;

    fn source(media_types: Vec<MediaType>) -> SourceConfig {
        SourceConfig {
            identifier: "upnp://nas".to_string(),
            friendly_name: "NAS".to_string(),
            media_types,
        }
    }

    fn import(media_types: Vec<MediaType>) -> ImportConfig {
        ImportConfig {
            source: "upnp://nas".to_string(),
            path: "/media".to_string(),
            media_types,
            settings: ImportSettings::default(),
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = Config::default();
        config.sync.max_concurrent_imports = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_duplicate_source_fails() {
        let config = Config {
            sources: vec![source(vec![]), source(vec![])],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_source_must_provide_types() {
        let config = Config {
            sources: vec![source(vec![MediaType::Movie])],
            imports: vec![import(vec![MediaType::Movie, MediaType::MovieSet])],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_mixed_domains_fail() {
        let config = Config {
            sources: vec![source(vec![MediaType::Movie, MediaType::Song])],
            imports: vec![import(vec![MediaType::Movie, MediaType::Song])],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_valid_seeds() {
        let config = Config {
            sources: vec![source(vec![MediaType::Artist, MediaType::Album, MediaType::Song])],
            imports: vec![import(vec![MediaType::Artist, MediaType::Album, MediaType::Song])],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }
}
