use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Nested keys are separated by a double underscore, so
/// `MEDIAIMPORT_SYNC__INTERVAL_SECS=60` sets `sync.interval_secs`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("MEDIAIMPORT_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.sync.interval_secs, 900);
        assert!(config.sources.is_empty());
        assert!(config.imports.is_empty());
    }

    #[test]
    fn test_load_config_from_str_seeds() {
        let toml = r#"
[sync]
max_concurrent_imports = 3

[[sources]]
identifier = "upnp://nas"
friendly_name = "NAS"
media_types = ["movie", "set"]

[[imports]]
source = "upnp://nas"
path = "/movies"
media_types = ["movie", "set"]

[imports.settings]
allow_removal = false
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.sync.max_concurrent_imports, 3);
        assert_eq!(config.sources[0].media_types, vec![MediaType::Movie, MediaType::MovieSet]);
        assert!(!config.imports[0].settings.allow_removal);
        assert!(config.imports[0].settings.update_imported_items);
    }

    #[test]
    fn test_load_config_from_str_unknown_media_type() {
        let toml = r#"
[[sources]]
identifier = "upnp://nas"
friendly_name = "NAS"
media_types = ["podcast"]
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[database]
catalog_path = "/var/lib/mediaimport/catalog.db"

[sync]
interval_secs = 120
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.sync.interval_secs, 120);
        assert_eq!(
            config.database.catalog_path.to_str(),
            Some("/var/lib/mediaimport/catalog.db")
        );
    }
}
