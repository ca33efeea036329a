//! Synchronization configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the sync runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Enable/disable the periodic sync loop.
    /// When disabled, imports are only synchronised on request.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between two sweeps over every import.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Imports synchronised at the same time.
    /// Each one runs on its own blocking worker with its own transaction.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_imports: usize,

    /// Run a sweep right after start instead of waiting one interval.
    #[serde(default = "default_enabled")]
    pub sync_on_start: bool,

    /// Root directory read by the JSON batch importer.
    #[serde(default = "default_batches_dir")]
    pub batches_dir: PathBuf,
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    900 // 15 minutes
}

fn default_max_concurrent() -> usize {
    2
}

fn default_batches_dir() -> PathBuf {
    PathBuf::from("./batches")
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval(),
            max_concurrent_imports: default_max_concurrent(),
            sync_on_start: default_enabled(),
            batches_dir: default_batches_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval_secs, 900);
        assert_eq!(config.max_concurrent_imports, 2);
        assert!(config.sync_on_start);
        assert_eq!(config.batches_dir, PathBuf::from("./batches"));
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: SyncConfig = toml::from_str("").unwrap();
        assert!(config.enabled);
        assert_eq!(config.interval_secs, 900);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            enabled = false
            interval_secs = 60
            max_concurrent_imports = 4
            sync_on_start = false
            batches_dir = "/srv/batches"
        "#;
        let config: SyncConfig = toml::from_str(toml).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.max_concurrent_imports, 4);
        assert!(!config.sync_on_start);
        assert_eq!(config.batches_dir, PathBuf::from("/srv/batches"));
    }
}
