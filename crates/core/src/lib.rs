pub mod catalog;
pub mod config;
pub mod handler;
pub mod importer;
pub mod media;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod task;
pub mod testing;

pub use catalog::{CatalogError, CatalogSession, ImportTag, MediaCatalog, SqliteMediaCatalog};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    ImportConfig, SourceConfig,
};
pub use handler::{ChangesetVerdict, HandlerError, HandlerSet, LocalItems, MediaImportHandler};
pub use importer::{ImporterError, JsonBatchImporter, MediaImporter};
pub use media::{GroupedMediaTypes, MediaDomain, MediaItem, MediaType, MediaTypeError};
pub use orchestrator::{
    CancellationFlag, ImportOutcome, OrchestratorError, SyncConfig, SyncOrchestrator, SyncReport,
    SyncRunner,
};
pub use registry::{
    Import, ImportRegistry, ImportSettings, RegistryError, RegistryStore, Source,
    SqliteRegistryStore,
};
pub use task::{TaskPhase, TaskProgress};
