//! Import registry: cached, persisted CRUD over sources and imports.
//!
//! One registry exists per catalog domain. Every mutation follows the same
//! order: open the store, mutate it, close it, and only then touch the
//! in-memory cache. A failed store call therefore leaves the cache exactly as
//! it was.
//!
//! The sources and imports caches sit behind two independent locks that are
//! never held at the same time. Cached imports carry a denormalized copy of
//! their source; read paths re-validate that copy against the sources cache
//! before handing it out.

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteRegistryStore;
pub use store::{RegistrySession, RegistryStore};
pub use types::{Import, ImportKey, ImportSettings, RegistryError, Source};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::media::{GroupedMediaTypes, MediaDomain};

/// Registry of sources and imports for one catalog domain.
pub struct ImportRegistry {
    domain: MediaDomain,
    store: Arc<dyn RegistryStore>,
    loaded: AtomicBool,
    init_lock: Mutex<()>,
    sources: RwLock<HashMap<String, Source>>,
    imports: RwLock<HashMap<ImportKey, Import>>,
    /// Sources currently marked offline. Not persisted.
    inactive: RwLock<HashSet<String>>,
}

impl ImportRegistry {
    pub fn new(domain: MediaDomain, store: Arc<dyn RegistryStore>) -> Self {
        Self {
            domain,
            store,
            loaded: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            sources: RwLock::new(HashMap::new()),
            imports: RwLock::new(HashMap::new()),
            inactive: RwLock::new(HashSet::new()),
        }
    }

    pub fn domain(&self) -> MediaDomain {
        self.domain
    }

    /// Load every source and import from the store.
    ///
    /// Idempotent: once loaded, further calls return `Ok` without touching
    /// the store.
    pub fn initialize(&self) -> Result<(), RegistryError> {
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = self
            .init_lock
            .lock()
            .map_err(|_| RegistryError::LockPoisoned)?;
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }

        let (sources, imports) = {
            let session = self.store.open()?;
            (session.get_sources()?, session.get_imports()?)
        };

        let sources: HashMap<String, Source> = sources
            .into_iter()
            .map(|source| (source.identifier.clone(), source))
            .collect();

        let mut cached_imports = HashMap::with_capacity(imports.len());
        for mut import in imports {
            match sources.get(&import.source.identifier) {
                Some(source) => import.source = source.clone(),
                None => {
                    warn!(
                        domain = self.domain.as_str(),
                        import = %import.describe(),
                        "Skipping import whose source is not registered"
                    );
                    continue;
                }
            }
            cached_imports.insert(import.key(), import);
        }

        let source_count = sources.len();
        let import_count = cached_imports.len();
        *self.write_sources()? = sources;
        *self.write_imports()? = cached_imports;
        self.loaded.store(true, Ordering::Release);

        info!(
            domain = self.domain.as_str(),
            sources = source_count,
            imports = import_count,
            "Import registry loaded"
        );
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    // =========================================================================
    // Imports
    // =========================================================================

    pub fn get_imports(&self) -> Result<Vec<Import>, RegistryError> {
        self.select_imports(|_| true)
    }

    pub fn get_imports_by_source(&self, source_id: &str) -> Result<Vec<Import>, RegistryError> {
        self.select_imports(|import| import.source.identifier == source_id)
    }

    /// Imports whose grouped media types equal `media_types`.
    pub fn get_imports_by_media_type(
        &self,
        media_types: &GroupedMediaTypes,
    ) -> Result<Vec<Import>, RegistryError> {
        self.select_imports(|import| &import.media_types == media_types)
    }

    /// Imports at `path`, and below it when `include_subdirs` is set.
    pub fn get_imports_by_path(
        &self,
        path: &str,
        include_subdirs: bool,
    ) -> Result<Vec<Import>, RegistryError> {
        self.select_imports(|import| {
            import.path == path || (include_subdirs && is_below(&import.path, path))
        })
    }

    pub fn get_import(
        &self,
        path: &str,
        media_types: &GroupedMediaTypes,
    ) -> Result<Option<Import>, RegistryError> {
        self.ensure_loaded()?;

        let found = self
            .read_imports()?
            .get(&(path.to_string(), media_types.clone()))
            .cloned();

        match found {
            Some(import) => Ok(self.revalidate(vec![import])?.pop()),
            None => Ok(None),
        }
    }

    /// Register an import.
    ///
    /// Returns `Ok(false)` when an identical import is already registered.
    /// An import that differs from the registered one under the same key
    /// replaces it.
    pub fn add_import(&self, import: &Import) -> Result<bool, RegistryError> {
        self.ensure_loaded()?;
        self.validate_import(import)?;

        // Held until the cache is updated so the source cannot be removed
        // while the import is being written.
        let sources = self.read_sources()?;
        let mut candidate = import.clone();
        candidate.source = canonical_source(&sources, &import.source.identifier)?;

        if self.read_imports()?.get(&candidate.key()) == Some(&candidate) {
            debug!(import = %candidate.describe(), "Import already registered");
            return Ok(false);
        }

        {
            let session = self.store.open()?;
            session.add_import(&candidate)?;
        }

        info!(
            domain = self.domain.as_str(),
            import = %candidate.describe(),
            "Import added"
        );
        self.write_imports()?.insert(candidate.key(), candidate);
        Ok(true)
    }

    /// Update a registered import's source link, settings and timestamp.
    ///
    /// Returns `Ok(false)` when nothing changed.
    pub fn update_import(&self, import: &Import) -> Result<bool, RegistryError> {
        self.ensure_loaded()?;
        self.validate_import(import)?;

        let sources = self.read_sources()?;
        let mut candidate = import.clone();
        candidate.source = canonical_source(&sources, &import.source.identifier)?;

        match self.read_imports()?.get(&candidate.key()) {
            None => return Err(RegistryError::NotFound(candidate.describe())),
            Some(existing) if existing == &candidate => return Ok(false),
            Some(_) => {}
        }

        let updated = {
            let session = self.store.open()?;
            session.update_import(&candidate)?
        };
        if !updated {
            return Err(RegistryError::NotFound(candidate.describe()));
        }

        debug!(import = %candidate.describe(), "Import updated");
        self.write_imports()?.insert(candidate.key(), candidate);
        Ok(true)
    }

    /// Remove a registered import. Fails with `NotFound` if the key is absent.
    pub fn remove_import(&self, import: &Import) -> Result<(), RegistryError> {
        self.ensure_loaded()?;

        let key = import.key();
        if !self.read_imports()?.contains_key(&key) {
            return Err(RegistryError::NotFound(import.describe()));
        }

        {
            let session = self.store.open()?;
            session.remove_import(&import.path, &import.media_types)?;
        }

        info!(
            domain = self.domain.as_str(),
            import = %import.describe(),
            "Import removed"
        );
        self.write_imports()?.remove(&key);
        Ok(())
    }

    /// Stamp a completed synchronization on the import and its source.
    ///
    /// The cached import, the cached source (and the source copy held by
    /// every sibling import) and the caller's `import` end up carrying the
    /// same timestamp.
    pub fn update_last_sync(&self, import: &mut Import) -> Result<(), RegistryError> {
        self.ensure_loaded()?;

        let key = import.key();
        if !self.read_imports()?.contains_key(&key) {
            return Err(RegistryError::NotFound(import.describe()));
        }

        let now = Utc::now();
        {
            let session = self.store.open()?;
            session.update_last_sync(import, now)?;
        }

        let source_id = import.source.identifier.clone();
        {
            let mut sources = self.write_sources()?;
            if let Some(source) = sources.get_mut(&source_id) {
                source.last_synced = Some(now);
            }
        }
        {
            let mut imports = self.write_imports()?;
            for cached in imports.values_mut() {
                if cached.source.identifier == source_id {
                    cached.source.last_synced = Some(now);
                }
            }
            if let Some(cached) = imports.get_mut(&key) {
                cached.last_synced = Some(now);
            }
        }

        import.last_synced = Some(now);
        import.source.last_synced = Some(now);
        Ok(())
    }

    // =========================================================================
    // Sources
    // =========================================================================

    /// Sources able to supply every type in `media_types`; all sources when
    /// `media_types` is empty.
    pub fn get_sources(
        &self,
        media_types: &GroupedMediaTypes,
    ) -> Result<Vec<Source>, RegistryError> {
        self.ensure_loaded()?;

        let mut sources: Vec<Source> = self
            .read_sources()?
            .values()
            .filter(|source| media_types.is_empty() || source.provides(media_types))
            .cloned()
            .collect();
        sources.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(sources)
    }

    pub fn get_source(&self, identifier: &str) -> Result<Option<Source>, RegistryError> {
        self.ensure_loaded()?;
        Ok(self.read_sources()?.get(identifier).cloned())
    }

    /// Register a source.
    ///
    /// Returns `Ok(false)` when an identical source is already registered.
    /// A differing source under the same identifier replaces the registered
    /// one and is propagated into its imports.
    pub fn add_source(&self, source: &Source) -> Result<bool, RegistryError> {
        self.ensure_loaded()?;
        validate_source(source)?;

        if self.read_sources()?.get(&source.identifier) == Some(source) {
            debug!(source = %source.identifier, "Source already registered");
            return Ok(false);
        }

        {
            let session = self.store.open()?;
            session.add_source(source)?;
        }

        info!(
            domain = self.domain.as_str(),
            source = %source.identifier,
            "Source added"
        );
        self.write_sources()?
            .insert(source.identifier.clone(), source.clone());
        self.propagate_source(source)?;
        Ok(true)
    }

    /// Update a registered source and every import that references it.
    ///
    /// Returns `Ok(false)` when nothing changed.
    pub fn update_source(&self, source: &Source) -> Result<bool, RegistryError> {
        self.ensure_loaded()?;
        validate_source(source)?;

        match self.read_sources()?.get(&source.identifier) {
            None => return Err(RegistryError::NotFound(source.identifier.clone())),
            Some(existing) if existing == source => return Ok(false),
            Some(_) => {}
        }

        let updated = {
            let session = self.store.open()?;
            session.update_source(source)?
        };
        if !updated {
            return Err(RegistryError::NotFound(source.identifier.clone()));
        }

        debug!(source = %source.identifier, "Source updated");
        self.write_sources()?
            .insert(source.identifier.clone(), source.clone());
        self.propagate_source(source)?;
        Ok(true)
    }

    /// Remove a source together with every import that references it.
    pub fn remove_source(&self, identifier: &str) -> Result<(), RegistryError> {
        self.ensure_loaded()?;

        // Sources stay write-locked until the imports cache is pruned, so no
        // import of the removed source can be added or observed meanwhile.
        let mut sources = self.write_sources()?;
        if !sources.contains_key(identifier) {
            return Err(RegistryError::NotFound(identifier.to_string()));
        }

        {
            let session = self.store.open()?;
            session.remove_source(identifier)?;
        }

        sources.remove(identifier);
        let removed_imports = {
            let mut imports = self.write_imports()?;
            let before = imports.len();
            imports.retain(|_, import| import.source.identifier != identifier);
            before - imports.len()
        };
        drop(sources);
        self.inactive
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?
            .remove(identifier);

        info!(
            domain = self.domain.as_str(),
            source = %identifier,
            removed_imports,
            "Source removed"
        );
        Ok(())
    }

    /// Whether a source is online. Unknown sources are reported inactive.
    pub fn is_source_active(&self, identifier: &str) -> Result<bool, RegistryError> {
        if !self.read_sources()?.contains_key(identifier) {
            return Ok(false);
        }
        Ok(!self
            .inactive
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?
            .contains(identifier))
    }

    /// Mark a source online or offline. Returns whether the state changed.
    pub fn set_source_active(&self, identifier: &str, active: bool) -> Result<bool, RegistryError> {
        self.ensure_loaded()?;
        if !self.read_sources()?.contains_key(identifier) {
            return Err(RegistryError::NotFound(identifier.to_string()));
        }

        let mut inactive = self
            .inactive
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?;
        let changed = if active {
            inactive.remove(identifier)
        } else {
            inactive.insert(identifier.to_string())
        };
        Ok(changed)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn ensure_loaded(&self) -> Result<(), RegistryError> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(RegistryError::NotInitialized)
        }
    }

    fn validate_import(&self, import: &Import) -> Result<(), RegistryError> {
        if import.source.identifier.trim().is_empty() {
            return Err(RegistryError::InvalidImport(
                "missing source identifier".to_string(),
            ));
        }
        if import.path.trim().is_empty() {
            return Err(RegistryError::InvalidImport("missing path".to_string()));
        }
        if import.media_types.is_empty() {
            return Err(RegistryError::InvalidImport(
                "missing media types".to_string(),
            ));
        }
        if !self.domain.supports_all(&import.media_types) {
            return Err(RegistryError::UnsupportedMediaTypes(
                import.media_types.clone(),
                self.domain.as_str(),
            ));
        }
        Ok(())
    }

    fn propagate_source(&self, source: &Source) -> Result<(), RegistryError> {
        let mut imports = self.write_imports()?;
        for import in imports.values_mut() {
            if import.source.identifier == source.identifier {
                import.source = source.clone();
            }
        }
        Ok(())
    }

    /// Snapshot matching imports, then re-validate them against the sources
    /// cache. The two locks are taken one after the other.
    fn select_imports(
        &self,
        predicate: impl Fn(&Import) -> bool,
    ) -> Result<Vec<Import>, RegistryError> {
        self.ensure_loaded()?;

        let selected: Vec<Import> = self
            .read_imports()?
            .values()
            .filter(|import| predicate(import))
            .cloned()
            .collect();

        let mut imports = self.revalidate(selected)?;
        imports.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(imports)
    }

    /// Drop imports whose source has disappeared and refresh the source copy
    /// of the rest.
    fn revalidate(&self, imports: Vec<Import>) -> Result<Vec<Import>, RegistryError> {
        let sources = self.read_sources()?;
        Ok(imports
            .into_iter()
            .filter_map(|mut import| {
                let source = sources.get(&import.source.identifier)?;
                import.source = source.clone();
                Some(import)
            })
            .collect())
    }

    fn read_sources(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Source>>, RegistryError> {
        self.sources.read().map_err(|_| RegistryError::LockPoisoned)
    }

    fn write_sources(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<String, Source>>, RegistryError> {
        self.sources.write().map_err(|_| RegistryError::LockPoisoned)
    }

    fn read_imports(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<ImportKey, Import>>, RegistryError> {
        self.imports.read().map_err(|_| RegistryError::LockPoisoned)
    }

    fn write_imports(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<ImportKey, Import>>, RegistryError> {
        self.imports.write().map_err(|_| RegistryError::LockPoisoned)
    }
}

fn canonical_source(
    sources: &HashMap<String, Source>,
    identifier: &str,
) -> Result<Source, RegistryError> {
    sources
        .get(identifier)
        .cloned()
        .ok_or_else(|| RegistryError::UnknownSource(identifier.to_string()))
}

fn validate_source(source: &Source) -> Result<(), RegistryError> {
    if source.identifier.trim().is_empty() {
        return Err(RegistryError::InvalidSource(
            "missing identifier".to_string(),
        ));
    }
    if source.friendly_name.trim().is_empty() {
        return Err(RegistryError::InvalidSource(
            "missing friendly name".to_string(),
        ));
    }
    Ok(())
}

/// Whether `path` lies strictly below `parent`.
fn is_below(path: &str, parent: &str) -> bool {
    if parent.is_empty() || path.len() <= parent.len() || !path.starts_with(parent) {
        return false;
    }
    parent.ends_with('/') || path[parent.len()..].starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaType;
    use crate::testing::FailingRegistryStore;

    fn nas() -> Source {
        Source::new(
            "upnp://nas",
            "NAS",
            [
                MediaType::Movie,
                MediaType::TvShow,
                MediaType::Season,
                MediaType::Episode,
            ],
        )
    }

    fn movies() -> GroupedMediaTypes {
        GroupedMediaTypes::single(MediaType::Movie)
    }

    fn loaded_registry() -> ImportRegistry {
        let store = Arc::new(SqliteRegistryStore::in_memory().unwrap());
        let registry = ImportRegistry::new(MediaDomain::Video, store);
        registry.initialize().unwrap();
        registry.add_source(&nas()).unwrap();
        registry
    }

    #[test]
    fn test_operations_require_initialize() {
        let store = Arc::new(SqliteRegistryStore::in_memory().unwrap());
        let registry = ImportRegistry::new(MediaDomain::Video, store);

        assert!(matches!(
            registry.get_imports(),
            Err(RegistryError::NotInitialized)
        ));
        registry.initialize().unwrap();
        registry.initialize().unwrap();
        assert!(registry.get_imports().unwrap().is_empty());
    }

    #[test]
    fn test_add_import_validation() {
        let registry = loaded_registry();

        let no_path = Import::new("", movies(), nas());
        assert!(matches!(
            registry.add_import(&no_path),
            Err(RegistryError::InvalidImport(_))
        ));

        let no_types = Import::new("/movies", GroupedMediaTypes::default(), nas());
        assert!(matches!(
            registry.add_import(&no_types),
            Err(RegistryError::InvalidImport(_))
        ));

        let songs = Import::new("/music", GroupedMediaTypes::single(MediaType::Song), nas());
        assert!(matches!(
            registry.add_import(&songs),
            Err(RegistryError::UnsupportedMediaTypes(_, "video"))
        ));

        let stranger = Import::new(
            "/movies",
            movies(),
            Source::new("smb://other", "Other", [MediaType::Movie]),
        );
        assert!(matches!(
            registry.add_import(&stranger),
            Err(RegistryError::UnknownSource(_))
        ));
    }

    #[test]
    fn test_add_import_is_idempotent() {
        let registry = loaded_registry();
        let import = Import::new("/movies", movies(), nas());

        assert!(registry.add_import(&import).unwrap());
        assert!(!registry.add_import(&import).unwrap());
        assert_eq!(registry.get_imports().unwrap().len(), 1);
    }

    #[test]
    fn test_update_and_remove_missing_import() {
        let registry = loaded_registry();
        let import = Import::new("/movies", movies(), nas());

        assert!(matches!(
            registry.update_import(&import),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.remove_import(&import),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_import_settings() {
        let registry = loaded_registry();
        let import = Import::new("/movies", movies(), nas());
        registry.add_import(&import).unwrap();

        let changed = import.clone().with_settings(ImportSettings {
            allow_removal: false,
            ..Default::default()
        });
        assert!(registry.update_import(&changed).unwrap());
        assert!(!registry.update_import(&changed).unwrap());

        let cached = registry.get_import("/movies", &movies()).unwrap().unwrap();
        assert!(!cached.settings.allow_removal);
    }

    #[test]
    fn test_get_imports_by_path() {
        let registry = loaded_registry();
        registry
            .add_import(&Import::new("/media", movies(), nas()))
            .unwrap();
        registry
            .add_import(&Import::new("/media/tv", movies(), nas()))
            .unwrap();
        registry
            .add_import(&Import::new("/media-old", movies(), nas()))
            .unwrap();

        let exact = registry.get_imports_by_path("/media", false).unwrap();
        assert_eq!(exact.len(), 1);

        let nested = registry.get_imports_by_path("/media", true).unwrap();
        let paths: Vec<_> = nested.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["/media", "/media/tv"]);
    }

    #[test]
    fn test_update_source_propagates_into_imports() {
        let registry = loaded_registry();
        registry
            .add_import(&Import::new("/movies", movies(), nas()))
            .unwrap();

        let mut renamed = nas();
        renamed.friendly_name = "Attic NAS".to_string();
        assert!(registry.update_source(&renamed).unwrap());

        let import = registry.get_import("/movies", &movies()).unwrap().unwrap();
        assert_eq!(import.source.friendly_name, "Attic NAS");
    }

    #[test]
    fn test_update_last_sync_keeps_three_copies_consistent() {
        let registry = loaded_registry();
        let mut import = Import::new("/movies", movies(), nas());
        registry.add_import(&import).unwrap();
        let tv = GroupedMediaTypes::new([MediaType::TvShow, MediaType::Season, MediaType::Episode])
            .unwrap();
        registry
            .add_import(&Import::new("/tv", tv.clone(), nas()))
            .unwrap();

        registry.update_last_sync(&mut import).unwrap();

        let stamp = import.last_synced;
        assert!(stamp.is_some());
        assert_eq!(import.source.last_synced, stamp);

        let cached = registry.get_import("/movies", &movies()).unwrap().unwrap();
        assert_eq!(cached.last_synced, stamp);
        assert_eq!(cached.source.last_synced, stamp);

        let source = registry.get_source("upnp://nas").unwrap().unwrap();
        assert_eq!(source.last_synced, stamp);

        let sibling = registry.get_import("/tv", &tv).unwrap().unwrap();
        assert_eq!(sibling.last_synced, None);
        assert_eq!(sibling.source.last_synced, stamp);
    }

    #[test]
    fn test_get_sources_filters_by_media_types() {
        let registry = loaded_registry();
        registry
            .add_source(&Source::new("smb://music", "Music", [MediaType::MusicVideo]))
            .unwrap();

        assert_eq!(
            registry
                .get_sources(&GroupedMediaTypes::default())
                .unwrap()
                .len(),
            2
        );
        let tv_sources = registry
            .get_sources(&GroupedMediaTypes::new([MediaType::TvShow, MediaType::Episode]).unwrap())
            .unwrap();
        assert_eq!(tv_sources, vec![nas()]);
    }

    #[test]
    fn test_source_active_flag() {
        let registry = loaded_registry();

        assert!(registry.is_source_active("upnp://nas").unwrap());
        assert!(registry.set_source_active("upnp://nas", false).unwrap());
        assert!(!registry.is_source_active("upnp://nas").unwrap());
        assert!(!registry.set_source_active("upnp://nas", false).unwrap());
        assert!(registry.set_source_active("upnp://nas", true).unwrap());
        assert!(matches!(
            registry.set_source_active("smb://nope", true),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_store_failure_leaves_cache_untouched() {
        let store = Arc::new(FailingRegistryStore::new(
            SqliteRegistryStore::in_memory().unwrap(),
        ));
        let registry = ImportRegistry::new(MediaDomain::Video, store.clone());
        registry.initialize().unwrap();
        registry.add_source(&nas()).unwrap();

        store.set_fail_writes(true);
        let import = Import::new("/movies", movies(), nas());
        assert!(matches!(
            registry.add_import(&import),
            Err(RegistryError::Store(_))
        ));
        assert!(registry.get_imports().unwrap().is_empty());

        assert!(matches!(
            registry.remove_source("upnp://nas"),
            Err(RegistryError::Store(_))
        ));
        assert!(registry.get_source("upnp://nas").unwrap().is_some());
    }

    #[test]
    fn test_is_below() {
        assert!(is_below("/media/tv", "/media"));
        assert!(is_below("/media/tv", "/media/"));
        assert!(!is_below("/media-old", "/media"));
        assert!(!is_below("/media", "/media"));
    }
}
