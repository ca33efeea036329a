//! Import registry lifecycle integration tests.
//!
//! These tests run the registry against an on-disk store and reopen it the
//! way a restarted process would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use mediaimport_core::{
    media::{GroupedMediaTypes, MediaDomain, MediaType},
    registry::{Import, ImportRegistry, RegistryError, SqliteRegistryStore, Source},
    testing::{fixtures, FailingRegistryStore},
};

fn open_registry(dir: &TempDir) -> ImportRegistry {
    let store = SqliteRegistryStore::new(&dir.path().join("imports.db"))
        .expect("Failed to create registry store");
    let registry = ImportRegistry::new(MediaDomain::Video, Arc::new(store));
    registry.initialize().expect("Failed to load registry");
    registry
}

fn tv() -> GroupedMediaTypes {
    fixtures::group(&[MediaType::TvShow, MediaType::Season, MediaType::Episode])
}

#[test]
fn test_registry_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let registry = open_registry(&dir);
        registry.add_source(&fixtures::source()).unwrap();
        registry.add_import(&fixtures::tv_import()).unwrap();
        registry.add_import(&fixtures::movie_import()).unwrap();

        let mut import = fixtures::tv_import();
        registry.update_last_sync(&mut import).unwrap();
    }

    let registry = open_registry(&dir);
    let imports = registry.get_imports().unwrap();
    assert_eq!(imports.len(), 2);

    let tv_import = registry.get_import("/tv", &tv()).unwrap().unwrap();
    assert!(tv_import.last_synced.is_some());
    assert!(tv_import.source.last_synced.is_some());

    // The sibling import sees the source's sync time too
    let movie_import = registry
        .get_import("/movies", &fixtures::movie_import().media_types)
        .unwrap()
        .unwrap();
    assert!(movie_import.last_synced.is_none());
    assert_eq!(movie_import.source.last_synced, tv_import.source.last_synced);
}

#[test]
fn test_remove_source_cascades_to_imports() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let other = Source::new("smb://backup", "Backup", [MediaType::Movie]);

    registry.add_source(&fixtures::source()).unwrap();
    registry.add_source(&other).unwrap();
    registry.add_import(&fixtures::tv_import()).unwrap();
    registry
        .add_import(&Import::new(
            "/backup",
            GroupedMediaTypes::single(MediaType::Movie),
            other.clone(),
        ))
        .unwrap();

    registry.remove_source(fixtures::SOURCE_ID).unwrap();

    assert!(registry
        .get_imports_by_source(fixtures::SOURCE_ID)
        .unwrap()
        .is_empty());
    assert_eq!(registry.get_imports().unwrap().len(), 1);
    assert!(registry.get_source(fixtures::SOURCE_ID).unwrap().is_none());

    // The store agrees after a restart
    drop(registry);
    let registry = open_registry(&dir);
    let imports = registry.get_imports().unwrap();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].source.identifier, "smb://backup");
}

#[test]
fn test_imports_by_path_and_media_type() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    registry.add_source(&fixtures::source()).unwrap();
    registry.add_import(&fixtures::tv_import()).unwrap();
    registry
        .add_import(&Import::new("/tv/anime", tv(), fixtures::source()))
        .unwrap();
    registry.add_import(&fixtures::movie_import()).unwrap();

    assert_eq!(registry.get_imports_by_path("/tv", false).unwrap().len(), 1);
    assert_eq!(registry.get_imports_by_path("/tv", true).unwrap().len(), 2);
    assert_eq!(registry.get_imports_by_media_type(&tv()).unwrap().len(), 2);
    assert!(registry
        .get_imports_by_media_type(&GroupedMediaTypes::single(MediaType::TvShow))
        .unwrap()
        .is_empty());
}

#[test]
fn test_music_types_rejected_by_video_registry() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    registry.add_source(&fixtures::source()).unwrap();

    let result = registry.add_import(&fixtures::music_import());
    assert!(matches!(
        result,
        Err(RegistryError::UnsupportedMediaTypes(_, "video"))
    ));
}

#[test]
fn test_initialize_reads_store_once() {
    let store = Arc::new(FailingRegistryStore::new(
        SqliteRegistryStore::in_memory().unwrap(),
    ));
    let registry = ImportRegistry::new(MediaDomain::Video, store.clone());

    assert!(matches!(
        registry.get_imports(),
        Err(RegistryError::NotInitialized)
    ));

    registry.initialize().unwrap();
    registry.initialize().unwrap();
    assert_eq!(store.open_count(), 1);
}

#[test]
fn test_failed_source_update_keeps_cached_copy() {
    let store = Arc::new(FailingRegistryStore::new(
        SqliteRegistryStore::in_memory().unwrap(),
    ));
    let registry = ImportRegistry::new(MediaDomain::Video, store.clone());
    registry.initialize().unwrap();
    registry.add_source(&fixtures::source()).unwrap();
    registry.add_import(&fixtures::tv_import()).unwrap();

    let mut renamed = fixtures::source();
    renamed.friendly_name = "Attic NAS".to_string();

    store.set_fail_writes(true);
    assert!(registry.update_source(&renamed).is_err());
    let import = registry.get_import("/tv", &tv()).unwrap().unwrap();
    assert_eq!(import.source.friendly_name, "Living room NAS");

    store.set_fail_writes(false);
    assert!(registry.update_source(&renamed).unwrap());
    let import = registry.get_import("/tv", &tv()).unwrap().unwrap();
    assert_eq!(import.source.friendly_name, "Attic NAS");
}

#[test]
fn test_concurrent_source_removal_leaves_no_orphan_imports() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(open_registry(&dir));
    let done = Arc::new(AtomicBool::new(false));

    let mut stale = fixtures::source();
    stale.friendly_name = "Stale copy".to_string();

    // Adds imports regardless of whether the source is currently registered
    let adder = {
        let registry = registry.clone();
        let done = done.clone();
        let stale = stale.clone();
        thread::spawn(move || {
            let mut round = 0;
            while !done.load(Ordering::SeqCst) {
                let import = Import::new(format!("/tv/{}", round % 8), tv(), stale.clone());
                match registry.add_import(&import) {
                    Ok(_) | Err(RegistryError::UnknownSource(_)) => {}
                    Err(e) => panic!("Unexpected error adding import: {}", e),
                }
                round += 1;
            }
        })
    };

    let reader = {
        let registry = registry.clone();
        let done = done.clone();
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                for import in registry.get_imports().unwrap() {
                    // Every import carries the registered source, never a stale copy
                    assert_eq!(import.source.friendly_name, "Living room NAS");
                }
            }
        })
    };

    for _ in 0..100 {
        registry.add_source(&fixtures::source()).unwrap();
        registry.add_import(&fixtures::tv_import()).unwrap();
        registry.remove_source(fixtures::SOURCE_ID).unwrap();
    }
    done.store(true, Ordering::SeqCst);
    adder.join().unwrap();
    reader.join().unwrap();

    // The source went last, so nothing may be left in the cache or the store
    assert!(registry.get_imports().unwrap().is_empty());
    drop(registry);
    let reopened = open_registry(&dir);
    assert!(reopened.get_imports().unwrap().is_empty());
    assert!(reopened.get_source(fixtures::SOURCE_ID).unwrap().is_none());
}
