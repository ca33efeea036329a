//! Registry store wrapper that injects write failures.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::media::GroupedMediaTypes;
use crate::registry::{Import, RegistryError, RegistrySession, RegistryStore, Source};

/// Wraps a real store. Reads always go through; writes fail with
/// `RegistryError::Store` while failures are switched on.
pub struct FailingRegistryStore<S> {
    inner: S,
    fail_writes: AtomicBool,
    opened: AtomicUsize,
}

impl<S: RegistryStore> FailingRegistryStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// How many sessions were opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl<S: RegistryStore> RegistryStore for FailingRegistryStore<S> {
    fn open(&self) -> Result<Box<dyn RegistrySession + '_>, RegistryError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FailingSession {
            inner: self.inner.open()?,
            fail_writes: self.fail_writes.load(Ordering::SeqCst),
        }))
    }
}

struct FailingSession<'a> {
    inner: Box<dyn RegistrySession + 'a>,
    fail_writes: bool,
}

impl FailingSession<'_> {
    fn check_write(&self) -> Result<(), RegistryError> {
        if self.fail_writes {
            Err(RegistryError::Store("injected write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RegistrySession for FailingSession<'_> {
    fn get_sources(&self) -> Result<Vec<Source>, RegistryError> {
        self.inner.get_sources()
    }

    fn add_source(&self, source: &Source) -> Result<(), RegistryError> {
        self.check_write()?;
        self.inner.add_source(source)
    }

    fn update_source(&self, source: &Source) -> Result<bool, RegistryError> {
        self.check_write()?;
        self.inner.update_source(source)
    }

    fn remove_source(&self, identifier: &str) -> Result<bool, RegistryError> {
        self.check_write()?;
        self.inner.remove_source(identifier)
    }

    fn get_imports(&self) -> Result<Vec<Import>, RegistryError> {
        self.inner.get_imports()
    }

    fn add_import(&self, import: &Import) -> Result<(), RegistryError> {
        self.check_write()?;
        self.inner.add_import(import)
    }

    fn update_import(&self, import: &Import) -> Result<bool, RegistryError> {
        self.check_write()?;
        self.inner.update_import(import)
    }

    fn remove_import(
        &self,
        path: &str,
        media_types: &GroupedMediaTypes,
    ) -> Result<bool, RegistryError> {
        self.check_write()?;
        self.inner.remove_import(path, media_types)
    }

    fn update_last_sync(&self, import: &Import, at: DateTime<Utc>) -> Result<(), RegistryError> {
        self.check_write()?;
        self.inner.update_last_sync(import, at)
    }
}
