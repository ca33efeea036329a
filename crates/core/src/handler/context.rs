//! Per-batch state handed between the handler calls of one pass.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::warn;

use crate::catalog::{CatalogError, CatalogSession, ImportTag};
use crate::media::{ArtMap, MediaItem, MediaType};

/// State shared by the `determine_changeset` calls of one batch.
///
/// Owns a read session on the catalog and the batched art loader used to
/// fill in the details `get_items` leaves out. Art for the whole import is
/// fetched on the first request and served from memory afterwards.
pub struct ChangesetContext {
    session: Box<dyn CatalogSession>,
    media_type: MediaType,
    tag: ImportTag,
    art: Option<HashMap<i64, ArtMap>>,
}

impl ChangesetContext {
    pub fn new(session: Box<dyn CatalogSession>, media_type: MediaType, tag: ImportTag) -> Self {
        Self {
            session,
            media_type,
            tag,
            art: None,
        }
    }

    pub fn session(&self) -> &dyn CatalogSession {
        self.session.as_ref()
    }

    pub fn tag(&self) -> &ImportTag {
        &self.tag
    }

    /// Fill in the lazily loaded details of a local item.
    pub fn load_details(&mut self, item: &mut MediaItem) -> Result<(), CatalogError> {
        let Some(id) = item.id() else {
            return Ok(());
        };

        if self.art.is_none() {
            self.art = Some(
                self.session
                    .get_art_for_import(self.media_type, &self.tag)?,
            );
        }

        if let Some(art) = self.art.as_mut().and_then(|all| all.remove(&id)) {
            *item.art_mut() = art;
        }
        Ok(())
    }
}

/// An open write transaction on the catalog for one handler's batch.
///
/// Must end in `commit` or `rollback`. A transaction dropped while still open
/// is rolled back.
///
/// Container records looked up to link children are read once per media type
/// and kept until an item of that type is stored or deleted through the
/// transaction.
pub struct SyncTransaction {
    session: Box<dyn CatalogSession>,
    tag: ImportTag,
    open: bool,
    containers: RefCell<HashMap<MediaType, Rc<[MediaItem]>>>,
}

impl SyncTransaction {
    /// Begin a transaction on a freshly opened session.
    pub fn begin(session: Box<dyn CatalogSession>, tag: ImportTag) -> Result<Self, CatalogError> {
        session.begin_transaction()?;
        Ok(Self {
            session,
            tag,
            open: true,
            containers: RefCell::new(HashMap::new()),
        })
    }

    pub fn session(&self) -> &dyn CatalogSession {
        self.session.as_ref()
    }

    pub fn tag(&self) -> &ImportTag {
        &self.tag
    }

    /// Items of `media_type` stored by this import, read from the catalog on
    /// the first request.
    pub fn containers(&self, media_type: MediaType) -> Result<Rc<[MediaItem]>, CatalogError> {
        if let Some(items) = self.containers.borrow().get(&media_type) {
            return Ok(Rc::clone(items));
        }
        let items: Rc<[MediaItem]> = self.session.get_items(media_type, &self.tag)?.into();
        self.containers
            .borrow_mut()
            .insert(media_type, Rc::clone(&items));
        Ok(items)
    }

    /// Drop the cached items of `media_type` after they changed.
    pub fn forget_containers(&self, media_type: MediaType) {
        self.containers.borrow_mut().remove(&media_type);
    }

    pub fn commit(mut self) -> Result<(), CatalogError> {
        self.session.commit_transaction()?;
        self.open = false;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), CatalogError> {
        self.open = false;
        self.session.rollback_transaction()
    }
}

impl Drop for SyncTransaction {
    fn drop(&mut self) {
        if self.open {
            warn!(
                source = %self.tag.source_id,
                import = %self.tag.import_path,
                "Synchronisation transaction abandoned, rolling back"
            );
            if let Err(e) = self.session.rollback_transaction() {
                warn!(error = %e, "Rollback of abandoned transaction failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MediaCatalog, SqliteMediaCatalog};
    use crate::media::TvShow;

    fn tag() -> ImportTag {
        ImportTag::new("upnp://nas", "/tv")
    }

    fn show_with_art() -> MediaItem {
        MediaItem::TvShow(TvShow {
            title: "X".to_string(),
            art: ArtMap::from([("fanart".to_string(), "http://nas/f.jpg".to_string())]),
            ..Default::default()
        })
    }

    #[test]
    fn test_load_details_fills_art() {
        let catalog = SqliteMediaCatalog::in_memory().unwrap();
        let id = catalog
            .open()
            .unwrap()
            .set_details(&show_with_art(), &tag())
            .unwrap();

        let mut ctx = ChangesetContext::new(catalog.open().unwrap(), MediaType::TvShow, tag());
        let mut local = ctx
            .session()
            .get_items(MediaType::TvShow, &tag())
            .unwrap()
            .remove(0);
        assert!(local.art().is_empty());

        ctx.load_details(&mut local).unwrap();
        assert_eq!(local.id(), Some(id));
        assert_eq!(local.art().get("fanart").unwrap(), "http://nas/f.jpg");
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let catalog = SqliteMediaCatalog::in_memory().unwrap();
        {
            let tx = SyncTransaction::begin(catalog.open().unwrap(), tag()).unwrap();
            tx.session().set_details(&show_with_art(), tx.tag()).unwrap();
        }

        let session = catalog.open().unwrap();
        assert!(session
            .get_items(MediaType::TvShow, &tag())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_containers_are_read_once_until_forgotten() {
        let catalog = SqliteMediaCatalog::in_memory().unwrap();
        let tx = SyncTransaction::begin(catalog.open().unwrap(), tag()).unwrap();
        tx.session().set_details(&show_with_art(), tx.tag()).unwrap();

        let first = tx.containers(MediaType::TvShow).unwrap();
        assert_eq!(first.len(), 1);

        // A write behind the cache's back is not seen
        tx.session().set_details(&show_with_art(), tx.tag()).unwrap();
        let cached = tx.containers(MediaType::TvShow).unwrap();
        assert!(Rc::ptr_eq(&first, &cached));

        tx.forget_containers(MediaType::TvShow);
        assert_eq!(tx.containers(MediaType::TvShow).unwrap().len(), 2);
        tx.rollback().unwrap();
    }

    #[test]
    fn test_committed_transaction_persists() {
        let catalog = SqliteMediaCatalog::in_memory().unwrap();
        let tx = SyncTransaction::begin(catalog.open().unwrap(), tag()).unwrap();
        tx.session().set_details(&show_with_art(), tx.tag()).unwrap();
        tx.commit().unwrap();

        let session = catalog.open().unwrap();
        assert_eq!(session.get_items(MediaType::TvShow, &tag()).unwrap().len(), 1);
    }
}
