use std::sync::Arc;

use super::{parents, HandlerError, LocalItems, MediaImportHandler, SyncTransaction, MUSIC_GROUP};
use crate::catalog::MediaCatalog;
use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

/// Albums, matched by title and album artist.
pub struct AlbumHandler {
    catalog: Arc<dyn MediaCatalog>,
}

impl AlbumHandler {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }
}

impl MediaImportHandler for AlbumHandler {
    fn media_type(&self) -> MediaType {
        MediaType::Album
    }

    fn grouped_media_types(&self) -> &'static [MediaType] {
        MUSIC_GROUP
    }

    fn dependencies(&self) -> &'static [MediaType] {
        &[MediaType::Artist]
    }

    fn child_media_types(&self) -> &'static [MediaType] {
        &[MediaType::Song]
    }

    fn ignore_differences(&self) -> &'static [&'static str] {
        &["id", "artist_id"]
    }

    fn catalog(&self) -> &dyn MediaCatalog {
        self.catalog.as_ref()
    }

    fn has_identity(&self, item: &MediaItem) -> bool {
        matches!(item, MediaItem::Album(album) if !album.title.is_empty())
    }

    fn find_matching_local_item<'a>(
        &self,
        _import: &Import,
        item: &MediaItem,
        local_items: &'a LocalItems,
    ) -> Option<&'a MediaItem> {
        let MediaItem::Album(remote) = item else {
            return None;
        };
        local_items.iter().find(|local| {
            matches!(local, MediaItem::Album(album)
                if album.title == remote.title && album.album_artist == remote.album_artist)
        })
    }

    /// Link the album artist when the import stored one.
    fn prepare_item(
        &self,
        tx: &SyncTransaction,
        _import: &Import,
        item: &mut MediaItem,
    ) -> Result<(), HandlerError> {
        let MediaItem::Album(album) = item else {
            return Ok(());
        };

        album.artist_id = if album.album_artist.is_empty() {
            None
        } else {
            parents::find_artist(tx, &album.album_artist)?.and_then(|artist| artist.id)
        };
        Ok(())
    }
}
