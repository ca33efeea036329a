use std::sync::Arc;

use super::{LocalItems, MediaImportHandler, MUSIC_GROUP};
use crate::catalog::MediaCatalog;
use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

/// Artists, matched by display name. Kept while an album or song refers to them.
pub struct ArtistHandler {
    catalog: Arc<dyn MediaCatalog>,
}

impl ArtistHandler {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }
}

impl MediaImportHandler for ArtistHandler {
    fn media_type(&self) -> MediaType {
        MediaType::Artist
    }

    fn grouped_media_types(&self) -> &'static [MediaType] {
        MUSIC_GROUP
    }

    fn child_media_types(&self) -> &'static [MediaType] {
        &[MediaType::Album, MediaType::Song]
    }

    /// Albums and songs survive their artist; only the link goes.
    fn removes_children(&self) -> bool {
        false
    }

    fn catalog(&self) -> &dyn MediaCatalog {
        self.catalog.as_ref()
    }

    fn has_identity(&self, item: &MediaItem) -> bool {
        matches!(item, MediaItem::Artist(artist) if !artist.name.is_empty())
    }

    fn find_matching_local_item<'a>(
        &self,
        _import: &Import,
        item: &MediaItem,
        local_items: &'a LocalItems,
    ) -> Option<&'a MediaItem> {
        let MediaItem::Artist(remote) = item else {
            return None;
        };
        local_items
            .iter()
            .find(|local| matches!(local, MediaItem::Artist(artist) if artist.name == remote.name))
    }
}
