use std::sync::Arc;

use super::{
    match_file_based, parents, HandlerError, LocalItems, MediaImportHandler, SyncTransaction,
    MUSIC_GROUP,
};
use crate::catalog::MediaCatalog;
use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

/// Songs. A song needs its album stored by the same import; the artist is
/// linked when known.
pub struct SongHandler {
    catalog: Arc<dyn MediaCatalog>,
}

impl SongHandler {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }
}

impl MediaImportHandler for SongHandler {
    fn media_type(&self) -> MediaType {
        MediaType::Song
    }

    fn grouped_media_types(&self) -> &'static [MediaType] {
        MUSIC_GROUP
    }

    fn required_media_types(&self) -> &'static [MediaType] {
        &[MediaType::Album]
    }

    fn dependencies(&self) -> &'static [MediaType] {
        &[MediaType::Artist]
    }

    fn ignore_differences(&self) -> &'static [&'static str] {
        &["id", "album_id", "artist_id"]
    }

    fn catalog(&self) -> &dyn MediaCatalog {
        self.catalog.as_ref()
    }

    fn has_identity(&self, item: &MediaItem) -> bool {
        matches!(item, MediaItem::Song(song)
            if !song.title.is_empty() && !song.album.is_empty() && !song.file_path.is_empty())
    }

    fn find_matching_local_item<'a>(
        &self,
        _import: &Import,
        item: &MediaItem,
        local_items: &'a LocalItems,
    ) -> Option<&'a MediaItem> {
        match_file_based(item, local_items)
    }

    fn prepare_item(
        &self,
        tx: &SyncTransaction,
        _import: &Import,
        item: &mut MediaItem,
    ) -> Result<(), HandlerError> {
        let label = item.label();
        let MediaItem::Song(song) = item else {
            return Ok(());
        };

        let album_id = parents::find_album(tx, &song.album, &song.album_artist)?
            .and_then(|album| album.id)
            .ok_or_else(|| HandlerError::MissingParent {
                item: label,
                parent: MediaType::Album,
                name: song.album.clone(),
            })?;
        song.album_id = Some(album_id);

        let artist_name = if song.artist.is_empty() {
            song.album_artist.as_str()
        } else {
            song.artist.as_str()
        };
        song.artist_id = if artist_name.is_empty() {
            None
        } else {
            parents::find_artist(tx, artist_name)?.and_then(|artist| artist.id)
        };
        Ok(())
    }
}
