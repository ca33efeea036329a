use std::sync::Arc;

use super::{match_file_based, LocalItems, MediaImportHandler, MUSIC_VIDEO_GROUP};
use crate::catalog::MediaCatalog;
use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

pub struct MusicVideoHandler {
    catalog: Arc<dyn MediaCatalog>,
}

impl MusicVideoHandler {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }
}

impl MediaImportHandler for MusicVideoHandler {
    fn media_type(&self) -> MediaType {
        MediaType::MusicVideo
    }

    fn grouped_media_types(&self) -> &'static [MediaType] {
        MUSIC_VIDEO_GROUP
    }

    fn catalog(&self) -> &dyn MediaCatalog {
        self.catalog.as_ref()
    }

    fn has_identity(&self, item: &MediaItem) -> bool {
        matches!(item, MediaItem::MusicVideo(video)
            if !video.title.is_empty() && !video.file_path.is_empty())
    }

    fn find_matching_local_item<'a>(
        &self,
        _import: &Import,
        item: &MediaItem,
        local_items: &'a LocalItems,
    ) -> Option<&'a MediaItem> {
        match_file_based(item, local_items)
    }
}
