use std::sync::Arc;

use super::{
    match_file_based, parents, HandlerError, LocalItems, MediaImportHandler, SyncTransaction,
    MOVIE_GROUP,
};
use crate::catalog::MediaCatalog;
use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

/// Movies, matched by database id and then by file path.
pub struct MovieHandler {
    catalog: Arc<dyn MediaCatalog>,
}

impl MovieHandler {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }
}

impl MediaImportHandler for MovieHandler {
    fn media_type(&self) -> MediaType {
        MediaType::Movie
    }

    fn grouped_media_types(&self) -> &'static [MediaType] {
        MOVIE_GROUP
    }

    fn ignore_differences(&self) -> &'static [&'static str] {
        &["id", "set_id"]
    }

    fn catalog(&self) -> &dyn MediaCatalog {
        self.catalog.as_ref()
    }

    fn has_identity(&self, item: &MediaItem) -> bool {
        matches!(item, MediaItem::Movie(movie) if !movie.title.is_empty() && !movie.file_path.is_empty())
    }

    fn find_matching_local_item<'a>(
        &self,
        _import: &Import,
        item: &MediaItem,
        local_items: &'a LocalItems,
    ) -> Option<&'a MediaItem> {
        match_file_based(item, local_items)
    }

    /// Link the movie to the collection it names, when that collection is
    /// already stored. Collections stored later link their movies themselves.
    fn prepare_item(
        &self,
        tx: &SyncTransaction,
        _import: &Import,
        item: &mut MediaItem,
    ) -> Result<(), HandlerError> {
        let MediaItem::Movie(movie) = item else {
            return Ok(());
        };

        movie.set_id = match movie.set_title.as_deref().filter(|t| !t.is_empty()) {
            Some(title) => parents::find_set(tx, title)?.and_then(|set| set.id),
            None => None,
        };
        Ok(())
    }
}
