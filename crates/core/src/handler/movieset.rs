use std::sync::Arc;

use tracing::debug;

use super::{HandlerError, LocalItems, MediaImportHandler, SyncTransaction, MOVIE_GROUP};
use crate::catalog::MediaCatalog;
use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

/// Movie collections, matched by title.
///
/// A collection only exists through its movies, so it runs after them and is
/// removed once no movie refers to it.
pub struct MovieSetHandler {
    catalog: Arc<dyn MediaCatalog>,
}

impl MovieSetHandler {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }
}

impl MediaImportHandler for MovieSetHandler {
    fn media_type(&self) -> MediaType {
        MediaType::MovieSet
    }

    fn grouped_media_types(&self) -> &'static [MediaType] {
        MOVIE_GROUP
    }

    fn required_media_types(&self) -> &'static [MediaType] {
        &[MediaType::Movie]
    }

    fn child_media_types(&self) -> &'static [MediaType] {
        &[MediaType::Movie]
    }

    /// Removing a collection leaves its movies in place.
    fn removes_children(&self) -> bool {
        false
    }

    fn catalog(&self) -> &dyn MediaCatalog {
        self.catalog.as_ref()
    }

    fn has_identity(&self, item: &MediaItem) -> bool {
        matches!(item, MediaItem::MovieSet(set) if !set.title.is_empty())
    }

    fn find_matching_local_item<'a>(
        &self,
        _import: &Import,
        item: &MediaItem,
        local_items: &'a LocalItems,
    ) -> Option<&'a MediaItem> {
        let MediaItem::MovieSet(remote) = item else {
            return None;
        };
        local_items
            .iter()
            .find(|local| matches!(local, MediaItem::MovieSet(set) if set.title == remote.title))
    }

    /// Link every movie of the import that names this collection.
    fn after_store(
        &self,
        tx: &SyncTransaction,
        _import: &Import,
        item: &MediaItem,
    ) -> Result<(), HandlerError> {
        let MediaItem::MovieSet(set) = item else {
            return Ok(());
        };
        let Some(set_id) = set.id else {
            return Ok(());
        };

        let unlinked: Vec<i64> = tx
            .session()
            .get_items(MediaType::Movie, tx.tag())?
            .into_iter()
            .filter_map(|item| match item {
                MediaItem::Movie(movie)
                    if movie.set_title.as_deref() == Some(set.title.as_str())
                        && movie.set_id != Some(set_id) =>
                {
                    movie.id
                }
                _ => None,
            })
            .collect();

        let mut linked = 0;
        for movie_id in unlinked {
            // get_item brings the art along so set_details keeps it
            if let Some(MediaItem::Movie(mut movie)) =
                tx.session().get_item(MediaType::Movie, movie_id)?
            {
                movie.set_id = Some(set_id);
                tx.session().set_details(&MediaItem::Movie(movie), tx.tag())?;
                linked += 1;
            }
        }

        if linked > 0 {
            debug!(set = %set.title, linked, "Linked movies to collection");
        }
        Ok(())
    }
}
