use std::sync::Arc;

use super::{parents, HandlerError, LocalItems, MediaImportHandler, SyncTransaction, TV_GROUP};
use crate::catalog::MediaCatalog;
use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

/// Seasons, matched by show and season number.
pub struct SeasonHandler {
    catalog: Arc<dyn MediaCatalog>,
}

impl SeasonHandler {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }
}

impl MediaImportHandler for SeasonHandler {
    fn media_type(&self) -> MediaType {
        MediaType::Season
    }

    fn grouped_media_types(&self) -> &'static [MediaType] {
        TV_GROUP
    }

    fn required_media_types(&self) -> &'static [MediaType] {
        &[MediaType::TvShow]
    }

    fn child_media_types(&self) -> &'static [MediaType] {
        &[MediaType::Episode]
    }

    fn ignore_differences(&self) -> &'static [&'static str] {
        &["id", "show_id"]
    }

    fn catalog(&self) -> &dyn MediaCatalog {
        self.catalog.as_ref()
    }

    fn has_identity(&self, item: &MediaItem) -> bool {
        matches!(item, MediaItem::Season(season) if !season.show_title.is_empty())
    }

    fn find_matching_local_item<'a>(
        &self,
        _import: &Import,
        item: &MediaItem,
        local_items: &'a LocalItems,
    ) -> Option<&'a MediaItem> {
        let MediaItem::Season(remote) = item else {
            return None;
        };
        local_items.iter().find(|local| {
            matches!(local, MediaItem::Season(season)
                if season.show_title == remote.show_title
                    && season.show_year == remote.show_year
                    && season.season_number == remote.season_number)
        })
    }

    fn prepare_item(
        &self,
        tx: &SyncTransaction,
        _import: &Import,
        item: &mut MediaItem,
    ) -> Result<(), HandlerError> {
        let label = item.label();
        let MediaItem::Season(season) = item else {
            return Ok(());
        };

        let show = parents::find_show(tx, &season.show_title, season.show_year)?;
        season.show_id = show.and_then(|show| show.id);
        if season.show_id.is_none() {
            return Err(HandlerError::MissingParent {
                item: label,
                parent: MediaType::TvShow,
                name: season.show_title.clone(),
            });
        }
        Ok(())
    }
}
