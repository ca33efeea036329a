use std::sync::Arc;

use super::{
    match_file_based, parents, HandlerError, LocalItems, MediaImportHandler, SyncTransaction,
    TV_GROUP,
};
use crate::catalog::MediaCatalog;
use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

/// Episodes. Every episode belongs to a show stored by the same import; the
/// season is linked when one exists.
pub struct EpisodeHandler {
    catalog: Arc<dyn MediaCatalog>,
}

impl EpisodeHandler {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }
}

impl MediaImportHandler for EpisodeHandler {
    fn media_type(&self) -> MediaType {
        MediaType::Episode
    }

    fn grouped_media_types(&self) -> &'static [MediaType] {
        TV_GROUP
    }

    fn required_media_types(&self) -> &'static [MediaType] {
        &[MediaType::TvShow]
    }

    fn dependencies(&self) -> &'static [MediaType] {
        &[MediaType::Season]
    }

    fn ignore_differences(&self) -> &'static [&'static str] {
        &["id", "show_id", "season_id"]
    }

    fn catalog(&self) -> &dyn MediaCatalog {
        self.catalog.as_ref()
    }

    fn has_identity(&self, item: &MediaItem) -> bool {
        matches!(item, MediaItem::Episode(episode)
            if !episode.show_title.is_empty() && !episode.file_path.is_empty())
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
        let MediaItem::Episode(episode) = item else {
            return Ok(());
        };

        let show_id = parents::find_show(tx, &episode.show_title, episode.show_year)?
            .and_then(|show| show.id)
            .ok_or_else(|| HandlerError::MissingParent {
                item: label,
                parent: MediaType::TvShow,
                name: episode.show_title.clone(),
            })?;

        episode.show_id = Some(show_id);
        episode.season_id = parents::find_season(tx, show_id, episode.season_number)?
            .and_then(|season| season.id);
        Ok(())
    }
}
