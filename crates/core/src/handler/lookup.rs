use std::collections::HashMap;
use std::sync::Arc;

use super::{
    AlbumHandler, ArtistHandler, EpisodeHandler, MediaImportHandler, MovieHandler,
    MovieSetHandler, MusicVideoHandler, SeasonHandler, SongHandler, TvShowHandler,
};
use crate::catalog::MediaCatalog;
use crate::media::MediaType;

/// Media type to handler lookup table, built once at startup.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<MediaType, Arc<dyn MediaImportHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in handler, all writing to `catalog`.
    pub fn standard(catalog: Arc<dyn MediaCatalog>) -> Self {
        let mut set = Self::new();
        set.register(Arc::new(MovieHandler::new(catalog.clone())));
        set.register(Arc::new(MovieSetHandler::new(catalog.clone())));
        set.register(Arc::new(TvShowHandler::new(catalog.clone())));
        set.register(Arc::new(SeasonHandler::new(catalog.clone())));
        set.register(Arc::new(EpisodeHandler::new(catalog.clone())));
        set.register(Arc::new(MusicVideoHandler::new(catalog.clone())));
        set.register(Arc::new(ArtistHandler::new(catalog.clone())));
        set.register(Arc::new(AlbumHandler::new(catalog.clone())));
        set.register(Arc::new(SongHandler::new(catalog)));
        set
    }

    /// Register a handler, replacing any handler for the same media type.
    pub fn register(
        &mut self,
        handler: Arc<dyn MediaImportHandler>,
    ) -> Option<Arc<dyn MediaImportHandler>> {
        self.handlers.insert(handler.media_type(), handler)
    }

    pub fn get(&self, media_type: MediaType) -> Option<Arc<dyn MediaImportHandler>> {
        self.handlers.get(&media_type).cloned()
    }

    pub fn media_types(&self) -> Vec<MediaType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteMediaCatalog;

    #[test]
    fn test_standard_set_covers_every_media_type() {
        let set = HandlerSet::standard(Arc::new(SqliteMediaCatalog::in_memory().unwrap()));
        assert_eq!(set.media_types(), MediaType::ALL.to_vec());
    }

    #[test]
    fn test_handler_groups_contain_their_own_type() {
        let set = HandlerSet::standard(Arc::new(SqliteMediaCatalog::in_memory().unwrap()));
        for media_type in MediaType::ALL {
            let handler = set.get(media_type).unwrap();
            assert!(handler.grouped_media_types().contains(&media_type));
            for required in handler.required_media_types() {
                assert!(handler.grouped_media_types().contains(required));
            }
        }
    }
}
