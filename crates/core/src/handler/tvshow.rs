use std::sync::Arc;

use super::{LocalItems, MediaImportHandler, TV_GROUP};
use crate::catalog::MediaCatalog;
use crate::media::{MediaItem, MediaType, TvShow};
use crate::registry::Import;

/// TV shows, the container for seasons and episodes.
pub struct TvShowHandler {
    catalog: Arc<dyn MediaCatalog>,
}

impl TvShowHandler {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }
}

/// `Some(same)` when both shows carry an id from a common provider, where
/// `same` tells whether any of those ids agree; `None` when the ids say
/// nothing about the pair.
fn compare_unique_ids(a: &TvShow, b: &TvShow) -> Option<bool> {
    let mut comparable = false;
    for (provider, id) in &a.unique_ids {
        if let Some(other) = b.unique_ids.get(provider) {
            if other == id {
                return Some(true);
            }
            comparable = true;
        }
    }
    comparable.then_some(false)
}

impl MediaImportHandler for TvShowHandler {
    fn media_type(&self) -> MediaType {
        MediaType::TvShow
    }

    fn grouped_media_types(&self) -> &'static [MediaType] {
        TV_GROUP
    }

    fn child_media_types(&self) -> &'static [MediaType] {
        &[MediaType::Episode]
    }

    fn catalog(&self) -> &dyn MediaCatalog {
        self.catalog.as_ref()
    }

    fn has_identity(&self, item: &MediaItem) -> bool {
        matches!(item, MediaItem::TvShow(show) if !show.title.is_empty())
    }

    /// When both shows carry ids from a common provider only the ids decide.
    /// Otherwise title and year must agree, and a remote show with neither
    /// ids nor a year takes the first show with the same title.
    fn find_matching_local_item<'a>(
        &self,
        _import: &Import,
        item: &MediaItem,
        local_items: &'a LocalItems,
    ) -> Option<&'a MediaItem> {
        let MediaItem::TvShow(remote) = item else {
            return None;
        };

        let shows = || {
            local_items.iter().filter_map(|local| match local {
                MediaItem::TvShow(show) => Some((local, show)),
                _ => None,
            })
        };

        if let Some((local, _)) =
            shows().find(|(_, show)| compare_unique_ids(remote, show) == Some(true))
        {
            return Some(local);
        }

        let mut same_title = shows().filter(|(_, show)| {
            show.title == remote.title && compare_unique_ids(remote, show).is_none()
        });
        if remote.unique_ids.is_empty() && remote.year.is_none() {
            return same_title.next().map(|(local, _)| local);
        }
        same_title
            .find(|(_, show)| show.year == remote.year)
            .map(|(local, _)| local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteMediaCatalog;
    use crate::media::{GroupedMediaTypes, UniqueIds};
    use crate::registry::Source;

    fn handler() -> TvShowHandler {
        TvShowHandler::new(Arc::new(SqliteMediaCatalog::in_memory().unwrap()))
    }

    fn import() -> Import {
        Import::new(
            "/tv",
            GroupedMediaTypes::single(MediaType::TvShow),
            Source::new("upnp://nas", "NAS", [MediaType::TvShow]),
        )
    }

    fn show(id: Option<i64>, title: &str, year: Option<i32>, tvdb: Option<&str>) -> MediaItem {
        let mut unique_ids = UniqueIds::new();
        if let Some(tvdb) = tvdb {
            unique_ids.insert("tvdb".to_string(), tvdb.to_string());
        }
        MediaItem::TvShow(TvShow {
            id,
            title: title.to_string(),
            year,
            unique_ids,
            ..Default::default()
        })
    }

    fn local() -> LocalItems {
        LocalItems::new([
            show(Some(1), "X", Some(2001), Some("100")),
            show(Some(2), "X", Some(2019), Some("200")),
            show(Some(3), "Y", None, None),
        ])
    }

    fn matched(item: &MediaItem) -> Option<i64> {
        let local = local();
        handler()
            .find_matching_local_item(&import(), item, &local)
            .and_then(MediaItem::id)
    }

    #[test]
    fn test_unique_id_wins_over_title_and_year() {
        assert_eq!(matched(&show(None, "X (US)", Some(2001), Some("200"))), Some(2));
    }

    #[test]
    fn test_title_and_year() {
        assert_eq!(matched(&show(None, "X", Some(2019), None)), Some(2));
        assert_eq!(matched(&show(None, "X", Some(1999), None)), None);
    }

    #[test]
    fn test_bare_title_takes_first_candidate() {
        assert_eq!(matched(&show(None, "X", None, None)), Some(1));
        assert_eq!(matched(&show(None, "Z", None, None)), None);
    }

    #[test]
    fn test_conflicting_unique_ids_never_match() {
        // Same title and year, but the provider says these are different shows
        assert_eq!(matched(&show(None, "X", Some(2001), Some("999"))), None);
    }

    #[test]
    fn test_ids_on_one_side_fall_back_to_title_and_year() {
        // Local show 3 carries no ids
        assert_eq!(matched(&show(None, "Y", None, Some("300"))), Some(3));
        // Remote without ids against a local show with ids
        assert_eq!(matched(&show(None, "X", Some(2019), None)), Some(2));
    }

    #[test]
    fn test_ids_from_other_providers_fall_back_to_title_and_year() {
        let mut unique_ids = UniqueIds::new();
        unique_ids.insert("tmdb".to_string(), "42".to_string());
        let remote = MediaItem::TvShow(TvShow {
            title: "X".to_string(),
            year: Some(2001),
            unique_ids,
            ..Default::default()
        });
        assert_eq!(matched(&remote), Some(1));
    }
}
