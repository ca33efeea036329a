//! Lookups of container records used to resolve linkage ids.
//!
//! Parents are resolved among the items the same import already stored,
//! inside the transaction that is about to store the child. The container
//! list of each type is read once per transaction.

use crate::catalog::CatalogError;
use crate::media::{Album, Artist, MediaItem, MediaType, MovieSet, Season, TvShow};

use super::SyncTransaction;

fn items_of<T>(
    tx: &SyncTransaction,
    media_type: MediaType,
    extract: impl Fn(&MediaItem) -> Option<&T>,
) -> Result<Vec<T>, CatalogError>
where
    T: Clone,
{
    Ok(tx
        .containers(media_type)?
        .iter()
        .filter_map(|item| extract(item).cloned())
        .collect())
}

/// Show by title, preferring an exact year match. A show or a lookup
/// without a year matches any year.
pub(crate) fn find_show(
    tx: &SyncTransaction,
    title: &str,
    year: Option<i32>,
) -> Result<Option<TvShow>, CatalogError> {
    let candidates = items_of(tx, MediaType::TvShow, |item| match item {
        MediaItem::TvShow(show) if show.title == title => Some(show),
        _ => None,
    })?;

    let exact = candidates.iter().position(|show| show.year == year);
    let loose = || {
        candidates
            .iter()
            .position(|show| year.is_none() || show.year.is_none())
    };
    Ok(exact.or_else(loose).map(|idx| candidates[idx].clone()))
}

pub(crate) fn find_season(
    tx: &SyncTransaction,
    show_id: i64,
    season_number: i32,
) -> Result<Option<Season>, CatalogError> {
    Ok(items_of(tx, MediaType::Season, |item| match item {
        MediaItem::Season(season)
            if season.show_id == Some(show_id) && season.season_number == season_number =>
        {
            Some(season)
        }
        _ => None,
    })?
    .into_iter()
    .next())
}

pub(crate) fn find_set(tx: &SyncTransaction, title: &str) -> Result<Option<MovieSet>, CatalogError> {
    Ok(items_of(tx, MediaType::MovieSet, |item| match item {
        MediaItem::MovieSet(set) if set.title == title => Some(set),
        _ => None,
    })?
    .into_iter()
    .next())
}

pub(crate) fn find_artist(tx: &SyncTransaction, name: &str) -> Result<Option<Artist>, CatalogError> {
    Ok(items_of(tx, MediaType::Artist, |item| match item {
        MediaItem::Artist(artist) if artist.name == name => Some(artist),
        _ => None,
    })?
    .into_iter()
    .next())
}

/// Album by title and album artist. An empty album artist matches on the
/// title alone.
pub(crate) fn find_album(
    tx: &SyncTransaction,
    title: &str,
    album_artist: &str,
) -> Result<Option<Album>, CatalogError> {
    Ok(items_of(tx, MediaType::Album, |item| match item {
        MediaItem::Album(album)
            if album.title == title
                && (album_artist.is_empty() || album.album_artist == album_artist) =>
        {
            Some(album)
        }
        _ => None,
    })?
    .into_iter()
    .next())
}
