//! Catalog records, one shape per media type.
//!
//! Remote items arrive from an importer with `id: None`; items read back from
//! the catalog always carry their database identifier. Linkage ids
//! (`show_id`, `season_id`, `set_id`, `album_id`, `artist_id`) are owned by
//! the catalog and are never supplied by a remote batch.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::MediaType;

/// External identifiers keyed by provider (e.g. "tmdb", "imdb", "musicbrainz").
pub type UniqueIds = BTreeMap<String, String>;

/// Artwork URLs keyed by art type (e.g. "poster", "fanart", "thumb").
pub type ArtMap = BTreeMap<String, String>;

/// Playback state carried by playable items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackState {
    pub play_count: u32,
    pub last_played: Option<DateTime<Utc>>,
    pub resume_position_secs: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Movie {
    pub id: Option<i64>,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<i32>,
    pub file_path: String,
    pub unique_ids: UniqueIds,
    pub plot: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub genres: Vec<String>,
    /// Title of the collection this movie belongs to, as reported by the source.
    pub set_title: Option<String>,
    pub set_id: Option<i64>,
    pub art: ArtMap,
    pub playback: PlaybackState,
}

/// A movie collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovieSet {
    pub id: Option<i64>,
    pub title: String,
    pub overview: Option<String>,
    pub art: ArtMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TvShow {
    pub id: Option<i64>,
    pub title: String,
    pub year: Option<i32>,
    pub unique_ids: UniqueIds,
    pub plot: Option<String>,
    pub genres: Vec<String>,
    pub studio: Option<String>,
    /// Directory holding the show on the source, if any.
    pub path: Option<String>,
    pub art: ArtMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Season {
    pub id: Option<i64>,
    pub show_title: String,
    pub show_year: Option<i32>,
    pub season_number: i32,
    pub name: Option<String>,
    pub show_id: Option<i64>,
    pub art: ArtMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Episode {
    pub id: Option<i64>,
    pub show_title: String,
    pub show_year: Option<i32>,
    pub season_number: i32,
    pub episode_number: i32,
    pub title: String,
    pub file_path: String,
    pub unique_ids: UniqueIds,
    pub plot: Option<String>,
    pub first_aired: Option<NaiveDate>,
    pub runtime_minutes: Option<u32>,
    pub show_id: Option<i64>,
    pub season_id: Option<i64>,
    pub art: ArtMap,
    pub playback: PlaybackState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicVideo {
    pub id: Option<i64>,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub file_path: String,
    pub genres: Vec<String>,
    pub art: ArtMap,
    pub playback: PlaybackState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Artist {
    pub id: Option<i64>,
    pub name: String,
    pub sort_name: Option<String>,
    pub unique_ids: UniqueIds,
    pub biography: Option<String>,
    pub genres: Vec<String>,
    pub art: ArtMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Album {
    pub id: Option<i64>,
    pub title: String,
    pub album_artist: String,
    pub year: Option<i32>,
    pub unique_ids: UniqueIds,
    pub genres: Vec<String>,
    pub label: Option<String>,
    pub artist_id: Option<i64>,
    pub art: ArtMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Song {
    pub id: Option<i64>,
    pub title: String,
    pub album: String,
    pub album_artist: String,
    pub artist: String,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub duration_secs: Option<u32>,
    pub year: Option<i32>,
    pub file_path: String,
    pub genres: Vec<String>,
    pub album_id: Option<i64>,
    pub artist_id: Option<i64>,
    pub art: ArtMap,
    pub playback: PlaybackState,
}

/// A catalog record of any media type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "media_type", rename_all = "lowercase")]
pub enum MediaItem {
    Movie(Movie),
    #[serde(rename = "set")]
    MovieSet(MovieSet),
    TvShow(TvShow),
    Season(Season),
    Episode(Episode),
    MusicVideo(MusicVideo),
    Artist(Artist),
    Album(Album),
    Song(Song),
}

impl MediaItem {
    pub fn media_type(&self) -> MediaType {
        match self {
            MediaItem::Movie(_) => MediaType::Movie,
            MediaItem::MovieSet(_) => MediaType::MovieSet,
            MediaItem::TvShow(_) => MediaType::TvShow,
            MediaItem::Season(_) => MediaType::Season,
            MediaItem::Episode(_) => MediaType::Episode,
            MediaItem::MusicVideo(_) => MediaType::MusicVideo,
            MediaItem::Artist(_) => MediaType::Artist,
            MediaItem::Album(_) => MediaType::Album,
            MediaItem::Song(_) => MediaType::Song,
        }
    }

    /// Database identifier, `None` for items not yet persisted.
    pub fn id(&self) -> Option<i64> {
        match self {
            MediaItem::Movie(i) => i.id,
            MediaItem::MovieSet(i) => i.id,
            MediaItem::TvShow(i) => i.id,
            MediaItem::Season(i) => i.id,
            MediaItem::Episode(i) => i.id,
            MediaItem::MusicVideo(i) => i.id,
            MediaItem::Artist(i) => i.id,
            MediaItem::Album(i) => i.id,
            MediaItem::Song(i) => i.id,
        }
    }

    pub fn set_id(&mut self, id: Option<i64>) {
        match self {
            MediaItem::Movie(i) => i.id = id,
            MediaItem::MovieSet(i) => i.id = id,
            MediaItem::TvShow(i) => i.id = id,
            MediaItem::Season(i) => i.id = id,
            MediaItem::Episode(i) => i.id = id,
            MediaItem::MusicVideo(i) => i.id = id,
            MediaItem::Artist(i) => i.id = id,
            MediaItem::Album(i) => i.id = id,
            MediaItem::Song(i) => i.id = id,
        }
    }

    /// Human readable label used in logs and as the catalog's display column.
    pub fn label(&self) -> String {
        match self {
            MediaItem::Movie(i) => i.title.clone(),
            MediaItem::MovieSet(i) => i.title.clone(),
            MediaItem::TvShow(i) => i.title.clone(),
            MediaItem::Season(i) => format!("{} S{:02}", i.show_title, i.season_number),
            MediaItem::Episode(i) => format!(
                "{} S{:02}E{:02}",
                i.show_title, i.season_number, i.episode_number
            ),
            MediaItem::MusicVideo(i) => format!("{} - {}", i.artist, i.title),
            MediaItem::Artist(i) => i.name.clone(),
            MediaItem::Album(i) => format!("{} - {}", i.album_artist, i.title),
            MediaItem::Song(i) => format!("{} - {}", i.artist, i.title),
        }
    }

    /// Playable file on the source, for file-based media types.
    pub fn file_path(&self) -> Option<&str> {
        let path = match self {
            MediaItem::Movie(i) => &i.file_path,
            MediaItem::Episode(i) => &i.file_path,
            MediaItem::MusicVideo(i) => &i.file_path,
            MediaItem::Song(i) => &i.file_path,
            MediaItem::TvShow(i) => return i.path.as_deref().filter(|p| !p.is_empty()),
            _ => return None,
        };
        if path.is_empty() {
            None
        } else {
            Some(path)
        }
    }

    /// Directory registered in the catalog's path bookkeeping for this item.
    ///
    /// File-based items register the directory holding their file; a TV
    /// show registers its own directory.
    pub fn bookkeeping_path(&self) -> Option<String> {
        match self {
            MediaItem::TvShow(show) => show.path.clone().filter(|p| !p.is_empty()),
            other => other.file_path().map(parent_directory),
        }
    }

    pub fn art(&self) -> &ArtMap {
        match self {
            MediaItem::Movie(i) => &i.art,
            MediaItem::MovieSet(i) => &i.art,
            MediaItem::TvShow(i) => &i.art,
            MediaItem::Season(i) => &i.art,
            MediaItem::Episode(i) => &i.art,
            MediaItem::MusicVideo(i) => &i.art,
            MediaItem::Artist(i) => &i.art,
            MediaItem::Album(i) => &i.art,
            MediaItem::Song(i) => &i.art,
        }
    }

    pub fn art_mut(&mut self) -> &mut ArtMap {
        match self {
            MediaItem::Movie(i) => &mut i.art,
            MediaItem::MovieSet(i) => &mut i.art,
            MediaItem::TvShow(i) => &mut i.art,
            MediaItem::Season(i) => &mut i.art,
            MediaItem::Episode(i) => &mut i.art,
            MediaItem::MusicVideo(i) => &mut i.art,
            MediaItem::Artist(i) => &mut i.art,
            MediaItem::Album(i) => &mut i.art,
            MediaItem::Song(i) => &mut i.art,
        }
    }

    pub fn playback(&self) -> Option<&PlaybackState> {
        match self {
            MediaItem::Movie(i) => Some(&i.playback),
            MediaItem::Episode(i) => Some(&i.playback),
            MediaItem::MusicVideo(i) => Some(&i.playback),
            MediaItem::Song(i) => Some(&i.playback),
            _ => None,
        }
    }

    pub fn playback_mut(&mut self) -> Option<&mut PlaybackState> {
        match self {
            MediaItem::Movie(i) => Some(&mut i.playback),
            MediaItem::Episode(i) => Some(&mut i.playback),
            MediaItem::MusicVideo(i) => Some(&mut i.playback),
            MediaItem::Song(i) => Some(&mut i.playback),
            _ => None,
        }
    }

    /// Database ids of the containers this item is linked to.
    pub fn parent_ids(&self) -> Vec<i64> {
        let parents = match self {
            MediaItem::Movie(i) => vec![i.set_id],
            MediaItem::Season(i) => vec![i.show_id],
            MediaItem::Episode(i) => vec![i.show_id, i.season_id],
            MediaItem::Album(i) => vec![i.artist_id],
            MediaItem::Song(i) => vec![i.album_id, i.artist_id],
            _ => vec![],
        };
        parents.into_iter().flatten().collect()
    }
}

fn parent_directory(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => trimmed[..=idx].to_string(),
        None => String::new(),
    }
}
