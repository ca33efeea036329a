//! Testing utilities and mock implementations.
//!
//! This module provides a mock importer, a registry store that fails on
//! demand and fixtures for items, sources and imports, so passes can be
//! exercised without real sources.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediaimport_core::testing::{fixtures, MockImporter};
//!
//! let importer = MockImporter::new();
//! importer.set_items(MediaType::TvShow, vec![fixtures::tv_show("X", Some(2001))]).await;
//! ```

mod failing_store;
mod mock_importer;

pub use failing_store::FailingRegistryStore;
pub use mock_importer::{MockImporter, RecordedRetrieval, RecordedUpdate};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::handler::{MOVIE_GROUP, MUSIC_GROUP, TV_GROUP};
    use crate::media::{
        Album, Artist, Episode, GroupedMediaTypes, MediaItem, MediaType, Movie, Season, Song,
        TvShow,
    };
    use crate::registry::{Import, Source};

    pub const SOURCE_ID: &str = "upnp://nas";

    /// A source providing every media type.
    pub fn source() -> Source {
        Source::new(SOURCE_ID, "Living room NAS", MediaType::ALL)
    }

    pub fn group(types: &[MediaType]) -> GroupedMediaTypes {
        GroupedMediaTypes::new(types.iter().copied()).expect("fixture groups are unique")
    }

    pub fn movie_import() -> Import {
        Import::new("/movies", group(MOVIE_GROUP), source())
    }

    pub fn tv_import() -> Import {
        Import::new("/tv", group(TV_GROUP), source())
    }

    pub fn music_import() -> Import {
        Import::new("/music", group(MUSIC_GROUP), source())
    }

    pub fn movie(title: &str, file_path: &str) -> MediaItem {
        MediaItem::Movie(Movie {
            title: title.to_string(),
            file_path: file_path.to_string(),
            year: Some(1995),
            ..Default::default()
        })
    }

    pub fn tv_show(title: &str, year: Option<i32>) -> MediaItem {
        MediaItem::TvShow(TvShow {
            title: title.to_string(),
            year,
            ..Default::default()
        })
    }

    pub fn season(show_title: &str, show_year: Option<i32>, season_number: i32) -> MediaItem {
        MediaItem::Season(Season {
            show_title: show_title.to_string(),
            show_year,
            season_number,
            ..Default::default()
        })
    }

    /// An episode stored at `smb://nas/tv/<show>/s<season>e<episode>.mkv`.
    pub fn episode(
        show_title: &str,
        show_year: Option<i32>,
        season_number: i32,
        episode_number: i32,
        title: &str,
    ) -> MediaItem {
        MediaItem::Episode(Episode {
            show_title: show_title.to_string(),
            show_year,
            season_number,
            episode_number,
            title: title.to_string(),
            file_path: format!(
                "smb://nas/tv/{}/s{:02}e{:02}.mkv",
                show_title, season_number, episode_number
            ),
            ..Default::default()
        })
    }

    pub fn artist(name: &str) -> MediaItem {
        MediaItem::Artist(Artist {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn album(title: &str, album_artist: &str) -> MediaItem {
        MediaItem::Album(Album {
            title: title.to_string(),
            album_artist: album_artist.to_string(),
            ..Default::default()
        })
    }

    /// A song by the album artist stored at `smb://nas/music/<album>/<track>.flac`.
    pub fn song(title: &str, album: &str, album_artist: &str, track: u32) -> MediaItem {
        MediaItem::Song(Song {
            title: title.to_string(),
            album: album.to_string(),
            album_artist: album_artist.to_string(),
            artist: album_artist.to_string(),
            track_number: Some(track),
            file_path: format!("smb://nas/music/{}/{:02}.flac", album, track),
            ..Default::default()
        })
    }
}
