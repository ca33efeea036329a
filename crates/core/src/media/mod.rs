//! Media vocabulary shared by the registry, the catalog and the handlers.

mod items;
mod types;

pub use items::{
    Album, ArtMap, Artist, Episode, MediaItem, Movie, MovieSet, MusicVideo, PlaybackState, Season,
    Song, TvShow, UniqueIds,
};
pub use types::{GroupedMediaTypes, MediaDomain, MediaType, MediaTypeError};
