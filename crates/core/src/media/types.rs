//! Media type tags and grouped media type lists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A media type tag.
///
/// The serialized form is the stable lowercase tag used in the registry,
/// in batch files and in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    /// Movie collection.
    #[serde(rename = "set")]
    MovieSet,
    TvShow,
    Season,
    Episode,
    MusicVideo,
    Artist,
    Album,
    Song,
}

impl MediaType {
    /// Every known media type, in declaration order.
    pub const ALL: [MediaType; 9] = [
        MediaType::Movie,
        MediaType::MovieSet,
        MediaType::TvShow,
        MediaType::Season,
        MediaType::Episode,
        MediaType::MusicVideo,
        MediaType::Artist,
        MediaType::Album,
        MediaType::Song,
    ];

    /// Stable tag for this media type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::MovieSet => "set",
            MediaType::TvShow => "tvshow",
            MediaType::Season => "season",
            MediaType::Episode => "episode",
            MediaType::MusicVideo => "musicvideo",
            MediaType::Artist => "artist",
            MediaType::Album => "album",
            MediaType::Song => "song",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| MediaTypeError::Unknown(s.to_string()))
    }
}

/// Errors for media type parsing and grouping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaTypeError {
    #[error("unknown media type: {0}")]
    Unknown(String),

    #[error("media type {0} listed more than once")]
    Duplicate(MediaType),

    #[error("no media types given")]
    Empty,
}

/// Catalog domain a registry is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaDomain {
    Video,
    Music,
}

impl MediaDomain {
    /// Media types a registry of this domain can hold imports for.
    pub fn supported_media_types(&self) -> &'static [MediaType] {
        match self {
            MediaDomain::Video => &[
                MediaType::Movie,
                MediaType::MovieSet,
                MediaType::TvShow,
                MediaType::Season,
                MediaType::Episode,
                MediaType::MusicVideo,
            ],
            MediaDomain::Music => &[MediaType::Artist, MediaType::Album, MediaType::Song],
        }
    }

    /// Whether every given media type belongs to this domain.
    pub fn supports_all(&self, media_types: &GroupedMediaTypes) -> bool {
        let supported = self.supported_media_types();
        media_types.iter().all(|t| supported.contains(&t))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaDomain::Video => "video",
            MediaDomain::Music => "music",
        }
    }
}

/// Ordered, duplicate-free list of media types synchronized as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<MediaType>", into = "Vec<MediaType>")]
pub struct GroupedMediaTypes(Vec<MediaType>);

impl GroupedMediaTypes {
    /// Build a group, rejecting duplicates. An empty group is allowed here;
    /// callers that need a non-empty group check `is_empty`.
    pub fn new(types: impl IntoIterator<Item = MediaType>) -> Result<Self, MediaTypeError> {
        let mut grouped = Vec::new();
        for media_type in types {
            if grouped.contains(&media_type) {
                return Err(MediaTypeError::Duplicate(media_type));
            }
            grouped.push(media_type);
        }
        Ok(Self(grouped))
    }

    /// Group holding a single media type.
    pub fn single(media_type: MediaType) -> Self {
        Self(vec![media_type])
    }

    /// Parse a `;`-joined tag list as stored in the registry.
    pub fn parse(joined: &str) -> Result<Self, MediaTypeError> {
        let types = joined
            .split(';')
            .filter(|s| !s.trim().is_empty())
            .map(MediaType::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(types)
    }

    /// `;`-joined tag list.
    pub fn to_tag_string(&self) -> String {
        self.0
            .iter()
            .map(MediaType::as_str)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn contains(&self, media_type: MediaType) -> bool {
        self.0.contains(&media_type)
    }

    /// Position of a media type within the group.
    pub fn position(&self, media_type: MediaType) -> Option<usize> {
        self.0.iter().position(|t| *t == media_type)
    }

    /// Whether every type in `other` is part of this group.
    pub fn contains_all(&self, other: &GroupedMediaTypes) -> bool {
        other.iter().all(|t| self.contains(t))
    }

    pub fn iter(&self) -> impl Iterator<Item = MediaType> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[MediaType] {
        &self.0
    }
}

impl TryFrom<Vec<MediaType>> for GroupedMediaTypes {
    type Error = MediaTypeError;

    fn try_from(types: Vec<MediaType>) -> Result<Self, Self::Error> {
        Self::new(types)
    }
}

impl From<GroupedMediaTypes> for Vec<MediaType> {
    fn from(grouped: GroupedMediaTypes) -> Self {
        grouped.0
    }
}

impl fmt::Display for GroupedMediaTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_tag_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_tags_round_trip_through_from_str() {
        for media_type in MediaType::ALL {
            assert_eq!(media_type.as_str().parse::<MediaType>().unwrap(), media_type);
        }
    }

    #[test]
    fn test_media_type_serde_matches_tag() {
        assert_eq!(
            serde_json::to_string(&MediaType::MovieSet).unwrap(),
            "\"set\""
        );
        assert_eq!(
            serde_json::to_string(&MediaType::TvShow).unwrap(),
            "\"tvshow\""
        );
        assert_eq!(
            serde_json::to_string(&MediaType::MusicVideo).unwrap(),
            "\"musicvideo\""
        );
    }

    #[test]
    fn test_unknown_media_type() {
        let err = "podcast".parse::<MediaType>().unwrap_err();
        assert_eq!(err, MediaTypeError::Unknown("podcast".to_string()));
    }

    #[test]
    fn test_grouped_rejects_duplicates() {
        let result = GroupedMediaTypes::new([MediaType::TvShow, MediaType::TvShow]);
        assert_eq!(result, Err(MediaTypeError::Duplicate(MediaType::TvShow)));
    }

    #[test]
    fn test_grouped_parse_keeps_order() {
        let grouped = GroupedMediaTypes::parse("tvshow;season;episode").unwrap();
        assert_eq!(
            grouped.as_slice(),
            &[MediaType::TvShow, MediaType::Season, MediaType::Episode]
        );
        assert_eq!(grouped.to_tag_string(), "tvshow;season;episode");
        assert_eq!(grouped.position(MediaType::Episode), Some(2));
    }

    #[test]
    fn test_grouped_deserialize_rejects_duplicates() {
        let result: Result<GroupedMediaTypes, _> = serde_json::from_str(r#"["movie","movie"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_domain_support() {
        let tv = GroupedMediaTypes::new([MediaType::TvShow, MediaType::Episode]).unwrap();
        let music = GroupedMediaTypes::new([MediaType::Artist, MediaType::Album]).unwrap();

        assert!(MediaDomain::Video.supports_all(&tv));
        assert!(!MediaDomain::Video.supports_all(&music));
        assert!(MediaDomain::Music.supports_all(&music));
    }
}
