//! Media records returned by providers.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Publication status of a media entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    Cancelled,
    ComingSoon,
    Ongoing,
    Paused,
    Completed,
    #[default]
    Unknown,
}

impl MediaStatus {
    /// Case-insensitive lookup; unrecognised names map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "cancelled" | "canceled" => Self::Cancelled,
            "coming_soon" | "not_yet_released" => Self::ComingSoon,
            "ongoing" | "releasing" => Self::Ongoing,
            "paused" | "hiatus" => Self::Paused,
            "completed" | "finished" => Self::Completed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::ComingSoon => "coming_soon",
            Self::Ongoing => "ongoing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for MediaStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a media entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Book,
    Tv,
    Post,
    #[default]
    Unknown,
}

impl MediaType {
    /// Case-insensitive lookup; unrecognised names map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "movie" => Self::Movie,
            "book" => Self::Book,
            "tv" => Self::Tv,
            "post" => Self::Post,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Book => "book",
            Self::Tv => "tv",
            Self::Post => "post",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Poster image in up to three resolutions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageVersions {
    pub extra_large: Option<String>,
    pub large: Option<String>,
    pub medium: Option<String>,
}

impl ImageVersions {
    /// Same image for every resolution.
    pub fn uniform(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            extra_large: Some(url.clone()),
            large: Some(url.clone()),
            medium: Some(url),
        }
    }

    /// Largest available version.
    pub fn best(&self) -> Option<&str> {
        self.extra_large
            .as_deref()
            .or(self.large.as_deref())
            .or(self.medium.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.best().is_none()
    }
}

/// A tag attached to a media entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTag {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_spoiler: bool,
}

impl CatalogTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            is_spoiler: false,
        }
    }
}

/// A media entry (show, movie, book, post).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogMedia {
    /// Extension that produced this record. Stamped by the bridge after
    /// decoding.
    pub source: String,
    /// Identifier of the entry within `source`.
    pub id: Option<String>,
    /// Identifiers on other services, e.g. `anilist`, `mal`.
    pub ids: BTreeMap<String, String>,
    /// Titles, primary first.
    pub titles: Vec<String>,
    pub poster: Option<ImageVersions>,
    pub banner: Option<String>,
    pub description: Option<String>,
    pub country: Option<String>,
    pub age_rating: Option<String>,
    pub extra: Option<String>,
    pub url: Option<String>,
    pub status: MediaStatus,
    pub media_type: MediaType,
    pub tags: Vec<CatalogTag>,
    pub genres: Vec<String>,
    pub average_score: Option<f32>,
    /// Runtime in minutes.
    pub duration: Option<u32>,
    pub episodes_count: Option<u32>,
    pub latest_episode: Option<u32>,
    pub release_date: Option<DateTime<Utc>>,
}

impl CatalogMedia {
    /// Media with a primary id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            titles: vec![title.into()],
            ..Default::default()
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.titles.first().map(String::as_str)
    }

    /// Globally unique key: `source;;;id`.
    pub fn global_id(&self) -> Option<String> {
        self.id.as_ref().map(|id| format!("{};;;{}", self.source, id))
    }

    /// Records must carry at least one identifier or one title.
    pub fn is_identifiable(&self) -> bool {
        self.id.is_some() || !self.ids.is_empty() || !self.titles.is_empty()
    }

    pub(crate) fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lookup_is_case_insensitive() {
        assert_eq!(MediaStatus::from_name("ONGOING"), MediaStatus::Ongoing);
        assert_eq!(MediaStatus::from_name("Coming_Soon"), MediaStatus::ComingSoon);
        assert_eq!(MediaStatus::from_name("airing?"), MediaStatus::Unknown);
        assert_eq!(MediaType::from_name("Movie"), MediaType::Movie);
        assert_eq!(MediaType::from_name("manga"), MediaType::Unknown);
    }

    #[test]
    fn test_poster_best() {
        let poster = ImageVersions {
            extra_large: None,
            large: Some("l.jpg".to_string()),
            medium: Some("m.jpg".to_string()),
        };
        assert_eq!(poster.best(), Some("l.jpg"));
        assert!(ImageVersions::default().is_empty());
        assert_eq!(ImageVersions::uniform("p.jpg").medium.as_deref(), Some("p.jpg"));
    }

    #[test]
    fn test_global_id() {
        let media = CatalogMedia::new("42", "Frieren").with_source("demo");
        assert_eq!(media.global_id().as_deref(), Some("demo;;;42"));
        assert_eq!(media.title(), Some("Frieren"));
        assert!(media.is_identifiable());
        assert!(!CatalogMedia::default().is_identifiable());
    }
}
