//! Episode and video records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One episode (or chapter) of a media entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEpisode {
    pub title: String,
    pub url: String,
    pub banner: Option<String>,
    pub description: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    /// Ordinal within the media; fractional for specials such as `6.5`.
    pub number: Option<f32>,
}

impl CatalogEpisode {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            banner: None,
            description: None,
            release_date: None,
            number: None,
        }
    }
}

/// A subtitle track attached to a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSubtitle {
    pub title: Option<String>,
    pub url: String,
}

/// A playable stream for an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogVideo {
    pub title: Option<String>,
    pub url: String,
    pub quality: Option<String>,
    /// Never null; empty when the provider lists none.
    #[serde(default)]
    pub subtitles: Vec<CatalogSubtitle>,
}

impl CatalogVideo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            title: None,
            url: url.into(),
            quality: None,
            subtitles: Vec::new(),
        }
    }
}
