//! Comment threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CatalogEpisode, CatalogMedia};

/// A comment, or the container of a comment page when used as a thread root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogComment {
    pub id: Option<String>,
    pub author_name: Option<String>,
    pub author_avatar: Option<String>,
    pub text: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub likes: Option<i64>,
    pub dislikes: Option<i64>,
    pub votes: Option<i64>,
    /// Vote cast by the signed-in user: `1`, `-1` or `0`.
    pub voted: Option<i64>,
    /// Total replies, which may exceed `items.len()` when paged.
    pub comments_count: Option<u32>,
    pub items: Vec<CatalogComment>,
    pub has_next_page: bool,
    pub can_comment: bool,
    pub is_editable: bool,
    pub is_deletable: bool,
}

impl CatalogComment {
    /// A new comment authored by the user.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Arguments of a comment-page read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadCommentsRequest {
    pub page: u32,
    pub sort_mode: Option<String>,
    pub episode: Option<CatalogEpisode>,
    pub media: CatalogMedia,
    pub parent_comment: Option<CatalogComment>,
}

impl ReadCommentsRequest {
    /// First page of top-level comments for a media entry.
    pub fn for_media(media: CatalogMedia) -> Self {
        Self {
            page: 0,
            sort_mode: None,
            episode: None,
            media,
            parent_comment: None,
        }
    }
}
