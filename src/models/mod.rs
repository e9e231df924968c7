//! Domain records exchanged with providers.
//!
//! These are plain value objects: created fresh for every call, cloned
//! freely, and serializable so hosts can cache or display them.

mod comment;
mod episode;
mod filter;
mod media;
mod tracking;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use comment::{CatalogComment, ReadCommentsRequest};
pub use episode::{CatalogEpisode, CatalogSubtitle, CatalogVideo};
pub use filter::{CatalogFilter, FilterValue, TriState};
pub use media::{CatalogMedia, CatalogTag, ImageVersions, MediaStatus, MediaType};
pub use tracking::{CatalogList, TrackingFeatures, TrackingOptions};

/// A page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults<T> {
    pub items: Vec<T>,
    pub has_next_page: bool,
}

impl<T> SearchResults<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Login form description: field name to field label/kind, as the provider
/// defines it.
pub type LoginScreen = BTreeMap<String, String>;
