//! Progress tracking options.

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Fields a tracker supports. Only supported fields are ever read from or
    /// written to the guest.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct TrackingFeatures: u32 {
        const DATE_START = 1 << 0;
        const DATE_END = 1 << 1;
        const PROGRESS = 1 << 2;
        const SCORE = 1 << 3;
        const LISTS = 1 << 4;
        const PRIVATE = 1 << 5;
        const LIST_CREATE = 1 << 6;
    }
}

const FEATURE_NAMES: &[(&str, TrackingFeatures)] = &[
    ("startDate", TrackingFeatures::DATE_START),
    ("endDate", TrackingFeatures::DATE_END),
    ("progress", TrackingFeatures::PROGRESS),
    ("score", TrackingFeatures::SCORE),
    ("lists", TrackingFeatures::LISTS),
    ("isPrivate", TrackingFeatures::PRIVATE),
    ("createList", TrackingFeatures::LIST_CREATE),
];

impl TrackingFeatures {
    /// Case-insensitive lookup of a single guest feature name.
    pub fn from_guest_name(name: &str) -> Option<Self> {
        FEATURE_NAMES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name.trim()))
            .map(|(_, flag)| *flag)
    }

    /// Guest names of every set flag.
    pub fn to_names(self) -> Vec<&'static str> {
        FEATURE_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

/// A user list on the tracking service ("Watching", "Planned", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogList {
    pub id: String,
    pub title: String,
}

/// Tracking state for one media entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingOptions {
    pub features: TrackingFeatures,
    /// Tracker-side identifier of the entry.
    pub id: Option<String>,
    pub progress: Option<f32>,
    pub score: Option<f32>,
    pub is_private: Option<bool>,
    pub lists: Vec<CatalogList>,
    pub current_lists: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl TrackingOptions {
    pub fn new(features: TrackingFeatures) -> Self {
        Self {
            features,
            ..Default::default()
        }
    }

    pub fn supports(&self, feature: TrackingFeatures) -> bool {
        self.features.contains(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_names() {
        assert_eq!(
            TrackingFeatures::from_guest_name("ISPRIVATE"),
            Some(TrackingFeatures::PRIVATE)
        );
        assert_eq!(TrackingFeatures::from_guest_name("rewatches"), None);

        let names = (TrackingFeatures::PROGRESS | TrackingFeatures::SCORE).to_names();
        assert_eq!(names, vec!["progress", "score"]);
    }
}
