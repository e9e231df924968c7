//! Feature negotiation.
//!
//! A provider declares the optional capabilities it implements as a list of
//! names in its manifest. The list is folded into a [`Features`] bitmask once,
//! at initialization, and consulted before every optional call.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Optional capabilities a provider may implement.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Features: u32 {
        const MEDIA_COMMENTS = 1 << 0;
        const COMMENTS_SORT = 1 << 1;
        const COMMENTS_VOTE = 1 << 2;
        const MEDIA_WATCH = 1 << 3;
        const MEDIA_READ = 1 << 4;
        const MEDIA_REPORT = 1 << 5;
        const SEARCH_TAGS = 1 << 6;
        const SEARCH_MEDIA = 1 << 7;
        const ACCOUNT_LOGIN = 1 << 8;
        const ACCOUNT_TRACK = 1 << 9;
    }
}

/// Canonical manifest names, in declaration order.
const FEATURE_NAMES: &[(&str, Features)] = &[
    ("media_comments", Features::MEDIA_COMMENTS),
    ("media_comments_sort", Features::COMMENTS_SORT),
    ("media_comments_vote", Features::COMMENTS_VOTE),
    ("media_watch", Features::MEDIA_WATCH),
    ("media_read", Features::MEDIA_READ),
    ("media_report", Features::MEDIA_REPORT),
    ("search_tags", Features::SEARCH_TAGS),
    ("search_media", Features::SEARCH_MEDIA),
    ("account_login", Features::ACCOUNT_LOGIN),
    ("account_track", Features::ACCOUNT_TRACK),
];

const FEATURE_ALIASES: &[(&str, Features)] = &[("media_search", Features::SEARCH_MEDIA)];

impl Features {
    /// Look up one manifest feature name.
    pub fn from_manifest_name(name: &str) -> Option<Self> {
        let name = name.trim();
        FEATURE_NAMES
            .iter()
            .chain(FEATURE_ALIASES)
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, flag)| *flag)
    }

    /// Fold declared names into a bitmask. Unknown names are ignored.
    pub fn negotiate<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().fold(Self::empty(), |acc, name| {
            let name = name.as_ref();
            match Self::from_manifest_name(name) {
                Some(flag) => acc | flag,
                None => {
                    tracing::debug!(feature = name, "Ignoring unknown feature");
                    acc
                }
            }
        })
    }

    /// Canonical names of every set flag.
    pub fn to_names(self) -> Vec<&'static str> {
        FEATURE_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl std::fmt::Display for Features {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_names().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_names_are_ignored() {
        let features = Features::negotiate(["media_search", "totally_unknown_flag"]);
        assert_eq!(features, Features::SEARCH_MEDIA);
    }

    #[test]
    fn test_negotiate_all_names() {
        let features = Features::negotiate(FEATURE_NAMES.iter().map(|(name, _)| *name));
        assert_eq!(features, Features::all());
        assert_eq!(features.to_names().len(), FEATURE_NAMES.len());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(Features::from_manifest_name("Account_Login"), Some(Features::ACCOUNT_LOGIN));
        assert_eq!(Features::from_manifest_name(" search_media "), Some(Features::SEARCH_MEDIA));
        assert_eq!(Features::from_manifest_name(""), None);
    }

    #[test]
    fn test_manifest_names_differ_from_flag_names() {
        assert_eq!(Features::from_manifest_name("media_search"), Some(Features::SEARCH_MEDIA));
        assert_eq!(Features::from_name("SEARCH_MEDIA"), Some(Features::SEARCH_MEDIA));
        assert_eq!(Features::from_name("media_search"), None);
    }

    #[test]
    fn test_display() {
        let features = Features::MEDIA_WATCH | Features::SEARCH_MEDIA;
        assert_eq!(features.to_string(), "media_watch, search_media");
        assert_eq!(Features::empty().to_string(), "");
    }
}
