//! Fixed guest function names and the features that gate them.

use std::fmt;

use super::features::Features;

/// A provider method the host can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GuestMethod {
    SearchMedia,
    MediaEpisodes,
    MediaVideos,
    PostComment,
    ReadComments,
    TrackMedia,
    LoginScreen,
    Login,
    LogOut,
    IsLoggedIn,
}

impl GuestMethod {
    pub const ALL: [GuestMethod; 10] = [
        Self::SearchMedia,
        Self::MediaEpisodes,
        Self::MediaVideos,
        Self::PostComment,
        Self::ReadComments,
        Self::TrackMedia,
        Self::LoginScreen,
        Self::Login,
        Self::LogOut,
        Self::IsLoggedIn,
    ];

    /// Global function the guest defines for this method.
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::SearchMedia => "awerySearchMedia",
            Self::MediaEpisodes => "aweryMediaEpisodes",
            Self::MediaVideos => "aweryMediaVideos",
            Self::PostComment => "aweryPostMediaComment",
            Self::ReadComments => "aweryReadMediaComments",
            Self::TrackMedia => "aweryTrackMedia",
            Self::LoginScreen => "aweryLoginScreen",
            Self::Login => "aweryLogin",
            Self::LogOut => "aweryLogOut",
            Self::IsLoggedIn => "aweryIsLoggedIn",
        }
    }

    /// Features of which at least one must be declared.
    pub fn required_features(&self) -> Features {
        match self {
            Self::SearchMedia => Features::SEARCH_MEDIA,
            Self::MediaEpisodes => Features::MEDIA_WATCH | Features::MEDIA_READ,
            Self::MediaVideos => Features::MEDIA_WATCH,
            Self::PostComment | Self::ReadComments => Features::MEDIA_COMMENTS,
            Self::TrackMedia => Features::ACCOUNT_TRACK,
            Self::LoginScreen | Self::Login | Self::LogOut | Self::IsLoggedIn => {
                Features::ACCOUNT_LOGIN
            }
        }
    }

    /// Whether a provider with `features` may be asked for this method.
    pub fn is_allowed(&self, features: Features) -> bool {
        features.intersects(self.required_features())
    }
}

impl fmt::Display for GuestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_gate_accepts_either_feature() {
        assert!(GuestMethod::MediaEpisodes.is_allowed(Features::MEDIA_READ));
        assert!(GuestMethod::MediaEpisodes.is_allowed(Features::MEDIA_WATCH));
        assert!(!GuestMethod::MediaVideos.is_allowed(Features::MEDIA_READ));
        assert!(!GuestMethod::Login.is_allowed(Features::SEARCH_MEDIA));
    }

    #[test]
    fn test_function_names_are_unique() {
        let mut names: Vec<_> = GuestMethod::ALL.iter().map(|m| m.function_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), GuestMethod::ALL.len());
    }
}
