//! Host-side handle to one installed provider.
//!
//! Every method encodes its arguments on the caller's thread, posts one job
//! to the provider's queue and returns a [`PendingCall`] that settles when
//! the guest resolves or rejects its callback.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::callback::{CallbackAdapter, PendingCall, Settle};
use super::codec::{decode_list, decode_tracking, DecodeError, FromGuest, ToGuest};
use super::error::{ExtensionError, ExtensionResult};
use super::features::Features;
use super::isolate::{ExtensionIsolate, LoadedInstance};
use super::lock;
use super::manifest::ExtensionIdentity;
use super::methods::GuestMethod;
use super::queue::QueueHandle;
use super::settings::{HostAction, SettingValue, SharedSettings};
use super::storage::SharedStorage;
use super::value::GuestValue;
use crate::models::{
    CatalogComment, CatalogEpisode, CatalogFilter, CatalogMedia, CatalogVideo, LoginScreen,
    ReadCommentsRequest, SearchResults, TrackingOptions,
};

pub const NO_MEDIA_FOUND: &str = "No media found";
pub const NO_EPISODES_FOUND: &str = "No episodes found";
pub const NO_VIDEOS_FOUND: &str = "No videos found";

/// An installed, ready provider.
pub struct Provider {
    identity: ExtensionIdentity,
    declared_features: Vec<String>,
    implemented: BTreeSet<GuestMethod>,
    queue: QueueHandle,
    settings: SharedSettings,
    storage: SharedStorage,
}

impl Provider {
    pub(crate) fn new(loaded: LoadedInstance, queue: QueueHandle) -> Self {
        let LoadedInstance {
            manifest,
            methods,
            settings,
            storage,
        } = loaded;

        Self {
            identity: manifest.identity(),
            declared_features: manifest.declared_features,
            implemented: methods,
            queue,
            settings,
            storage,
        }
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn version(&self) -> &str {
        &self.identity.version
    }

    pub fn identity(&self) -> &ExtensionIdentity {
        &self.identity
    }

    pub fn features(&self) -> Features {
        self.identity.features
    }

    /// Feature names exactly as the manifest declared them.
    pub fn declared_features(&self) -> &[String] {
        &self.declared_features
    }

    /// Whether the guest defines the function behind `method`.
    pub fn implements(&self, method: GuestMethod) -> bool {
        self.implemented.contains(&method)
    }

    /// Whether the provider has been shut down.
    pub fn is_stopped(&self) -> bool {
        self.queue.is_closed()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────

    pub fn search_media(
        &self,
        filters: &[CatalogFilter],
    ) -> PendingCall<SearchResults<CatalogMedia>> {
        let source = self.identity.id.clone();
        self.call(GuestMethod::SearchMedia, vec![filters.to_guest()], move |value| {
            let results = SearchResults::<CatalogMedia>::from_guest(&value)
                .map_err(|e| decode_error("search results", e))?;
            if results.is_empty() {
                return Err(zero_results(NO_MEDIA_FOUND));
            }
            Ok(SearchResults {
                items: results
                    .items
                    .into_iter()
                    .map(|media| media.with_source(&source))
                    .collect(),
                has_next_page: results.has_next_page,
            })
        })
    }

    pub fn episodes(&self, page: u32, media: &CatalogMedia) -> PendingCall<Vec<CatalogEpisode>> {
        self.call(
            GuestMethod::MediaEpisodes,
            vec![GuestValue::from(page), media.to_guest()],
            |value| non_empty(decode_list(&value, "episodes"), "episodes", NO_EPISODES_FOUND),
        )
    }

    pub fn videos(&self, episode: &CatalogEpisode) -> PendingCall<Vec<CatalogVideo>> {
        self.call(GuestMethod::MediaVideos, vec![episode.to_guest()], |value| {
            non_empty(decode_list(&value, "videos"), "videos", NO_VIDEOS_FOUND)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Comments
    // ─────────────────────────────────────────────────────────────────────

    pub fn post_comment(
        &self,
        parent: &CatalogComment,
        comment: &CatalogComment,
    ) -> PendingCall<CatalogComment> {
        self.call(
            GuestMethod::PostComment,
            vec![parent.to_guest(), comment.to_guest()],
            |value| CatalogComment::from_guest(&value).map_err(|e| decode_error("comment", e)),
        )
    }

    pub fn read_comments(&self, request: &ReadCommentsRequest) -> PendingCall<CatalogComment> {
        self.call(GuestMethod::ReadComments, vec![request.to_guest()], |value| {
            CatalogComment::from_guest(&value).map_err(|e| decode_error("comments", e))
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tracking
    // ─────────────────────────────────────────────────────────────────────

    /// Read or update tracking state. Pass `None` to only fetch it.
    pub fn track_media(
        &self,
        media: &CatalogMedia,
        options: Option<&TrackingOptions>,
    ) -> PendingCall<TrackingOptions> {
        let requested = options.map(|options| options.features);
        let options = options.map_or(GuestValue::Null, ToGuest::to_guest);
        self.call(GuestMethod::TrackMedia, vec![media.to_guest(), options], move |value| {
            decode_tracking(&value, requested).map_err(|e| decode_error("tracking options", e))
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Account
    // ─────────────────────────────────────────────────────────────────────

    /// First login step: the form the host should render.
    pub fn login_screen(&self) -> PendingCall<LoginScreen> {
        self.call(GuestMethod::LoginScreen, Vec::new(), |value| {
            LoginScreen::from_guest(&value).map_err(|e| decode_error("login screen", e))
        })
    }

    /// Second login step: submit the collected form values.
    pub fn login(&self, params: &LoginScreen) -> PendingCall<bool> {
        self.call(GuestMethod::Login, vec![params.to_guest()], |value| {
            Ok(value.is_truthy())
        })
    }

    pub fn log_out(&self) -> PendingCall<bool> {
        self.call(GuestMethod::LogOut, Vec::new(), |_| Ok(true))
    }

    pub fn is_logged_in(&self) -> PendingCall<bool> {
        self.call(GuestMethod::IsLoggedIn, Vec::new(), |value| Ok(value.is_truthy()))
    }

    /// Submit a login form, blocking until the guest answers, and refresh
    /// the login action on success.
    pub fn complete_login(&self, params: &LoginScreen) -> ExtensionResult<bool> {
        self.ensure_off_queue("complete_login")?;
        let logged_in = self.login(params).wait()?;
        if logged_in {
            self.sync_actions(Some(true));
        }
        Ok(logged_in)
    }

    /// Log out, blocking until the guest answers, and refresh the login
    /// action.
    pub fn complete_log_out(&self) -> ExtensionResult<()> {
        self.ensure_off_queue("complete_log_out")?;
        self.log_out().wait()?;
        self.sync_actions(Some(false));
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────

    /// The provider's settings screen with the host action items attached.
    ///
    /// Blocks on the login-status check when the provider supports login.
    /// Must not be called from the provider's own queue thread.
    pub fn settings(&self) -> ExtensionResult<SharedSettings> {
        self.ensure_off_queue("settings")?;

        let logged_in = if self.features().contains(Features::ACCOUNT_LOGIN) {
            let state = if self.implements(GuestMethod::IsLoggedIn) {
                self.is_logged_in().wait().unwrap_or_else(|e| {
                    tracing::warn!(extension = %self.id(), error = %e, "Login status check failed");
                    false
                })
            } else {
                false
            };
            Some(state)
        } else {
            None
        };

        self.sync_actions(logged_in);
        Ok(self.settings.clone())
    }

    /// Current value of a setting by full key.
    pub fn setting_value(&self, full_key: &str) -> Option<SettingValue> {
        let tree = lock(&self.settings);
        let id = tree.find_full_key(full_key)?;
        tree.node(id).and_then(|node| node.value.clone())
    }

    /// Persist a setting value and update the tree.
    pub fn set_setting_value(&self, full_key: &str, value: SettingValue) -> ExtensionResult<()> {
        let kind = {
            let tree = lock(&self.settings);
            let node = tree
                .find_full_key(full_key)
                .and_then(|id| tree.node(id))
                .ok_or_else(|| ExtensionError::Settings(format!("unknown setting '{full_key}'")))?;
            node.kind
        };
        if !kind.has_value() {
            return Err(ExtensionError::Settings(format!(
                "'{full_key}' is a {} and holds no value",
                kind.as_str()
            )));
        }

        lock(&self.storage)
            .set(full_key, value.to_json())
            .map_err(|e| ExtensionError::Storage(e.to_string()))?;

        let mut tree = lock(&self.settings);
        if let Some(id) = tree.find_full_key(full_key) {
            tree.update(id, |node| node.value = Some(value));
        }
        Ok(())
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub(crate) fn shutdown(&self) {
        self.queue.shutdown();
    }

    fn ensure_off_queue(&self, operation: &str) -> ExtensionResult<()> {
        if self.queue.is_current_thread() {
            return Err(ExtensionError::HostPrecondition(format!(
                "{operation}() cannot block on the extension's own queue"
            )));
        }
        Ok(())
    }

    /// Bring the host action items in line with the login state. `None`
    /// means the provider has no login.
    fn sync_actions(&self, logged_in: Option<bool>) {
        let mut tree = lock(&self.settings);
        let existing =
            tree.action_node(|action| matches!(action, HostAction::Login | HostAction::LogOut));

        match (logged_in, existing) {
            (Some(logged_in), Some(id)) => {
                let action = if logged_in { HostAction::LogOut } else { HostAction::Login };
                let current = tree.node(id).and_then(|node| node.action);
                if current != Some(action) {
                    tree.update(id, |node| {
                        node.key = action_key(action).to_string();
                        node.title = Some(action.title().to_string());
                        node.action = Some(action);
                    });
                }
            }
            (Some(logged_in), None) => {
                // Keep the login item ahead of uninstall.
                let uninstall = tree.action_node(|action| action == HostAction::Uninstall);
                if let Some(uninstall) = uninstall {
                    tree.remove(uninstall);
                }
                let id = tree.insert_action(HostAction::Login);
                if logged_in {
                    tree.update(id, |node| {
                        node.key = action_key(HostAction::LogOut).to_string();
                        node.title = Some(HostAction::LogOut.title().to_string());
                        node.action = Some(HostAction::LogOut);
                    });
                }
            }
            (None, Some(id)) => {
                tree.remove(id);
            }
            (None, None) => {}
        }

        if tree.action_node(|action| action == HostAction::Uninstall).is_none() {
            tree.insert_action(HostAction::Uninstall);
        }
    }

    fn call<T: Send + 'static>(
        &self,
        method: GuestMethod,
        args: Vec<GuestValue>,
        decode: impl FnOnce(GuestValue) -> ExtensionResult<T> + Send + 'static,
    ) -> PendingCall<T> {
        if !method.is_allowed(self.features()) {
            let error = ExtensionError::FeatureNotDeclared {
                extension: self.id().to_string(),
                feature: method.required_features().to_string(),
            };
            tracing::error!(
                extension = %self.id(),
                function = method.function_name(),
                "Host called a method the extension does not declare"
            );
            return PendingCall::failed(self.id(), error);
        }

        let (adapter, pending) = CallbackAdapter::new(self.id(), method.function_name(), decode);
        let settle: Arc<dyn Settle> = adapter;
        let job_settle = settle.clone();

        tracing::debug!(
            extension = %self.id(),
            function = method.function_name(),
            "Dispatching call"
        );
        let posted = self.queue.post(move |isolate: &mut ExtensionIsolate| {
            isolate.invoke(method, args, job_settle)
        });
        if !posted {
            settle.reject(ExtensionError::Uninstalled(self.id().to_string()));
        }
        pending
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.identity.id)
            .field("version", &self.identity.version)
            .field("features", &self.identity.features)
            .field("implemented", &self.implemented)
            .finish()
    }
}

fn action_key(action: HostAction) -> &'static str {
    match action {
        HostAction::Login => "login",
        HostAction::LogOut => "logout",
        HostAction::Uninstall => "uninstall",
    }
}

fn decode_error(record: &'static str, source: DecodeError) -> ExtensionError {
    ExtensionError::Decode { record, source }
}

fn zero_results(message: &str) -> ExtensionError {
    ExtensionError::ZeroResults {
        message: message.to_string(),
    }
}

fn non_empty<T>(
    decoded: Result<Vec<T>, DecodeError>,
    record: &'static str,
    empty_message: &str,
) -> ExtensionResult<Vec<T>> {
    let items = decoded.map_err(|e| decode_error(record, e))?;
    if items.is_empty() {
        return Err(zero_results(empty_message));
    }
    Ok(items)
}
