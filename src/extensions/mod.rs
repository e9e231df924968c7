//! Extension system for Awery.
//!
//! Providers are JavaScript program texts evaluated in an embedded QuickJS
//! engine. Each one registers a manifest through the `Awery` global object
//! and exposes well-known functions (`awerySearchMedia`, `aweryLogin`, ...)
//! that the host calls through typed [`Provider`] methods.
//!
//! # Architecture
//!
//! ```text
//! ExtensionManager
//! ├── registry: BTreeMap<ExtensionId, Arc<Provider>>
//! ├── http: HttpBridge (shared reqwest client)
//! └── runtime: tokio Runtime (guest fetches and timers)
//!
//! Provider
//! ├── identity + declared features
//! ├── settings: SharedSettings, storage: SharedStorage
//! └── queue: QueueHandle ──► queue thread
//!                            └── ExtensionIsolate (engine, Awery bindings)
//! ```
//!
//! Every call returns a [`PendingCall`] that settles exactly once: with a
//! decoded result, a per-call error, or `Cancelled`/`Abandoned`. Jobs for
//! one provider run strictly in order on its queue thread.

pub mod callback;
pub mod codec;
mod error;
mod features;
mod host;
pub mod ipc;
mod isolate;
mod manifest;
mod methods;
mod provider;
mod queue;
pub mod settings;
pub mod storage;
mod value;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use callback::{PendingCall, Settle};
pub use codec::{DecodeError, FromGuest, ToGuest};
pub use error::{ExtensionError, ExtensionResult};
pub use features::Features;
pub use host::{ActionOutcome, ExtensionHostConfig, ExtensionManager, LoadFailure};
pub use isolate::IsolateState;
pub use manifest::{ExtensionIdentity, ExtensionManifest};
pub use methods::GuestMethod;
pub use provider::{Provider, NO_EPISODES_FOUND, NO_MEDIA_FOUND, NO_VIDEOS_FOUND};
pub use settings::{
    HostAction, SettingItem, SettingKind, SettingValue, SettingsEvent, SettingsTree,
    SharedSettings,
};
pub use storage::{ExtensionStorage, SharedStorage};
pub use value::GuestValue;

/// Unique identifier for an extension.
pub type ExtensionId = String;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
