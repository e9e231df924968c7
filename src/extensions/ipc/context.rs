//! Per-instance bridge state.
//!
//! One [`BridgeContext`] lives on each provider's queue thread and is shared
//! by every capability function installed into that provider's engine. It is
//! deliberately `!Send`: it holds engine handles for pending guest callbacks.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use rquickjs::{Function, Object, Persistent};

use super::types::{FetchRequest, FetchResponse};
use crate::extensions::error::ExtensionError;
use crate::extensions::lock;
use crate::extensions::manifest::ExtensionManifest;
use crate::extensions::queue::WeakQueue;
use crate::extensions::settings::{SettingValue, SettingsTree, SharedSettings};
use crate::extensions::storage::{ExtensionStorage, SharedStorage};
use crate::extensions::value::GuestValue;

/// HTTP client plus the runtime that drives guest I/O and timers.
#[derive(Clone)]
pub(crate) struct HttpBridge {
    client: reqwest::Client,
    handle: tokio::runtime::Handle,
}

impl HttpBridge {
    pub(crate) fn new(client: reqwest::Client, handle: tokio::runtime::Handle) -> Self {
        Self { client, handle }
    }

    pub(crate) fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        self.handle.spawn(task);
    }

    /// Perform a request. Errors are guest-facing messages.
    pub(crate) async fn execute(&self, request: FetchRequest) -> Result<FetchResponse, String> {
        let mut builder = self
            .client
            .request(request.method.as_reqwest(), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {e}"))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response body: {e}"))?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

impl std::fmt::Debug for HttpBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBridge").finish_non_exhaustive()
    }
}

/// Guest callback waiting for an asynchronous completion.
pub(crate) enum GuestCallback {
    /// `{ resolve, reject }` object passed to `Awery.fetch`.
    Fetch(Persistent<Object<'static>>),
    /// Function passed to `Awery.setTimeout`.
    Timer(Persistent<Function<'static>>),
}

pub(crate) struct BridgeContext {
    /// Where the program text came from, until the manifest names it.
    origin: String,
    data_dir: PathBuf,
    http: HttpBridge,
    queue: WeakQueue,
    manifest: RefCell<Option<ExtensionManifest>>,
    manifest_error: RefCell<Option<ExtensionError>>,
    storage: RefCell<Option<SharedStorage>>,
    settings: RefCell<Option<SharedSettings>>,
    callbacks: RefCell<HashMap<u64, GuestCallback>>,
    next_callback: Cell<u64>,
}

impl BridgeContext {
    pub(crate) fn new(origin: &str, data_dir: PathBuf, http: HttpBridge, queue: WeakQueue) -> Self {
        Self {
            origin: origin.to_string(),
            data_dir,
            http,
            queue,
            manifest: RefCell::new(None),
            manifest_error: RefCell::new(None),
            storage: RefCell::new(None),
            settings: RefCell::new(None),
            callbacks: RefCell::new(HashMap::new()),
            next_callback: Cell::new(1),
        }
    }

    /// Provider id once known, otherwise the origin.
    pub(crate) fn label(&self) -> String {
        self.manifest
            .borrow()
            .as_ref()
            .map_or_else(|| self.origin.clone(), |manifest| manifest.id.clone())
    }

    pub(crate) fn origin(&self) -> &str {
        &self.origin
    }

    // ─────────────────────────────────────────────────────────────────────
    // Manifest
    // ─────────────────────────────────────────────────────────────────────

    /// Handle `Awery.setManifest`. Errors are thrown back into the guest.
    pub(crate) fn set_manifest(&self, value: &GuestValue) -> Result<(), String> {
        if self.manifest.borrow().is_some() {
            return Err("setManifest may only be called once".to_string());
        }

        let manifest = match ExtensionManifest::from_guest(value, &self.origin) {
            Ok(manifest) => manifest,
            Err(e) => {
                let message = e.to_string();
                self.manifest_error.replace(Some(e));
                return Err(message);
            }
        };

        let storage = ExtensionStorage::open(&manifest.id, &self.data_dir).shared();

        let mut tree = SettingsTree::new(&manifest.id, &manifest.title);
        let root = tree.root();
        for item in manifest.settings.iter().cloned() {
            let key = item.key.clone();
            if let Err(e) = tree.insert(root, item) {
                tracing::warn!(
                    extension = %manifest.id,
                    key = %key,
                    error = %e,
                    "Skipping manifest setting"
                );
            }
        }
        {
            let storage = lock(&storage);
            tree.restore_values(|key| storage.get(key).cloned());
        }

        tracing::info!(
            extension = %manifest.id,
            version = %manifest.version,
            features = %manifest.features,
            "Extension registered its manifest"
        );

        self.storage.replace(Some(storage));
        self.settings.replace(Some(tree.shared()));
        self.manifest.replace(Some(manifest));
        Ok(())
    }

    pub(crate) fn manifest(&self) -> Option<ExtensionManifest> {
        self.manifest.borrow().clone()
    }

    pub(crate) fn take_manifest_error(&self) -> Option<ExtensionError> {
        self.manifest_error.borrow_mut().take()
    }

    pub(crate) fn storage(&self) -> Result<SharedStorage, String> {
        self.storage
            .borrow()
            .clone()
            .ok_or_else(|| "storage is unavailable before setManifest".to_string())
    }

    pub(crate) fn settings(&self) -> Result<SharedSettings, String> {
        self.settings
            .borrow()
            .clone()
            .ok_or_else(|| "settings are unavailable before setManifest".to_string())
    }

    /// Mirror a stored preference into the settings node with the same
    /// full key, if any.
    pub(crate) fn sync_setting(&self, key: &str, stored: Option<&serde_json::Value>) {
        let Ok(settings) = self.settings() else {
            return;
        };
        let mut tree = lock(&settings);
        let Some(id) = tree.find_full_key(key) else {
            return;
        };
        let Some(kind) = tree.node(id).map(|node| node.kind) else {
            return;
        };
        let value = stored.and_then(|stored| SettingValue::from_json(kind, stored));
        tree.update(id, |node| node.value = value);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pending guest callbacks
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn register_callback(&self, callback: GuestCallback) -> u64 {
        let id = self.next_callback.get();
        self.next_callback.set(id.wrapping_add(1));
        self.callbacks.borrow_mut().insert(id, callback);
        id
    }

    pub(crate) fn take_callback(&self, id: u64) -> Option<GuestCallback> {
        self.callbacks.borrow_mut().remove(&id)
    }

    #[cfg(test)]
    pub(crate) fn pending_callbacks(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Release every engine handle. Must run before the engine is dropped.
    pub(crate) fn clear_callbacks(&self) {
        self.callbacks.borrow_mut().clear();
    }

    /// Run a request on the I/O runtime and post its completion back.
    pub(crate) fn spawn_fetch(&self, id: u64, request: FetchRequest) {
        let http = self.http.clone();
        let queue = self.queue.clone();
        let label = self.label();

        tracing::debug!(
            extension = %label,
            method = ?request.method,
            url = %request.url,
            "Guest fetch"
        );
        self.http.spawn(async move {
            let outcome = http.execute(request).await;
            let delivered = queue.post(move |isolate| isolate.complete_fetch(id, outcome));
            if !delivered {
                tracing::debug!(
                    extension = %label,
                    "Dropping fetch completion for a stopped extension"
                );
            }
        });
    }

    /// Post a timer firing back to the queue after `delay`.
    pub(crate) fn spawn_timer(&self, id: u64, delay: Duration) {
        let queue = self.queue.clone();
        let label = self.label();

        self.http.spawn(async move {
            tokio::time::sleep(delay).await;
            if !queue.post(move |isolate| isolate.fire_timer(id)) {
                tracing::debug!(extension = %label, "Dropping timer for a stopped extension");
            }
        });
    }
}
