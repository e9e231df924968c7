//! Extension manager - owns every installed provider.
//!
//! The ExtensionManager is responsible for:
//! - Running the load state machine for new program texts
//! - Keeping the registry of ready providers, keyed by id
//! - Owning the shared I/O runtime used for guest fetches and timers
//! - Shutting providers down on uninstall and on drop

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::error::{ExtensionError, ExtensionResult};
use super::features::Features;
use super::ipc::HttpBridge;
use super::isolate::LoadedInstance;
use super::provider::Provider;
use super::queue::{self, LoadRequest, QueueHandle};
use super::settings::{HostAction, SharedSettings};
use super::ExtensionId;
use crate::config::Config;
use crate::models::LoginScreen;

type Registry = BTreeMap<ExtensionId, Arc<Provider>>;

/// Configuration for the extension manager.
#[derive(Clone)]
pub struct ExtensionHostConfig {
    /// Directory scanned by [`ExtensionManager::load_directory`].
    pub extensions_dir: PathBuf,

    /// Root for per-extension preference storage.
    pub data_dir: PathBuf,

    /// Engine heap limit per extension, in bytes.
    pub memory_limit: usize,

    /// Engine stack limit per extension, in bytes.
    pub max_stack_size: usize,

    /// Maximum time one job may run guest code.
    pub execution_timeout: Duration,

    /// Maximum number of installed extensions.
    pub max_extensions: usize,

    /// Timeout applied to every guest HTTP request.
    pub http_timeout: Duration,

    pub user_agent: String,

    /// Worker threads of the shared I/O runtime.
    pub network_workers: usize,
}

impl Default for ExtensionHostConfig {
    fn default() -> Self {
        Self {
            extensions_dir: default_extensions_dir(),
            data_dir: default_data_dir(),
            memory_limit: 64 * 1024 * 1024,
            max_stack_size: 1024 * 1024,
            execution_timeout: Duration::from_secs(30),
            max_extensions: 64,
            http_timeout: Duration::from_secs(30),
            user_agent: format!("awery-bridge/{}", env!("CARGO_PKG_VERSION")),
            network_workers: 2,
        }
    }
}

impl ExtensionHostConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            extensions_dir: config.extensions_dir(),
            data_dir: config.data_dir(),
            memory_limit: config.runtime.memory_limit_mb * 1024 * 1024,
            max_stack_size: config.runtime.max_stack_kb * 1024,
            execution_timeout: Duration::from_secs(config.runtime.execution_timeout_secs),
            max_extensions: config.runtime.max_extensions,
            http_timeout: Duration::from_secs(config.network.timeout_secs),
            user_agent: config.network.user_agent.clone(),
            network_workers: config.network.worker_threads,
        }
    }
}

impl std::fmt::Debug for ExtensionHostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionHostConfig")
            .field("extensions_dir", &self.extensions_dir)
            .field("data_dir", &self.data_dir)
            .field("memory_limit", &self.memory_limit)
            .field("max_stack_size", &self.max_stack_size)
            .field("execution_timeout", &self.execution_timeout)
            .field("max_extensions", &self.max_extensions)
            .field("http_timeout", &self.http_timeout)
            .finish_non_exhaustive()
    }
}

fn default_extensions_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("awery").join("extensions"))
        .unwrap_or_else(|| PathBuf::from(".awery/extensions"))
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("awery").join("data"))
        .unwrap_or_else(|| PathBuf::from(".awery/data"))
}

/// A program text that failed to load during a directory scan.
#[derive(Debug)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: ExtensionError,
}

/// Result of a host action from the settings screen.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The host should render this form and pass the answers to
    /// [`Provider::complete_login`].
    LoginRequired(LoginScreen),
    LoggedOut,
    Uninstalled,
}

/// Owner of every installed provider.
pub struct ExtensionManager {
    config: ExtensionHostConfig,
    registry: RwLock<Registry>,
    http: HttpBridge,
    /// Shared I/O runtime. `None` only while dropping.
    runtime: Option<tokio::runtime::Runtime>,
}

impl ExtensionManager {
    /// Create a manager and its I/O runtime. No extensions are loaded.
    pub fn new(config: ExtensionHostConfig) -> ExtensionResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.network_workers.max(1))
            .thread_name("awery-io")
            .enable_all()
            .build()?;

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ExtensionError::Http(e.to_string()))?;

        let http = HttpBridge::new(client, runtime.handle().clone());

        tracing::debug!(config = ?config, "Extension manager created");
        Ok(Self {
            config,
            registry: RwLock::new(BTreeMap::new()),
            http,
            runtime: Some(runtime),
        })
    }

    pub fn config(&self) -> &ExtensionHostConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Installation
    // ─────────────────────────────────────────────────────────────────────

    /// Load a program text and register it once ready.
    ///
    /// Blocks until initialization finishes; use
    /// [`install_async`](Self::install_async) from async code.
    pub fn install(&self, source: &str, origin: &str) -> ExtensionResult<Arc<Provider>> {
        self.check_capacity()?;
        let (queue, ready) = queue::spawn(self.load_request(source, origin))?;
        let loaded = ready.blocking_recv().map_err(|_| thread_exited(origin))?;
        self.register(queue, loaded)
    }

    pub async fn install_async(
        &self,
        source: &str,
        origin: &str,
    ) -> ExtensionResult<Arc<Provider>> {
        self.check_capacity()?;
        let (queue, ready) = queue::spawn(self.load_request(source, origin))?;
        let loaded = ready.await.map_err(|_| thread_exited(origin))?;
        self.register(queue, loaded)
    }

    /// Load a program text from a file.
    pub fn install_file(&self, path: &Path) -> ExtensionResult<Arc<Provider>> {
        let source = fs::read_to_string(path)?;
        self.install(&source, &path.display().to_string())
    }

    /// Load every `*.js` file in the configured extensions directory.
    ///
    /// A missing directory means no extensions. Failures are logged and
    /// returned; they never stop the scan.
    pub fn load_directory(&self) -> ExtensionResult<Vec<LoadFailure>> {
        let dir = self.config.extensions_dir.clone();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        self.load_from(&dir)
    }

    /// Load every `*.js` file in `dir`.
    pub fn load_from(&self, dir: &Path) -> ExtensionResult<Vec<LoadFailure>> {
        if !dir.is_dir() {
            return Err(ExtensionError::DirectoryNotFound(dir.to_path_buf()));
        }

        let mut scripts: Vec<PathBuf> = fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "js"))
            .collect();
        scripts.sort();

        let mut failures = Vec::new();
        for path in scripts {
            match self.install_file(&path) {
                Ok(provider) => {
                    tracing::debug!(
                        extension = %provider.id(),
                        path = %path.display(),
                        "Loaded extension"
                    );
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), error = %error, "Skipping extension");
                    failures.push(LoadFailure { path, error });
                }
            }
        }
        Ok(failures)
    }

    /// Remove an extension and stop its queue. Calls still queued are
    /// abandoned; later calls on retained handles fail with `Uninstalled`.
    pub fn uninstall(&self, id: &str) -> ExtensionResult<Arc<Provider>> {
        let provider = self
            .write_registry()
            .remove(id)
            .ok_or_else(|| ExtensionError::ExtensionNotFound(id.to_string()))?;
        provider.shutdown();
        tracing::info!(extension = %id, "Uninstalled extension");
        Ok(provider)
    }

    /// Delete an extension's stored preferences.
    pub fn purge_data(&self, id: &str) -> ExtensionResult<()> {
        let dir = self.config.data_dir.join(id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn get_extension(&self, id: &str) -> Option<Arc<Provider>> {
        self.read_registry().get(id).cloned()
    }

    /// All installed extensions, sorted by id.
    pub fn get_all_extensions(&self) -> Vec<Arc<Provider>> {
        self.read_registry().values().cloned().collect()
    }

    /// Extensions declaring every feature in `features`.
    pub fn with_features(&self, features: Features) -> Vec<Arc<Provider>> {
        self.read_registry()
            .values()
            .filter(|provider| provider.features().contains(features))
            .cloned()
            .collect()
    }

    pub fn extension_count(&self) -> usize {
        self.read_registry().len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────

    /// Settings screen of an extension, host actions included.
    pub fn settings(&self, id: &str) -> ExtensionResult<SharedSettings> {
        self.require(id)?.settings()
    }

    /// Run a host action item.
    pub fn run_action(&self, id: &str, action: HostAction) -> ExtensionResult<ActionOutcome> {
        let provider = self.require(id)?;
        match action {
            HostAction::Login => Ok(ActionOutcome::LoginRequired(provider.login_screen().wait()?)),
            HostAction::LogOut => {
                provider.complete_log_out()?;
                Ok(ActionOutcome::LoggedOut)
            }
            HostAction::Uninstall => {
                self.uninstall(id)?;
                Ok(ActionOutcome::Uninstalled)
            }
        }
    }

    fn require(&self, id: &str) -> ExtensionResult<Arc<Provider>> {
        self.get_extension(id)
            .ok_or_else(|| ExtensionError::ExtensionNotFound(id.to_string()))
    }

    fn load_request(&self, source: &str, origin: &str) -> LoadRequest {
        LoadRequest {
            source: source.to_string(),
            origin: origin.to_string(),
            data_dir: self.config.data_dir.clone(),
            memory_limit: self.config.memory_limit,
            max_stack_size: self.config.max_stack_size,
            execution_timeout: self.config.execution_timeout,
            http: self.http.clone(),
        }
    }

    fn check_capacity(&self) -> ExtensionResult<()> {
        if self.extension_count() >= self.config.max_extensions {
            return Err(ExtensionError::TooManyExtensions(self.config.max_extensions));
        }
        Ok(())
    }

    fn register(
        &self,
        queue: QueueHandle,
        loaded: ExtensionResult<LoadedInstance>,
    ) -> ExtensionResult<Arc<Provider>> {
        let loaded = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load extension");
                return Err(e);
            }
        };

        let mut registry = self.write_registry();
        let id = loaded.manifest.id.clone();
        if registry.contains_key(&id) {
            queue.shutdown();
            return Err(ExtensionError::AlreadyInstalled(id));
        }
        if registry.len() >= self.config.max_extensions {
            queue.shutdown();
            return Err(ExtensionError::TooManyExtensions(self.config.max_extensions));
        }

        let provider = Arc::new(Provider::new(loaded, queue));
        registry.insert(id, provider.clone());
        tracing::info!(
            extension = %provider.id(),
            version = %provider.version(),
            features = %provider.features(),
            "Installed extension"
        );
        Ok(provider)
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ExtensionManager {
    fn drop(&mut self) {
        for provider in self.write_registry().values() {
            provider.shutdown();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for ExtensionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionManager")
            .field("config", &self.config)
            .field("extensions", &self.extension_count())
            .finish()
    }
}

fn thread_exited(origin: &str) -> ExtensionError {
    ExtensionError::LoadFailed {
        extension: origin.to_string(),
        message: "extension thread exited during initialization".to_string(),
    }
}
