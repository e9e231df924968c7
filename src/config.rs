use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub runtime: RuntimeConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding installed `*.js` providers. Supports `~`.
    pub extensions_dir: String,
    /// Root for per-extension preferences. Supports `~`.
    pub data_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub memory_limit_mb: usize,
    pub max_stack_kb: usize,
    pub execution_timeout_secs: u64,
    pub max_extensions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub worker_threads: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info,awery_bridge::guest=debug`.
    pub filter: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            extensions_dir: "~/.local/share/awery/extensions".to_string(),
            data_dir: "~/.local/share/awery/data".to_string(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 64,
            max_stack_kb: 1024,
            execution_timeout_secs: 30,
            max_extensions: 64,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("awery-bridge/{}", env!("CARGO_PKG_VERSION")),
            worker_threads: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
            })
            .join("awery")
            .join("config.toml")
    }

    /// Load config from the default path, or return defaults if not found
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`. Read and parse errors fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut config = if path.exists() {
            match Self::read(path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Using default config");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        config.validate();
        config
    }

    fn read(path: &Path) -> BridgeResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate and clamp config values to acceptable ranges
    pub fn validate(&mut self) {
        self.runtime.memory_limit_mb = self.runtime.memory_limit_mb.clamp(8, 1024);
        self.runtime.max_stack_kb = self.runtime.max_stack_kb.clamp(256, 3072);
        self.runtime.execution_timeout_secs = self.runtime.execution_timeout_secs.clamp(1, 600);
        self.runtime.max_extensions = self.runtime.max_extensions.clamp(1, 512);

        self.network.timeout_secs = self.network.timeout_secs.clamp(1, 300);
        self.network.worker_threads = self.network.worker_threads.clamp(1, 16);

        if self.logging.filter.trim().is_empty() {
            self.logging.filter = LoggingConfig::default().filter;
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> BridgeResult<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> BridgeResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;

        Ok(())
    }

    pub fn extensions_dir(&self) -> PathBuf {
        expand_path(&self.general.extensions_dir)
    }

    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.general.data_dir)
    }
}

/// Expand `~` and environment variables, keeping the raw text if expansion fails.
fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[runtime]\nmax_extensions = 4\n").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.runtime.max_extensions, 4);
        assert_eq!(config.runtime.memory_limit_mb, 64);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "runtime = 'nope").unwrap();

        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = Config::default();
        config.runtime.execution_timeout_secs = 0;
        config.runtime.memory_limit_mb = 1 << 20;
        config.network.worker_threads = 0;
        config.logging.filter = "  ".to_string();
        config.validate();

        assert_eq!(config.runtime.execution_timeout_secs, 1);
        assert_eq!(config.runtime.memory_limit_mb, 1024);
        assert_eq!(config.network.worker_threads, 1);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.general.extensions_dir = dir.path().join("ext").display().to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.extensions_dir(), dir.path().join("ext"));
    }

    #[test]
    fn test_tilde_expansion() {
        let config = Config::default();
        assert!(!config.extensions_dir().starts_with("~"));
    }
}
