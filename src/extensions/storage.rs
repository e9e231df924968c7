//! Per-provider preference storage.
//!
//! Backs the `Awery.get*`/`Awery.set*` family and persisted setting values.
//! Each provider gets one JSON file under `<data_dir>/<id>/preferences.json`;
//! values are cached in memory and written through on every change.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde_json::{Number, Value};

use super::value::GuestValue;

/// Storage shared between the queue thread and the host.
pub type SharedStorage = Arc<Mutex<ExtensionStorage>>;

/// Typed view used by the guest accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefKind {
    Boolean,
    Integer,
    Float,
    String,
    StringSet,
}

impl PrefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::StringSet => "string set",
        }
    }

    /// Read a stored value as this kind. Mismatched kinds read as absent.
    pub fn read(&self, stored: &Value) -> Option<GuestValue> {
        match (self, stored) {
            (Self::Boolean, Value::Bool(b)) => Some(GuestValue::Bool(*b)),
            (Self::Integer, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(GuestValue::from),
            (Self::Float, Value::Number(n)) => n.as_f64().map(GuestValue::Number),
            (Self::String, Value::String(s)) => Some(GuestValue::from(s)),
            (Self::StringSet, Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(GuestValue::from))
                .collect::<Option<Vec<_>>>()
                .map(GuestValue::Sequence),
            _ => None,
        }
    }

    /// Convert a guest value into its stored form.
    pub fn encode(&self, value: &GuestValue) -> Result<Value, String> {
        let mismatch = || format!("expected a {}, got {}", self.as_str(), value.kind());
        match self {
            Self::Boolean => value.as_bool().map(Value::Bool).ok_or_else(mismatch),
            Self::Integer => value
                .as_f64()
                .filter(|n| n.is_finite() && n.fract() == 0.0)
                .map(|n| Value::from(n as i64))
                .ok_or_else(mismatch),
            Self::Float => value
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(mismatch),
            Self::String => value
                .to_scalar_string()
                .map(Value::String)
                .ok_or_else(mismatch),
            Self::StringSet => {
                let items = value.as_sequence().ok_or_else(mismatch)?;
                let mut set: Vec<String> = Vec::with_capacity(items.len());
                for item in items {
                    let item = item.to_scalar_string().ok_or_else(mismatch)?;
                    if !set.contains(&item) {
                        set.push(item);
                    }
                }
                Ok(Value::from(set))
            }
        }
    }
}

/// One provider's key-value preferences.
pub struct ExtensionStorage {
    /// Provider id, for error messages.
    extension_id: String,
    path: PathBuf,
    cache: BTreeMap<String, Value>,
    dirty: bool,
}

impl ExtensionStorage {
    /// Open the storage for `extension_id` under `data_dir`.
    ///
    /// A missing or unreadable file starts empty.
    pub fn open(extension_id: &str, data_dir: &Path) -> Self {
        let path = data_dir.join(extension_id).join("preferences.json");

        let cache = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(
                    extension = extension_id,
                    path = %path.display(),
                    error = %e,
                    "Discarding unreadable preferences"
                );
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self {
            extension_id: extension_id.to_string(),
            path,
            cache,
            dirty: false,
        }
    }

    pub fn shared(self) -> SharedStorage {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.cache.get(key)
    }

    /// Typed read; `None` when absent or stored under another kind.
    pub fn get_as(&self, key: &str, kind: PrefKind) -> Option<GuestValue> {
        self.cache.get(key).and_then(|stored| kind.read(stored))
    }

    pub fn set(&mut self, key: &str, value: Value) -> anyhow::Result<()> {
        self.cache.insert(key.to_string(), value);
        self.dirty = true;
        self.flush()
    }

    /// Typed write. Returns the stored JSON form.
    pub fn set_as(
        &mut self,
        key: &str,
        kind: PrefKind,
        value: &GuestValue,
    ) -> anyhow::Result<Value> {
        let encoded = kind
            .encode(value)
            .map_err(|message| anyhow::anyhow!("cannot store '{key}': {message}"))?;
        self.set(key, encoded.clone())?;
        Ok(encoded)
    }

    /// Remove a key. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> anyhow::Result<bool> {
        if self.cache.remove(key).is_none() {
            return Ok(false);
        }
        self.dirty = true;
        self.flush()?;
        Ok(true)
    }

    pub fn has(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }

    /// Write pending changes to disk.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create storage directory for extension '{}'",
                    self.extension_id
                )
            })?;
        }

        let contents = serde_json::to_string_pretty(&self.cache)?;
        fs::write(&self.path, contents).with_context(|| {
            format!(
                "Failed to write preferences for extension '{}'",
                self.extension_id
            )
        })?;

        self.dirty = false;
        Ok(())
    }
}

impl Drop for ExtensionStorage {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(
                extension = %self.extension_id,
                error = %e,
                "Failed to flush preferences"
            );
        }
    }
}

impl std::fmt::Debug for ExtensionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionStorage")
            .field("extension_id", &self.extension_id)
            .field("path", &self.path)
            .field("keys", &self.cache.len())
            .finish()
    }
}
