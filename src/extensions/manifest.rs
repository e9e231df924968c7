//! Extension manifest.
//!
//! A provider registers itself by calling `Awery.setManifest` exactly once
//! while its program text is evaluated:
//!
//! ```js
//! Awery.setManifest({
//!     id: "com.example.demo",
//!     title: "Demo",
//!     version: "1.0.0",
//!     features: ["search_media", "media_watch"],
//!     settings: [{ key: "nsfw", type: "boolean", value: false }],
//! });
//! ```

use serde::{Deserialize, Serialize};

use super::codec::{decode_batch, expect_mapping, opt_string, string_list};
use super::error::{ExtensionError, ExtensionResult};
use super::features::Features;
use super::settings::SettingItem;
use super::value::GuestValue;
use super::ExtensionId;

/// Identity of an initialized provider. Immutable once the provider is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionIdentity {
    pub id: ExtensionId,
    pub name: String,
    pub version: String,
    pub features: Features,
}

/// Manifest as declared by the guest.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionManifest {
    pub id: ExtensionId,
    pub title: String,
    pub version: String,
    /// Feature names exactly as declared, unknown ones included.
    pub declared_features: Vec<String>,
    pub features: Features,
    pub settings: Vec<SettingItem>,
}

impl ExtensionManifest {
    /// Parse and validate the argument of `setManifest`.
    ///
    /// `origin` names the program text in error messages.
    pub fn from_guest(value: &GuestValue, origin: &str) -> ExtensionResult<Self> {
        let invalid = |message: &str| ExtensionError::Configuration {
            origin: origin.to_string(),
            message: message.to_string(),
        };

        expect_mapping(value, "manifest").map_err(|e| invalid(&e.to_string()))?;

        let id = opt_string(value.get("id")).ok_or_else(|| invalid("manifest.id is required"))?;
        if id.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
            return Err(invalid(
                "manifest.id must not contain whitespace or path separators",
            ));
        }

        let version = opt_string(value.get("version"))
            .ok_or_else(|| invalid("manifest.version is required"))?;
        let title = opt_string(value.get("title")).unwrap_or_else(|| id.clone());

        let declared_features = string_list(value.get("features"));
        let features = Features::negotiate(&declared_features);

        Ok(Self {
            id,
            title,
            version,
            declared_features,
            features,
            settings: decode_batch(value.get("settings")),
        })
    }

    pub fn identity(&self) -> ExtensionIdentity {
        ExtensionIdentity {
            id: self.id.clone(),
            name: self.title.clone(),
            version: self.version.clone(),
            features: self.features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ExtensionResult<ExtensionManifest> {
        ExtensionManifest::from_guest(&GuestValue::from(value), "demo.js")
    }

    #[test]
    fn test_valid_manifest() {
        let manifest = parse(json!({
            "id": "demo",
            "version": "1.0",
            "features": ["media_search", "totally_unknown_flag"],
            "settings": [{"key": "nsfw", "type": "boolean"}, {"key": "bad"}]
        }))
        .unwrap();

        assert_eq!(manifest.title, "demo");
        assert_eq!(manifest.features, Features::SEARCH_MEDIA);
        assert_eq!(manifest.declared_features.len(), 2);
        assert_eq!(manifest.settings.len(), 1);

        let identity = manifest.identity();
        assert_eq!(identity.id, "demo");
        assert_eq!(identity.name, "demo");
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let err = parse(json!({"version": "1.0"})).unwrap_err();
        assert!(matches!(err, ExtensionError::Configuration { .. }));
        assert!(err.to_string().contains("manifest.id"));

        assert!(parse(json!({"id": "", "version": "1.0"})).is_err());
        assert!(parse(json!({"id": "a b", "version": "1.0"})).is_err());
    }

    #[test]
    fn test_missing_version_is_rejected() {
        let err = parse(json!({"id": "demo"})).unwrap_err();
        assert!(err.to_string().contains("manifest.version"));
    }

    #[test]
    fn test_non_mapping_is_rejected() {
        assert!(parse(json!("demo")).is_err());
        assert!(parse(json!(null)).is_err());
    }
}
