//! awery-bridge - runtime for script-defined content providers.
//!
//! Providers are JavaScript program texts that expose a catalog (media
//! search, episodes, videos, comments, tracking and account login) through
//! well-known functions. This crate loads them into isolated engine
//! instances, negotiates their declared features, and turns every guest
//! callback into a typed, cancellable [`PendingCall`](extensions::PendingCall).
//!
//! # Architecture
//!
//! - [`config`] - Configuration loading and management
//! - [`extensions`] - Extension manager, provider instances and the guest bridge
//! - [`models`] - Domain records exchanged with providers
//! - [`logging`] - `tracing` subscriber setup
//! - [`cli`] - Developer command-line tooling
//!
//! # Example
//!
//! ```ignore
//! use awery_bridge::extensions::{ExtensionHostConfig, ExtensionManager};
//! use awery_bridge::models::CatalogFilter;
//!
//! let manager = ExtensionManager::new(ExtensionHostConfig::default())?;
//! let provider = manager.install_file("anilist.js".as_ref())?;
//! let results = provider.search_media(&[CatalogFilter::query("frieren")]).wait()?;
//! ```

pub mod cli;
pub mod config;
pub mod extensions;
pub mod logging;
pub mod models;

mod error;

pub use config::Config;
pub use error::{BridgeError, BridgeResult};
pub use extensions::{ExtensionError, ExtensionManager, ExtensionResult, PendingCall, Provider};
