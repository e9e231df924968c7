//! Tracing setup for hosts and the CLI.

use std::sync::OnceLock;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install a global subscriber. `RUST_LOG` overrides `filter`.
///
/// Calling this again, or after another subscriber was installed, does
/// nothing.
pub fn init(filter: &str) {
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init();
    });
}
