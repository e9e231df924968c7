//! CLI commands for awery-bridge.
//!
//! Developer tooling for provider scripts: inspect, search, list, install,
//! uninstall.

pub mod inspect;
pub mod install;
pub mod list;
pub mod search;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::BridgeResult;
use crate::extensions::{ExtensionHostConfig, ExtensionManager};

#[derive(Parser)]
#[command(name = "awery-bridge")]
#[command(about = "Run and inspect script-defined content providers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. 'debug' or 'awery_bridge::guest=trace'
    #[arg(long, global = true, value_name = "FILTER")]
    pub log: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a provider and print its identity and capabilities
    Inspect {
        /// Path to the provider script
        script: PathBuf,
    },

    /// Run a media search against a provider
    Search {
        /// Path to the provider script
        script: PathBuf,

        /// Free-text query
        query: String,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load the extensions directory and list installed providers
    List,

    /// Validate a provider and copy it into the extensions directory
    Install {
        /// Path to the provider script
        script: PathBuf,
    },

    /// Remove an installed provider and its stored data
    Uninstall {
        /// Extension id
        id: String,
    },
}

/// Parse arguments and run the selected command.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    crate::logging::init(cli.log.as_deref().unwrap_or(&config.logging.filter));

    match cli.command {
        Commands::Inspect { script } => inspect::run_inspect(&config, &script),
        Commands::Search {
            script,
            query,
            json,
        } => search::run_search(&config, &script, &query, json),
        Commands::List => list::run_list(&config),
        Commands::Install { script } => install::run_install(&config, &script),
        Commands::Uninstall { id } => install::run_uninstall(&config, &id),
    }
}

/// Manager configured from `config`.
pub(crate) fn manager(config: &Config) -> BridgeResult<ExtensionManager> {
    let manager = ExtensionManager::new(ExtensionHostConfig::from_config(config))?;
    Ok(manager)
}
