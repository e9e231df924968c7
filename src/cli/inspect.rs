//! `awery-bridge inspect`.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use crate::config::Config;
use crate::extensions::{Features, GuestMethod, Provider};

pub fn run_inspect(config: &Config, script: &Path) -> Result<()> {
    let manager = super::manager(config)?;
    let provider = manager
        .install_file(script)
        .with_context(|| format!("Failed to load {}", script.display()))?;

    print_provider(&provider);
    Ok(())
}

pub(crate) fn print_provider(provider: &Provider) {
    println!(
        "{} {} {}",
        style("✓").green().bold(),
        style(provider.name()).cyan().bold(),
        style(format!("v{}", provider.version())).dim()
    );
    println!("  {} {}", style("Id:").bold(), provider.id());

    let features = provider.features().to_names();
    println!(
        "  {} {}",
        style("Features:").bold(),
        if features.is_empty() {
            "none".to_string()
        } else {
            features.join(", ")
        }
    );

    let unknown: Vec<&str> = provider
        .declared_features()
        .iter()
        .map(String::as_str)
        .filter(|name| Features::from_manifest_name(name).is_none())
        .collect();
    if !unknown.is_empty() {
        println!(
            "  {} {}",
            style("Ignored:").yellow().bold(),
            unknown.join(", ")
        );
    }

    let functions: Vec<String> = GuestMethod::ALL
        .iter()
        .filter(|method| provider.implements(**method))
        .map(|method| method.function_name().to_string())
        .collect();
    println!(
        "  {} {}",
        style("Functions:").bold(),
        if functions.is_empty() {
            "none".to_string()
        } else {
            functions.join(", ")
        }
    );
}
