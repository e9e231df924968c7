//! `awery-bridge install` and `awery-bridge uninstall`.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use console::style;

use crate::config::Config;

/// Load `script` to validate it, then copy it to `<extensions_dir>/<id>.js`.
pub fn run_install(config: &Config, script: &Path) -> Result<()> {
    let manager = super::manager(config)?;
    let provider = manager
        .install_file(script)
        .with_context(|| format!("Not a valid extension: {}", script.display()))?;
    println!(
        "{} {}",
        style("✓").green().bold(),
        style("Validated extension").cyan()
    );

    let dest_dir = config.extensions_dir();
    fs::create_dir_all(&dest_dir)
        .with_context(|| format!("Failed to create {}", dest_dir.display()))?;

    let dest = dest_dir.join(format!("{}.js", provider.id()));
    if dest.exists() {
        println!(
            "{} Replacing existing {}",
            style("!").yellow().bold(),
            style(dest.display()).dim()
        );
    }
    fs::copy(script, &dest).with_context(|| format!("Failed to copy to {}", dest.display()))?;

    println!(
        "{} {} {}",
        style("✓").green().bold(),
        style("Installed to").cyan(),
        style(dest.display()).dim()
    );
    println!();
    super::inspect::print_provider(&provider);
    Ok(())
}

/// Remove `<extensions_dir>/<id>.js` and the extension's stored data.
pub fn run_uninstall(config: &Config, id: &str) -> Result<()> {
    if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
        bail!("Invalid extension id: {}", id);
    }

    let script = config.extensions_dir().join(format!("{}.js", id));
    if !script.exists() {
        bail!("Extension '{}' is not installed", id);
    }
    fs::remove_file(&script).with_context(|| format!("Failed to remove {}", script.display()))?;

    let data = config.data_dir().join(id);
    if data.exists() {
        fs::remove_dir_all(&data).with_context(|| format!("Failed to remove {}", data.display()))?;
    }

    println!(
        "{} {} {}",
        style("✓").green().bold(),
        style("Uninstalled").cyan(),
        style(id).bold()
    );
    Ok(())
}
