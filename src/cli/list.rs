//! `awery-bridge list`.

use anyhow::Result;
use console::style;

use crate::config::Config;

pub fn run_list(config: &Config) -> Result<()> {
    let manager = super::manager(config)?;
    let failures = manager.load_directory()?;

    let providers = manager.get_all_extensions();
    if providers.is_empty() && failures.is_empty() {
        println!(
            "{} No extensions in {}",
            style("!").yellow().bold(),
            manager.config().extensions_dir.display()
        );
        return Ok(());
    }

    for provider in &providers {
        super::inspect::print_provider(provider);
    }
    for failure in &failures {
        println!(
            "{} {} {}",
            style("✗").red().bold(),
            style(failure.path.display()).dim(),
            failure.error
        );
    }
    Ok(())
}
