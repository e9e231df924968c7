//! `awery-bridge search`.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use crate::config::Config;
use crate::models::CatalogFilter;

pub fn run_search(config: &Config, script: &Path, query: &str, json: bool) -> Result<()> {
    let manager = super::manager(config)?;
    let provider = manager
        .install_file(script)
        .with_context(|| format!("Failed to load {}", script.display()))?;

    let filters = [CatalogFilter::query(query), CatalogFilter::page(0)];
    let results = match provider.search_media(&filters).wait() {
        Ok(results) => results,
        Err(e) if e.is_zero_results() => {
            if json {
                println!("[]");
            } else {
                println!("{} {}", style("!").yellow().bold(), e);
            }
            return Ok(());
        }
        Err(e) => return Err(e).context("Search failed"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&results.items)?);
        return Ok(());
    }

    for media in &results.items {
        let title = media.title().unwrap_or("(untitled)");
        println!(
            "{} {} {}",
            style("•").cyan(),
            style(title).bold(),
            style(media.id.as_deref().unwrap_or("")).dim()
        );
    }
    if results.has_next_page {
        println!("{}", style("More results available").dim());
    }
    Ok(())
}
