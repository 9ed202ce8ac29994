use anyhow::Result;
use std::path::Path;

use symgraph::config::Config;

use super::{open_existing_store, OutputFormat};

pub fn show_stats(config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_existing_store(config)?;
    let stats = store.stats()?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("symgraph statistics v{}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", config.project.name);

    println!("\nIndex Statistics:");
    println!("  Total files: {}", stats.total_files);
    println!("  Total symbols: {}", stats.total_symbols);
    println!("  External placeholders: {}", stats.external_symbols);
    println!("  Total references: {}", stats.total_references);
    println!("  Index size: {:.2} MB", db_size_mb(store.path())?);

    if !stats.symbols_by_kind.is_empty() {
        println!("\n  Symbols by kind:");
        for (kind, count) in &stats.symbols_by_kind {
            println!("    {}: {}", kind, count);
        }
    }

    if !stats.references_by_kind.is_empty() {
        println!("\n  References by kind:");
        for (kind, count) in &stats.references_by_kind {
            println!("    {}: {}", kind, count);
        }
    }

    Ok(())
}

fn db_size_mb(db_path: &Path) -> Result<f64> {
    let metadata = std::fs::metadata(db_path)?;
    Ok(metadata.len() as f64 / (1024.0 * 1024.0))
}
