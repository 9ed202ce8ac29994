use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use symgraph::config::Config;
use symgraph::indexer::watcher::{run_blocking, FileWatcher};
use symgraph::indexer::{Pipeline, RunSummary};

use super::split_list;

pub async fn index_project(
    mut config: Config,
    languages: Option<String>,
    plugins: Option<String>,
    watch: bool,
    rebuild: bool,
) -> Result<()> {
    // CLI overrides config
    if let Some(languages) = languages {
        config.languages.enabled = split_list(&languages);
    }
    if let Some(plugins) = plugins {
        config.plugins.enabled = split_list(&plugins);
    }
    config.validate()?;

    let should_watch = watch || config.indexing.watch;
    let config = Arc::new(config);

    println!("symgraph indexer v{}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", config.project_root().display());
    println!("Languages: {}", config.get_enabled_languages().join(", "));
    println!("Plugins: {}", config.plugins.enabled.join(", "));
    println!("Database: {}", config.db_path().display());

    let pipeline = Pipeline::from_config(config.clone())?;
    if rebuild {
        info!("Rebuilding index from scratch");
        pipeline.store().rebuild()?;
    }

    // Covers the first run only; the watcher installs its own listener
    let cancel = pipeline.cancel_token();
    let listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")?);
    spinner.set_message("Indexing...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let (pipeline, summary) = run_blocking(pipeline).await?;
    listener.abort();
    spinner.finish_and_clear();
    let summary = summary?;

    print_summary(&summary);

    if summary.cancelled {
        println!("\nIndexing cancelled.");
        return Ok(());
    }

    if should_watch {
        println!("\nWatching for file changes. Press Ctrl+C to stop.");
        let watcher = FileWatcher::new(&pipeline);
        watcher.watch(pipeline).await?;
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\nIndexing complete in {} ms", summary.duration_ms);
    println!(
        "Files: {} seen, {} processed, {} unchanged, {} failed",
        summary.files_seen, summary.files_processed, summary.files_unchanged, summary.files_failed
    );
    println!("Directories: {}", summary.directories);
    println!(
        "Symbols: {} ({} external placeholders)",
        summary.symbols, summary.external_symbols
    );
    println!(
        "References: {} ({} unresolved, {} dropped)",
        summary.references, summary.unresolved_references, summary.dropped_references
    );

    if !summary.references_by_kind.is_empty() {
        println!("  References by kind:");
        for (kind, count) in &summary.references_by_kind {
            println!("    {}: {}", kind, count);
        }
    }

    if !summary.plugins.is_empty() {
        println!("  Plugins:");
        for (key, count) in &summary.plugins {
            println!("    {}: {}", key, count);
        }
    }
}
