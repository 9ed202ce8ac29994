use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use symgraph::config::Config;
use symgraph::index::{Reference, Symbol};

use super::open_existing_store;

/// JSON document handed to downstream graph loaders
#[derive(Serialize)]
struct ExportDocument<'a> {
    project: &'a str,
    /// Target the loader should write to, when configured
    uri: Option<&'a str>,
    symbols: Vec<Symbol>,
    references: Vec<Reference>,
}

pub fn export_graph(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let store = open_existing_store(config)?;
    let dump = store.dump()?;

    let export = config.export.as_ref();
    let document = ExportDocument {
        project: &config.project.name,
        uri: export.and_then(|e| e.uri.as_deref()),
        symbols: dump.symbols,
        references: dump.references,
    };
    let json = serde_json::to_string_pretty(&document)?;

    let output = output.or_else(|| export.and_then(|e| e.output.as_ref()).map(|p| config.project_root().join(p)));
    match output {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(
                "Exported {} symbols and {} references to {}",
                document.symbols.len(),
                document.references.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}
