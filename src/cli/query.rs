use anyhow::Result;

use symgraph::config::Config;
use symgraph::query::{QueryEngine, QueryKind};

use super::{open_existing_store, OutputFormat};

pub fn query_index(config: &Config, kind: QueryKind, target: &str, format: OutputFormat) -> Result<()> {
    let store = open_existing_store(config)?;
    let engine = QueryEngine::new(store);

    let results = engine.run(kind, target)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Text => {
            if results.is_empty() {
                println!("No results found for {:?} of '{}'", kind, target);
                return Ok(());
            }

            println!("Found {} results:", results.len());
            for result in results {
                let edge = result.edge.map(|e| format!(" via {}", e)).unwrap_or_default();
                println!(
                    "  {}:{} - {} ({}){}",
                    result.file, result.line, result.name, result.kind, edge
                );
            }
        }
    }

    Ok(())
}
