// CLI command implementations

pub mod export;
pub mod index;
pub mod languages;
pub mod query;
pub mod stats;

use anyhow::{Context, Result};
use std::sync::Arc;

use symgraph::config::Config;
use symgraph::index::db::SymbolStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Open an existing index read-side; a missing database is an error
/// rather than an empty store.
pub fn open_existing_store(config: &Config) -> Result<Arc<SymbolStore>> {
    let db_path = config.db_path();
    if !db_path.exists() {
        anyhow::bail!(
            "No index found at {}. Run `symgraph index` first.",
            db_path.display()
        );
    }

    let store = SymbolStore::open_with_pool_size(&db_path, config.storage.pool_size)
        .with_context(|| format!("Failed to open index at {}", db_path.display()))?;
    Ok(Arc::new(store))
}

pub(crate) fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
