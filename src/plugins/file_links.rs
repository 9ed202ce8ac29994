// DEFINES edges from each file to the top-level symbols declared in it

use anyhow::Result;

use super::{FnPlugin, PluginContext};
use crate::index::{Reference, ReferenceKind, SymbolKind};

pub fn plugin() -> FnPlugin {
    FnPlugin {
        after_collect: Some(link_declarations),
        ..FnPlugin::new("file_links")
    }
}

fn link_declarations(ctx: &mut PluginContext<'_>) -> Result<()> {
    let mut added = 0;

    for file in ctx.store.find_by_kind(&SymbolKind::File)? {
        let path = &file.location.file;
        for symbol in ctx.store.get_in_file(path)? {
            let top_level = symbol.parent_id.is_none()
                && !matches!(symbol.kind, SymbolKind::File | SymbolKind::Directory | SymbolKind::Import);
            if !top_level {
                continue;
            }

            let reference = Reference {
                source_id: file.id.clone(),
                target_id: symbol.id.clone(),
                kind: ReferenceKind::Defines,
                file: path.clone(),
                line: symbol.location.line,
                column: symbol.location.column,
                context: None,
            };
            if ctx.store.add_reference(&reference)? {
                added += 1;
            }
        }
    }

    tracing::debug!("file_links: {} DEFINES edges", added);
    ctx.bump("defines_added", added);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::index::db::SymbolStore;
    use crate::index::{file_symbol_id, Location, Symbol};
    use crate::plugins::Plugin;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn test_links_only_top_level_symbols() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::open(dir.path().join("g.db")).unwrap();
        let file = Symbol::new(SymbolKind::File, "src/A.php", Location::new("src/A.php", 1, 1), "filesystem");
        let class = Symbol::new(SymbolKind::Class, "App\\A", Location::new("src/A.php", 3, 1), "php");
        let method = Symbol::new(SymbolKind::Method, "run", Location::new("src/A.php", 4, 5), "php")
            .with_parent(Some(class.id.clone()));
        let import = Symbol::new(SymbolKind::Import, "App\\B", Location::new("src/A.php", 2, 1), "php");
        for symbol in [&file, &class, &method, &import] {
            store.add_symbol(symbol).unwrap();
        }

        let config = Config::default();
        let mut stats = BTreeMap::new();
        let mut ctx = PluginContext {
            config: &config,
            root: Path::new("."),
            store: &store,
            modules: &[],
            stats: &mut stats,
        };
        plugin().after_collect(&mut ctx).unwrap();

        let defines = store
            .references_from(&file_symbol_id("src/A.php"), Some(&ReferenceKind::Defines))
            .unwrap();
        assert_eq!(defines.len(), 1);
        assert_eq!(defines[0].target_id, class.id);
        assert_eq!(stats.get("defines_added"), Some(&1));
    }
}
