// IndexFileTree phase: directory/file skeleton and CONTAINS edges

use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::index::db::{StoreResult, SymbolStore};
use crate::index::{Location, Reference, ReferenceKind, Symbol, SymbolKind};

/// Language recorded on skeleton symbols
pub const FILESYSTEM: &str = "filesystem";

/// Path of the project root directory symbol
pub const ROOT_DIR: &str = ".";

/// What the walk found
#[derive(Debug, Default)]
pub struct FileTree {
    /// Indexable files, relative and `/`-separated, in walk order
    pub files: Vec<String>,
    pub directories: usize,
    pub pruned: usize,
}

/// Walk the project, write the directory/file skeleton in one transaction
/// and drop skeleton entries whose paths no longer exist.
pub fn index_file_tree(
    store: &SymbolStore,
    root: &Path,
    config: &Config,
    module_extensions: &[&str],
) -> StoreResult<FileTree> {
    let extensions: HashSet<&str> = module_extensions
        .iter()
        .copied()
        .chain(config.indexing.extensions.iter().map(|e| e.trim_start_matches('.')))
        .collect();

    let mut tree = FileTree::default();
    let mut seen: HashSet<String> = HashSet::new();

    store.transaction(|store| -> StoreResult<()> {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                relative_path(root, entry.path()).is_some_and(|rel| config.should_enter_dir(&rel))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let rel = if entry.depth() == 0 {
                ROOT_DIR.to_string()
            } else {
                match relative_path(root, entry.path()) {
                    Some(rel) => rel,
                    None => continue,
                }
            };

            if entry.file_type().is_dir() {
                let symbol = skeleton_symbol(SymbolKind::Directory, &rel);
                store.add_symbol(&symbol)?;
                if entry.depth() > 0 {
                    link_to_parent(store, &rel, &symbol.id)?;
                }
                tree.directories += 1;
                seen.insert(rel);
            } else if entry.file_type().is_file() {
                let has_extension = Path::new(&rel)
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| extensions.contains(ext));
                if !has_extension || !config.should_index_file(&rel) {
                    continue;
                }

                let symbol = skeleton_symbol(SymbolKind::File, &rel);
                store.add_symbol(&symbol)?;
                link_to_parent(store, &rel, &symbol.id)?;
                tree.files.push(rel.clone());
                seen.insert(rel);
            }
        }

        for path in store.skeleton_paths()? {
            if !seen.contains(&path) {
                debug!("Pruning vanished path: {}", path);
                store.remove_file(&path)?;
                tree.pruned += 1;
            }
        }

        Ok(())
    })?;

    info!(
        "File tree: {} files, {} directories, {} pruned",
        tree.files.len(),
        tree.directories,
        tree.pruned
    );

    Ok(tree)
}

/// `/`-separated path of `path` below `root`
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Directory containing `rel`, `.` at the top level
pub fn parent_dir(rel: &str) -> &str {
    match rel.rfind('/') {
        Some(idx) => &rel[..idx],
        None => ROOT_DIR,
    }
}

fn skeleton_symbol(kind: SymbolKind, rel: &str) -> Symbol {
    Symbol::new(kind, rel, Location::new(rel, 1, 1), FILESYSTEM)
}

fn link_to_parent(store: &SymbolStore, rel: &str, child_id: &str) -> StoreResult<()> {
    let parent = parent_dir(rel);
    store.add_reference(&Reference {
        source_id: crate::index::directory_symbol_id(parent),
        target_id: child_id.to_string(),
        kind: ReferenceKind::Contains,
        file: parent.to_string(),
        line: 1,
        column: 1,
        context: None,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{directory_symbol_id, file_symbol_id};
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "<?php\n").unwrap();
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("a.php"), ".");
        assert_eq!(parent_dir("src/a.php"), "src");
        assert_eq!(parent_dir("src/Http/a.php"), "src/Http");
    }

    #[test]
    fn test_skeleton_and_contains_edges() {
        let project = tempdir().unwrap();
        write(project.path(), "src/Http/Kernel.php");
        write(project.path(), "src/notes.txt");
        write(project.path(), "vendor/lib/Lib.php");
        let db = tempdir().unwrap();
        let store = SymbolStore::open(db.path().join("g.db")).unwrap();

        let tree = index_file_tree(&store, project.path(), &Config::default(), &["php"]).unwrap();

        assert_eq!(tree.files, vec!["src/Http/Kernel.php".to_string()]);
        // ".", "src", "src/Http"; vendor is excluded
        assert_eq!(tree.directories, 3);

        let root_children = store.references_from(&directory_symbol_id("."), Some(&ReferenceKind::Contains)).unwrap();
        assert_eq!(root_children.len(), 1);
        assert_eq!(root_children[0].target_id, directory_symbol_id("src"));

        let http = store.references_from(&directory_symbol_id("src/Http"), None).unwrap();
        assert_eq!(http.len(), 1);
        assert_eq!(http[0].target_id, file_symbol_id("src/Http/Kernel.php"));
    }

    #[test]
    fn test_skeleton_locations_are_one_based() {
        let project = tempdir().unwrap();
        write(project.path(), "src/Kernel.php");
        let db = tempdir().unwrap();
        let store = SymbolStore::open(db.path().join("g.db")).unwrap();

        index_file_tree(&store, project.path(), &Config::default(), &["php"]).unwrap();

        let file = store.get_by_id(&file_symbol_id("src/Kernel.php")).unwrap().unwrap();
        assert_eq!((file.location.line, file.location.column), (1, 1));
        let dir = store.get_by_id(&directory_symbol_id("src")).unwrap().unwrap();
        assert_eq!((dir.location.line, dir.location.column), (1, 1));

        let edges = store.references_from(&directory_symbol_id("src"), Some(&ReferenceKind::Contains)).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].line, edges[0].column), (1, 1));
    }

    #[test]
    fn test_rewalk_is_idempotent_and_prunes() {
        let project = tempdir().unwrap();
        write(project.path(), "a.php");
        write(project.path(), "lib/b.php");
        let db = tempdir().unwrap();
        let store = SymbolStore::open(db.path().join("g.db")).unwrap();
        let config = Config::default();

        index_file_tree(&store, project.path(), &config, &["php"]).unwrap();
        let before = store.stats().unwrap();
        let again = index_file_tree(&store, project.path(), &config, &["php"]).unwrap();
        assert_eq!(again.pruned, 0);
        assert_eq!(store.stats().unwrap().total_references, before.total_references);

        std::fs::remove_dir_all(project.path().join("lib")).unwrap();
        let pruned = index_file_tree(&store, project.path(), &config, &["php"]).unwrap();

        assert_eq!(pruned.pruned, 2);
        assert!(store.get_by_id(&file_symbol_id("lib/b.php")).unwrap().is_none());
        assert!(store.get_by_id(&directory_symbol_id("lib")).unwrap().is_none());
        assert!(store.get_by_id(&file_symbol_id("a.php")).unwrap().is_some());
    }

    #[test]
    fn test_configured_extensions_join_allow_list() {
        let project = tempdir().unwrap();
        write(project.path(), "templates/page.twig");
        let db = tempdir().unwrap();
        let store = SymbolStore::open(db.path().join("g.db")).unwrap();
        let mut config = Config::default();
        config.indexing.extensions = vec![".twig".to_string()];

        let tree = index_file_tree(&store, project.path(), &config, &[]).unwrap();

        assert_eq!(tree.files, vec!["templates/page.twig".to_string()]);
    }
}
