// Pipeline orchestration: file tree, collect, resolve, plugin hooks

pub mod file_tree;
pub mod watcher;

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::index::{content_hash, Symbol};
use crate::index::db::SymbolStore;
use crate::languages;
use crate::plugins::{self, Hook, Plugin, PluginContext};
use crate::resolver::{Resolver, ResolverStats};

/// Counters a module reports after a run
pub type ModuleStats = BTreeMap<String, usize>;

/// Contract every source-language front end honours.
///
/// `collect` may only write symbols for the files it processes and must not
/// assume any other module has run. `resolve` runs after every module has
/// collected and may look up anything in the store.
pub trait LanguageModule: Send {
    fn name(&self) -> &str;

    /// File extensions (without the dot) this module analyses
    fn extensions(&self) -> &[&'static str];

    fn collect(&mut self, ctx: &PhaseContext<'_>) -> Result<()>;

    fn resolve(&mut self, ctx: &PhaseContext<'_>) -> Result<()>;

    fn stats(&self) -> ModuleStats;
}

/// Cooperative cancellation, checked between files. Once set it stays set:
/// a cancelled pipeline does no further work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pipeline phases, strictly sequential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Init,
    IndexFileTree,
    BeforeCollectHooks,
    Collect,
    AfterCollectHooks,
    Resolve,
    AfterResolveHooks,
    Done,
}

/// Run-scoped state handed to language modules
pub struct PhaseContext<'a> {
    /// Indexable files, relative to the project root, `/`-separated
    pub files: &'a [String],
    pub resolver: &'a Resolver,
    pub cancel: &'a CancelToken,
}

impl PhaseContext<'_> {
    pub fn files_with<'s>(&'s self, extensions: &'s [&'static str]) -> impl Iterator<Item = &'s String> + 's {
        self.files.iter().filter(move |path| {
            Path::new(path.as_str())
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(&ext))
        })
    }
}

/// What happened to one file in one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed(usize),
    Unchanged,
    Resolved,
    Failed,
    Cancelled,
}

/// Per-module file bookkeeping
#[derive(Debug, Clone, Default)]
pub struct FileCounters {
    pub indexed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub resolved: usize,
    pub resolve_failed: usize,
    pub symbols: usize,
    /// Committed symbols per kind
    pub kinds: BTreeMap<String, usize>,
}

impl FileCounters {
    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Indexed(symbols) => {
                self.indexed += 1;
                self.symbols += symbols;
            }
            FileOutcome::Unchanged => self.unchanged += 1,
            FileOutcome::Resolved => self.resolved += 1,
            FileOutcome::Failed | FileOutcome::Cancelled => {}
        }
    }

    pub fn write_into(&self, stats: &mut ModuleStats) {
        stats.insert("files_indexed".to_string(), self.indexed);
        stats.insert("files_unchanged".to_string(), self.unchanged);
        stats.insert("files_failed".to_string(), self.failed);
        stats.insert("files_resolved".to_string(), self.resolved);
        stats.insert("files_resolve_failed".to_string(), self.resolve_failed);
        stats.insert("symbols".to_string(), self.symbols);
        for (kind, n) in &self.kinds {
            stats.insert(format!("symbols_{}", kind), *n);
        }
    }
}

/// Fold per-file counts into a module's running totals.
pub fn add_counts<K: Into<String>>(totals: &mut ModuleStats, counts: BTreeMap<K, usize>) {
    for (key, n) in counts {
        *totals.entry(key.into()).or_insert(0) += n;
    }
}

/// Runs one file's collect or resolve work inside its own transaction.
pub struct FileDriver<'a> {
    store: &'a SymbolStore,
    root: &'a Path,
    cancel: &'a CancelToken,
    language: &'a str,
}

impl<'a> FileDriver<'a> {
    pub fn new(store: &'a SymbolStore, root: &'a Path, cancel: &'a CancelToken, language: &'a str) -> Self {
        Self {
            store,
            root,
            cancel,
            language,
        }
    }

    /// Collect pass for one file: skipped when its hash is unchanged,
    /// otherwise clear + extract + store + record hash atomically. `extract`
    /// returns the file's symbols; per-kind counts only include committed
    /// files.
    pub fn collect<F>(&self, path: &str, counters: &mut FileCounters, extract: F) -> FileOutcome
    where
        F: FnOnce(&SymbolStore, &str) -> Result<Vec<Symbol>>,
    {
        if self.cancel.is_cancelled() {
            return FileOutcome::Cancelled;
        }

        let bytes = match std::fs::read(self.root.join(path)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read {}: {}", path, e);
                counters.failed += 1;
                return FileOutcome::Failed;
            }
        };
        let hash = content_hash(&bytes);

        match self.store.needs_reparse(path, &hash) {
            Ok(false) => {
                debug!("Unchanged, skipping: {}", path);
                counters.record(FileOutcome::Unchanged);
                return FileOutcome::Unchanged;
            }
            Ok(true) => {}
            Err(e) => {
                warn!("Failed to check hash for {}: {}", path, e);
                counters.failed += 1;
                return FileOutcome::Failed;
            }
        }

        let source = String::from_utf8_lossy(&bytes);
        let result = (|| -> Result<Option<Vec<Symbol>>> {
            let tx = self.store.begin()?;
            self.store.clear_file(path)?;
            let symbols = extract(self.store, &source)?;
            for symbol in &symbols {
                self.store.add_symbol(symbol)?;
            }
            if self.cancel.is_cancelled() {
                tx.rollback()?;
                return Ok(None);
            }
            self.store.record_file_hash(path, self.language, &hash, symbols.len())?;
            tx.commit()?;
            Ok(Some(symbols))
        })();

        let outcome = match result {
            Ok(Some(symbols)) => {
                debug!("Collected {} symbols from {}", symbols.len(), path);
                for symbol in &symbols {
                    *counters.kinds.entry(symbol.kind.to_string()).or_insert(0) += 1;
                }
                FileOutcome::Indexed(symbols.len())
            }
            Ok(None) => {
                info!("Cancelled while collecting {}, rolled back", path);
                FileOutcome::Cancelled
            }
            Err(e) => {
                warn!("Failed to collect {}: {:#}", path, e);
                counters.failed += 1;
                FileOutcome::Failed
            }
        };
        counters.record(outcome);
        outcome
    }

    /// Resolve pass for one file, in its own transaction. The references the
    /// file produced last run are dropped first, so the pass rewires from a
    /// clean slate.
    pub fn resolve<F>(&self, path: &str, counters: &mut FileCounters, wire: F) -> FileOutcome
    where
        F: FnOnce(&SymbolStore, &str) -> Result<()>,
    {
        if self.cancel.is_cancelled() {
            return FileOutcome::Cancelled;
        }

        let source = match std::fs::read(self.root.join(path)) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!("Failed to read {}: {}", path, e);
                counters.resolve_failed += 1;
                return FileOutcome::Failed;
            }
        };

        let result = (|| -> Result<bool> {
            let tx = self.store.begin()?;
            self.store.clear_file_references(path)?;
            wire(self.store, &source)?;
            if self.cancel.is_cancelled() {
                tx.rollback()?;
                return Ok(false);
            }
            tx.commit()?;
            Ok(true)
        })();

        let outcome = match result {
            Ok(true) => FileOutcome::Resolved,
            Ok(false) => {
                info!("Cancelled while resolving {}, rolled back", path);
                FileOutcome::Cancelled
            }
            Err(e) => {
                warn!("Failed to resolve {}: {:#}", path, e);
                counters.resolve_failed += 1;
                FileOutcome::Failed
            }
        };
        counters.record(outcome);
        outcome
    }
}

/// Aggregated result of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub files_seen: usize,
    pub directories: usize,
    pub files_processed: usize,
    pub files_unchanged: usize,
    pub files_failed: usize,
    pub symbols: usize,
    pub references: usize,
    pub external_symbols: usize,
    pub unresolved_references: usize,
    pub dropped_references: usize,
    pub symbols_by_kind: BTreeMap<String, usize>,
    pub references_by_kind: BTreeMap<String, usize>,
    pub modules: BTreeMap<String, ModuleStats>,
    pub plugins: BTreeMap<String, usize>,
    pub resolver: ResolverStats,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Drives one indexing run over a project
pub struct Pipeline {
    config: Arc<Config>,
    root: PathBuf,
    store: Arc<SymbolStore>,
    modules: Vec<Box<dyn LanguageModule>>,
    plugins: Vec<Box<dyn Plugin>>,
    cancel: CancelToken,
    phase: Phase,
}

impl Pipeline {
    /// Pipeline with no modules or plugins registered.
    pub fn new(config: Arc<Config>, store: Arc<SymbolStore>) -> Result<Self> {
        let root = config.project_root();
        if !root.is_dir() {
            anyhow::bail!("Project root does not exist: {}", root.display());
        }

        Ok(Self {
            config,
            root,
            store,
            modules: Vec::new(),
            plugins: Vec::new(),
            cancel: CancelToken::new(),
            phase: Phase::Init,
        })
    }

    /// Open the configured store and register the enabled languages and
    /// plugins.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let db_path = config.db_path();
        let store = SymbolStore::open_with_pool_size(&db_path, config.storage.pool_size)
            .with_context(|| format!("Failed to open symbol store at {}", db_path.display()))?;

        let mut pipeline = Self::new(config.clone(), Arc::new(store))?;

        for language in config.get_enabled_languages() {
            match languages::create_module(&language, pipeline.store.clone(), pipeline.root.clone()) {
                Some(module) => pipeline.register_module(module),
                None => warn!("No language module named '{}'", language),
            }
        }

        for name in &config.plugins.enabled {
            match plugins::create_plugin(name) {
                Some(plugin) => pipeline.register_plugin(plugin),
                None => warn!("No plugin named '{}'", name),
            }
        }

        Ok(pipeline)
    }

    pub fn register_module(&mut self, module: Box<dyn LanguageModule>) {
        info!("Registered language module: {}", module.name());
        self.modules.push(module);
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) {
        info!("Registered plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn store(&self) -> &Arc<SymbolStore> {
        &self.store
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// File extensions claimed by the registered modules
    pub fn extensions(&self) -> Vec<&'static str> {
        self.modules
            .iter()
            .flat_map(|m| m.extensions().iter().copied())
            .collect()
    }

    fn enter(&mut self, phase: Phase) {
        debug!("Phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Execute every phase once. Only fatal errors (missing root, store
    /// failures outside a file's transaction) are returned; per-file
    /// failures are logged, rolled back and counted.
    pub fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        self.enter(Phase::Init);

        if !self.root.is_dir() {
            anyhow::bail!("Project root does not exist: {}", self.root.display());
        }

        info!("Indexing {} ({} modules, {} plugins)", self.root.display(), self.modules.len(), self.plugins.len());

        // Fresh per run: the resolution cache never outlives the run.
        let resolver = Resolver::new(self.store.clone(), self.config.resolution.namespace_roots.clone());
        let cancel = self.cancel.clone();
        let mut plugin_stats = BTreeMap::new();
        let mut summary = RunSummary::default();

        self.enter(Phase::IndexFileTree);
        let extensions = self.extensions();
        let tree = file_tree::index_file_tree(&self.store, &self.root, &self.config, &extensions)
            .context("Failed to index file tree")?;
        summary.files_seen = tree.files.len();
        summary.directories = tree.directories;

        let ctx = PhaseContext {
            files: &tree.files,
            resolver: &resolver,
            cancel: &cancel,
        };

        self.enter(Phase::BeforeCollectHooks);
        self.run_hooks(Hook::BeforeCollect, &mut plugin_stats);

        self.enter(Phase::Collect);
        for module in self.modules.iter_mut() {
            if cancel.is_cancelled() {
                break;
            }
            info!("Collecting: {}", module.name());
            if let Err(e) = module.collect(&ctx) {
                error!("Module {} failed during collect: {:#}", module.name(), e);
            }
        }

        // Barrier: nothing resolves until every module has collected.
        if !cancel.is_cancelled() {
            self.enter(Phase::AfterCollectHooks);
            self.run_hooks(Hook::AfterCollect, &mut plugin_stats);
        }

        if !cancel.is_cancelled() {
            self.enter(Phase::Resolve);
            for module in self.modules.iter_mut() {
                if cancel.is_cancelled() {
                    break;
                }
                info!("Resolving: {}", module.name());
                if let Err(e) = module.resolve(&ctx) {
                    error!("Module {} failed during resolve: {:#}", module.name(), e);
                }
            }
        }

        if !cancel.is_cancelled() {
            let pruned = self.store.prune_placeholders().context("Failed to prune placeholders")?;
            if pruned > 0 {
                debug!("Pruned {} unreferenced placeholders", pruned);
            }
        }

        if !cancel.is_cancelled() {
            self.enter(Phase::AfterResolveHooks);
            self.run_hooks(Hook::AfterResolve, &mut plugin_stats);
        }

        self.enter(Phase::Done);

        for module in &self.modules {
            let stats = module.stats();
            summary.files_processed += stats.get("files_indexed").copied().unwrap_or(0);
            summary.files_unchanged += stats.get("files_unchanged").copied().unwrap_or(0);
            summary.files_failed += stats.get("files_failed").copied().unwrap_or(0)
                + stats.get("files_resolve_failed").copied().unwrap_or(0);
            summary.modules.insert(module.name().to_string(), stats);
        }

        let store_stats = self.store.stats().context("Failed to read store statistics")?;
        let resolver_stats = resolver.stats();
        summary.symbols = store_stats.total_symbols;
        summary.references = store_stats.total_references;
        summary.external_symbols = store_stats.external_symbols;
        summary.symbols_by_kind = store_stats.symbols_by_kind;
        summary.references_by_kind = store_stats.references_by_kind;
        summary.unresolved_references = resolver_stats.unresolved;
        summary.dropped_references = resolver_stats.dropped_structural;
        summary.resolver = resolver_stats;
        summary.plugins = plugin_stats;
        summary.cancelled = cancel.is_cancelled();
        summary.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "Run finished: {} processed, {} unchanged, {} failed, {} symbols, {} references, {} unresolved",
            summary.files_processed,
            summary.files_unchanged,
            summary.files_failed,
            summary.symbols,
            summary.references,
            summary.unresolved_references
        );

        Ok(summary)
    }

    /// Run one hook on every plugin, in registration order. Each hook's
    /// writes are one transaction; a failing hook is rolled back and logged.
    fn run_hooks(&mut self, hook: Hook, stats: &mut BTreeMap<String, usize>) {
        for plugin in self.plugins.iter_mut() {
            let mut pctx = PluginContext {
                config: &self.config,
                root: &self.root,
                store: &self.store,
                modules: &self.modules,
                stats: &mut *stats,
            };

            let result: Result<()> = self
                .store
                .transaction(|_| plugins::dispatch(plugin.as_mut(), hook, &mut pctx));

            if let Err(e) = result {
                error!("Plugin {} failed in {:?}: {:#}", plugin.name(), hook, e);
                *stats.entry("plugin_errors".to_string()).or_insert(0) += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Location, ReferenceKind, Symbol, SymbolKind};
    use tempfile::{tempdir, TempDir};

    /// Minimal line-based module: `class Name` declares, `extends Name` on
    /// the same line references. A line reading `boom` fails the file and a
    /// line reading `halt` cancels the run, both after earlier symbols were
    /// written. Resolving a class named `Halt` cancels after its edges.
    struct LineModule {
        store: Arc<SymbolStore>,
        root: PathBuf,
        counters: FileCounters,
    }

    impl LineModule {
        fn new(store: Arc<SymbolStore>, root: PathBuf) -> Self {
            Self {
                store,
                root,
                counters: FileCounters::default(),
            }
        }
    }

    impl LanguageModule for LineModule {
        fn name(&self) -> &str {
            "lines"
        }

        fn extensions(&self) -> &[&'static str] {
            &["cls"]
        }

        fn collect(&mut self, ctx: &PhaseContext<'_>) -> Result<()> {
            let driver = FileDriver::new(&self.store, &self.root, ctx.cancel, "lines");
            for path in ctx.files_with(&["cls"]) {
                driver.collect(path, &mut self.counters, |store, source| {
                    let mut symbols = Vec::new();
                    for (i, line) in source.lines().enumerate() {
                        match line.trim() {
                            "boom" => anyhow::bail!("parse error in {}", path),
                            "halt" => ctx.cancel.cancel(),
                            _ => {}
                        }
                        if let Some(rest) = line.strip_prefix("class ") {
                            let name = rest.split_whitespace().next().unwrap_or_default();
                            let mut symbol = Symbol::new(
                                SymbolKind::Class,
                                name,
                                Location::new(path.as_str(), i as u32 + 1, 1),
                                "lines",
                            );
                            symbol.extends = rest
                                .split_once(" extends ")
                                .map(|(_, base)| vec![base.trim().to_string()])
                                .unwrap_or_default();
                            store.add_symbol(&symbol)?;
                            symbols.push(symbol);
                        }
                    }
                    Ok(symbols)
                });
            }
            Ok(())
        }

        fn resolve(&mut self, ctx: &PhaseContext<'_>) -> Result<()> {
            let driver = FileDriver::new(&self.store, &self.root, ctx.cancel, "lines");
            for path in ctx.files_with(&["cls"]) {
                driver.resolve(path, &mut self.counters, |store, _source| {
                    for class in store.get_in_file(path)? {
                        for base in &class.extends {
                            ctx.resolver.link_name(
                                crate::resolver::Source { id: &class.id, kind: &class.kind },
                                base,
                                ReferenceKind::Extends,
                                &Default::default(),
                                &crate::resolver::Site {
                                    file: path.clone(),
                                    line: class.location.line,
                                    column: 1,
                                    context: None,
                                },
                                Some(SymbolKind::Class),
                            )?;
                        }
                        if class.name == "Halt" {
                            ctx.cancel.cancel();
                        }
                    }
                    Ok(())
                });
            }
            Ok(())
        }

        fn stats(&self) -> ModuleStats {
            let mut stats = ModuleStats::new();
            self.counters.write_into(&mut stats);
            stats
        }
    }

    fn project(files: &[(&str, &str)]) -> (TempDir, Arc<Config>) {
        let dir = tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        let mut config = Config::default();
        config.project.root = dir.path().to_string_lossy().to_string();
        config.languages.enabled = vec![];
        config.plugins.enabled = vec![];
        (dir, Arc::new(config))
    }

    fn pipeline(config: &Arc<Config>) -> Pipeline {
        let store = Arc::new(SymbolStore::open(config.db_path()).unwrap());
        let mut pipeline = Pipeline::new(config.clone(), store.clone()).unwrap();
        pipeline.register_module(Box::new(LineModule::new(store, config.project_root())));
        pipeline
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let mut config = Config::default();
        config.project.root = "/definitely/not/here".to_string();
        let dir = tempdir().unwrap();
        let store = Arc::new(SymbolStore::open(dir.path().join("g.db")).unwrap());

        assert!(Pipeline::new(Arc::new(config), store).is_err());
    }

    #[test]
    fn test_full_run_collects_and_resolves() {
        let (_dir, config) = project(&[
            ("src/base.cls", "class Base\n"),
            ("src/child.cls", "class Child extends Base\n"),
            ("README.md", "not indexed\n"),
        ]);
        let mut pipeline = pipeline(&config);

        let summary = pipeline.run().unwrap();

        assert_eq!(pipeline.phase(), Phase::Done);
        assert_eq!(summary.files_seen, 2);
        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.symbols_by_kind.get("class"), Some(&2));
        assert_eq!(summary.references_by_kind.get("EXTENDS"), Some(&1));
        // Root directory plus src/
        assert_eq!(summary.directories, 2);
        assert!(!summary.cancelled);
    }

    #[test]
    fn test_second_run_skips_unchanged_files() {
        let (_dir, config) = project(&[
            ("base.cls", "class Base\n"),
            ("child.cls", "class Child extends Base\n"),
        ]);

        let first = pipeline(&config).run().unwrap();
        let second = pipeline(&config).run().unwrap();

        assert_eq!(first.files_processed, 2);
        assert_eq!(second.files_processed, 0);
        assert_eq!(second.files_unchanged, 2);
        assert_eq!(first.symbols, second.symbols);
        assert_eq!(first.references, second.references);
    }

    #[test]
    fn test_failed_file_is_rolled_back_and_run_continues() {
        let (dir, config) = project(&[
            ("good.cls", "class Good\n"),
            ("bad.cls", "class Partial\n"),
        ]);
        let first = pipeline(&config).run().unwrap();
        assert_eq!(first.files_failed, 0);

        std::fs::write(dir.path().join("bad.cls"), "class Fresh\nboom\n").unwrap();
        let mut second = pipeline(&config);
        let summary = second.run().unwrap();

        assert_eq!(summary.files_failed, 1);
        let store = second.store();
        let names: Vec<String> = store.get_in_file("bad.cls").unwrap().into_iter().map(|s| s.name).collect();
        // Old symbols survive, nothing from the failed attempt leaked in.
        assert!(names.contains(&"Partial".to_string()));
        assert!(!names.contains(&"Fresh".to_string()));
        assert!(store.needs_reparse("bad.cls", &content_hash(b"class Fresh\nboom\n")).unwrap());
        assert!(!store.get_in_file("good.cls").unwrap().is_empty());
        // Rolled-back symbols are not counted
        assert_eq!(summary.modules["lines"].get("symbols_class"), None);
    }

    #[test]
    fn test_cancel_mid_collect_rolls_back_the_file() {
        let (dir, config) = project(&[("a.cls", "class Old\n")]);
        pipeline(&config).run().unwrap();

        std::fs::write(dir.path().join("a.cls"), "class Fresh\nhalt\n").unwrap();
        let mut second = pipeline(&config);
        let summary = second.run().unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.files_processed, 0);
        assert_eq!(summary.modules["lines"].get("symbols_class"), None);
        let store = second.store();
        let names: Vec<String> = store.get_in_file("a.cls").unwrap().into_iter().map(|s| s.name).collect();
        assert!(names.contains(&"Old".to_string()));
        assert!(!names.contains(&"Fresh".to_string()));
        assert!(store.needs_reparse("a.cls", &content_hash(b"class Fresh\nhalt\n")).unwrap());
    }

    #[test]
    fn test_cancel_mid_resolve_rolls_back_the_file() {
        let (_dir, config) = project(&[
            ("a.cls", "class Base\n"),
            ("b.cls", "class Halt extends Base\n"),
        ]);
        let mut pipeline = pipeline(&config);

        let summary = pipeline.run().unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.references_by_kind.get("EXTENDS"), None);
        let halt = pipeline
            .store()
            .get_in_file("b.cls")
            .unwrap()
            .into_iter()
            .find(|s| s.name == "Halt")
            .unwrap();
        assert!(pipeline.store().references_from(&halt.id, None).unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_run_stops_before_resolve() {
        let (_dir, config) = project(&[("a.cls", "class A\n")]);
        let mut pipeline = pipeline(&config);
        pipeline.cancel_token().cancel();

        let summary = pipeline.run().unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.files_processed, 0);
        assert_eq!(summary.symbols_by_kind.get("class"), None);
    }

    #[test]
    fn test_removed_files_are_pruned() {
        let (dir, config) = project(&[("a.cls", "class A\n"), ("b.cls", "class B\n")]);
        pipeline(&config).run().unwrap();

        std::fs::remove_file(dir.path().join("b.cls")).unwrap();
        let mut second = pipeline(&config);
        let summary = second.run().unwrap();

        assert_eq!(summary.files_seen, 1);
        assert!(second.store().get_in_file("b.cls").unwrap().is_empty());
        assert_eq!(summary.symbols_by_kind.get("class"), Some(&1));
    }
}
