// Name resolution over the symbol store

use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::index::db::{StoreResult, SymbolStore, NS_SEPARATOR};
use crate::index::{Reference, ReferenceKind, Symbol, SymbolKind};

const MAX_INHERITANCE_DEPTH: usize = 8;

/// Per-file state threaded through the resolve pass. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    pub namespace: Option<String>,
    /// Fully qualified name of the enclosing class-like, if any
    pub current_class: Option<String>,
    /// Id of the enclosing function or method, if any
    pub current_function: Option<String>,
    /// Implicit imports: `use A\B;` makes `B` mean `A\B`
    pub imports: BTreeMap<String, String>,
    /// Explicit `as` aliases
    pub use_aliases: BTreeMap<String, String>,
}

impl ResolutionContext {
    /// Build the alias maps from a file's own import symbols.
    pub fn from_imports<'a>(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        let mut ctx = Self::default();
        for symbol in symbols.into_iter().filter(|s| s.kind == SymbolKind::Import) {
            let target = symbol.name.trim_start_matches(NS_SEPARATOR).to_string();
            let explicit = symbol
                .metadata
                .get("explicit_alias")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let alias = symbol
                .meta_str("alias")
                .map(str::to_string)
                .unwrap_or_else(|| last_segment(&target).to_string());

            if explicit {
                ctx.use_aliases.insert(alias, target);
            } else {
                ctx.imports.insert(alias, target);
            }
        }
        ctx
    }

    /// Imports overlaid with explicit aliases.
    pub fn aliases(&self) -> BTreeMap<String, String> {
        let mut aliases = self.imports.clone();
        aliases.extend(self.use_aliases.iter().map(|(k, v)| (k.clone(), v.clone())));
        aliases
    }

    /// Best guess at the fully qualified form of `name`, used to name
    /// placeholders.
    pub fn qualify(&self, name: &str) -> String {
        if let Some(rooted) = name.strip_prefix(NS_SEPARATOR) {
            return rooted.to_string();
        }
        let (head, rest) = match name.split_once(NS_SEPARATOR) {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };
        if let Some(target) = self.use_aliases.get(head).or_else(|| self.imports.get(head)) {
            return match rest {
                Some(rest) => format!("{}{}{}", target, NS_SEPARATOR, rest),
                None => target.clone(),
            };
        }
        match self.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            Some(ns) => format!("{}{}{}", ns, NS_SEPARATOR, name),
            None => name.to_string(),
        }
    }
}

/// Source end of a reference
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    pub id: &'a str,
    pub kind: &'a SymbolKind,
}

/// Where a reference was found
#[derive(Debug, Clone)]
pub struct Site {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Reference stored (or already present) against a real symbol.
    Linked(String),
    /// Reference stored against a synthesized placeholder.
    Placeholder(String),
    Unresolved,
    /// Failed structural validation; nothing stored.
    Dropped,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolverStats {
    pub lookups: usize,
    pub cache_hits: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub placeholders: usize,
    pub dropped_structural: usize,
    pub references_added: usize,
}

#[derive(Default)]
struct Counters {
    lookups: AtomicUsize,
    cache_hits: AtomicUsize,
    resolved: AtomicUsize,
    unresolved: AtomicUsize,
    placeholders: AtomicUsize,
    dropped_structural: AtomicUsize,
    references_added: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: String,
    namespace: Option<String>,
    aliases: Vec<(String, String)>,
}

/// Resolver scoped to one pipeline run. The cache only grows; symbols are
/// never removed during the resolve phase so entries cannot go stale.
pub struct Resolver {
    store: Arc<SymbolStore>,
    namespace_roots: Vec<String>,
    cache: DashMap<CacheKey, Option<Symbol>>,
    counters: Counters,
}

impl Resolver {
    pub fn new(store: Arc<SymbolStore>, namespace_roots: Vec<String>) -> Self {
        Self {
            store,
            namespace_roots,
            cache: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn store(&self) -> &SymbolStore {
        &self.store
    }

    /// Resolve a bare or qualified name in `ctx`.
    pub fn resolve(&self, name: &str, ctx: &ResolutionContext) -> StoreResult<Option<Symbol>> {
        let name = name.trim();
        bump(&self.counters.lookups);

        let found = match name.to_ascii_lowercase().as_str() {
            "self" | "static" | "$this" => self.current_class(ctx)?,
            "parent" => match self.current_class(ctx)? {
                Some(class) => match class.extends.first() {
                    Some(base) => self.lookup_cached(base, ctx)?,
                    None => None,
                },
                None => None,
            },
            _ => self.lookup_cached(name, ctx)?,
        };

        if found.is_some() {
            bump(&self.counters.resolved);
        }
        Ok(found)
    }

    fn current_class(&self, ctx: &ResolutionContext) -> StoreResult<Option<Symbol>> {
        match ctx.current_class.as_deref() {
            Some(fqn) => self.lookup_cached(&format!("{}{}", NS_SEPARATOR, fqn), ctx),
            None => Ok(None),
        }
    }

    fn lookup_cached(&self, name: &str, ctx: &ResolutionContext) -> StoreResult<Option<Symbol>> {
        let aliases = ctx.aliases();
        let key = CacheKey {
            name: name.to_string(),
            namespace: ctx.namespace.clone(),
            aliases: aliases.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };

        if let Some(cached) = self.cache.get(&key) {
            bump(&self.counters.cache_hits);
            return Ok(cached.clone());
        }

        let found = self.store.resolve_lookup(name, ctx.namespace.as_deref(), &aliases)?;
        self.cache.insert(key, found.clone());
        Ok(found)
    }

    /// Find a member (method, property, constant) on a class-like, walking
    /// `extends` and used traits.
    pub fn resolve_member(&self, class: &Symbol, member: &str, kinds: &[SymbolKind]) -> StoreResult<Option<Symbol>> {
        let mut visited = HashSet::new();
        self.resolve_member_inner(class, member, kinds, &mut visited, 0)
    }

    fn resolve_member_inner(
        &self,
        class: &Symbol,
        member: &str,
        kinds: &[SymbolKind],
        visited: &mut HashSet<String>,
        depth: usize,
    ) -> StoreResult<Option<Symbol>> {
        if depth > MAX_INHERITANCE_DEPTH || !visited.insert(class.id.clone()) {
            return Ok(None);
        }

        let found = self
            .store
            .get_children(&class.id)?
            .into_iter()
            .find(|child| kinds.contains(&child.kind) && child.name == member);
        if found.is_some() {
            return Ok(found);
        }

        // Ancestors are named relative to the declaring file's imports.
        let file_symbols = self.store.get_in_file(&class.location.file)?;
        let mut ctx = ResolutionContext::from_imports(&file_symbols);
        ctx.namespace = class.namespace.clone();

        let traits: Vec<String> = class
            .metadata
            .get("traits")
            .and_then(|v| v.as_array())
            .map(|names| names.iter().filter_map(|n| n.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        for ancestor in class.extends.iter().chain(traits.iter()) {
            if let Some(base) = self.lookup_cached(ancestor, &ctx)? {
                if let Some(hit) = self.resolve_member_inner(&base, member, kinds, visited, depth + 1)? {
                    return Ok(Some(hit));
                }
            }
        }

        Ok(None)
    }

    /// Whether a structural reference between these kinds is well formed.
    pub fn validate_structural(kind: &ReferenceKind, source: &SymbolKind, target: &SymbolKind) -> bool {
        match kind {
            ReferenceKind::Extends => matches!(
                (source, target),
                (SymbolKind::Class, SymbolKind::Class) | (SymbolKind::Interface, SymbolKind::Interface)
            ),
            ReferenceKind::Implements => {
                matches!(source, SymbolKind::Class | SymbolKind::Enum) && *target == SymbolKind::Interface
            }
            ReferenceKind::UsesTrait => {
                matches!(source, SymbolKind::Class | SymbolKind::Trait | SymbolKind::Enum)
                    && *target == SymbolKind::Trait
            }
            _ => true,
        }
    }

    /// Names rooted in one of the project's own namespaces are "unresolved
    /// internal"; everything else is assumed to live outside the project.
    pub fn is_internal_name(&self, qualified: &str) -> bool {
        let head = qualified
            .trim_start_matches(NS_SEPARATOR)
            .split(NS_SEPARATOR)
            .next()
            .unwrap_or_default();
        self.namespace_roots.iter().any(|root| root == head)
    }

    /// Store a reference to an already resolved target.
    pub fn connect(&self, source: Source<'_>, target: &Symbol, kind: ReferenceKind, site: &Site) -> StoreResult<LinkOutcome> {
        if kind.is_structural() && !Self::validate_structural(&kind, source.kind, &target.kind) {
            warn!(
                "Dropping {} from {} {} to {} '{}' at {}:{}",
                kind, source.kind, source.id, target.kind, target.name, site.file, site.line
            );
            bump(&self.counters.dropped_structural);
            return Ok(LinkOutcome::Dropped);
        }

        let reference = Reference {
            source_id: source.id.to_string(),
            target_id: target.id.clone(),
            kind,
            file: site.file.clone(),
            line: site.line,
            column: site.column,
            context: site.context.clone(),
        };
        if self.store.add_reference(&reference)? {
            bump(&self.counters.references_added);
        }

        if target.external {
            Ok(LinkOutcome::Placeholder(target.id.clone()))
        } else {
            Ok(LinkOutcome::Linked(target.id.clone()))
        }
    }

    /// Resolve `name` and store a reference to it. On a miss, a placeholder
    /// of `placeholder` kind is synthesized when given; otherwise the miss is
    /// only counted.
    pub fn link_name(
        &self,
        source: Source<'_>,
        name: &str,
        kind: ReferenceKind,
        ctx: &ResolutionContext,
        site: &Site,
        placeholder: Option<SymbolKind>,
    ) -> StoreResult<LinkOutcome> {
        if let Some(target) = self.resolve(name, ctx)? {
            return self.connect(source, &target, kind, site);
        }

        bump(&self.counters.unresolved);

        let Some(placeholder_kind) = placeholder else {
            debug!("Unresolved {} '{}' at {}:{}", kind, name, site.file, site.line);
            return Ok(LinkOutcome::Unresolved);
        };

        // `parent` with no recorded base, or a bare `self` outside a class.
        if matches!(name.to_ascii_lowercase().as_str(), "self" | "static" | "parent" | "$this") {
            return Ok(LinkOutcome::Unresolved);
        }

        let qualified = ctx.qualify(name.trim());
        let internal = self.is_internal_name(&qualified);
        let target = self.store.ensure_external(placeholder_kind, &qualified, internal)?;
        bump(&self.counters.placeholders);
        self.connect(source, &target, kind, site)
    }

    /// Count a miss a module settled on its own, outside [`link_name`](Self::link_name).
    pub fn record_miss(&self) {
        bump(&self.counters.unresolved);
    }

    pub fn stats(&self) -> ResolverStats {
        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        ResolverStats {
            lookups: load(&self.counters.lookups),
            cache_hits: load(&self.counters.cache_hits),
            resolved: load(&self.counters.resolved),
            unresolved: load(&self.counters.unresolved),
            placeholders: load(&self.counters.placeholders),
            dropped_structural: load(&self.counters.dropped_structural),
            references_added: load(&self.counters.references_added),
        }
    }
}

pub fn last_segment(name: &str) -> &str {
    name.rsplit(NS_SEPARATOR).next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Location;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, Arc<SymbolStore>, Resolver) {
        let dir = tempdir().unwrap();
        let store = Arc::new(SymbolStore::open(dir.path().join("graph.db")).unwrap());
        let resolver = Resolver::new(store.clone(), vec!["App".to_string()]);
        (dir, store, resolver)
    }

    fn declare(store: &SymbolStore, kind: SymbolKind, fqn: &str, file: &str, line: u32) -> Symbol {
        let namespace = fqn.rsplit_once('\\').map(|(ns, _)| ns.to_string());
        let symbol = Symbol::new(kind, fqn, Location::new(file, line, 1), "php").with_namespace(namespace);
        store.add_symbol(&symbol).unwrap();
        symbol
    }

    fn site() -> Site {
        Site {
            file: "src/Child.php".to_string(),
            line: 3,
            column: 1,
            context: None,
        }
    }

    fn import(fqn: &str, alias: Option<&str>) -> Symbol {
        let mut symbol = Symbol::new(SymbolKind::Import, fqn, Location::new("x.php", 2, 1), "php");
        if let Some(alias) = alias {
            symbol = symbol.with_meta("alias", alias).with_meta("explicit_alias", true);
        }
        symbol
    }

    #[test]
    fn test_context_from_imports() {
        let imports = [import("App\\Util\\Formatter", Some("F")), import("App\\Models\\User", None)];
        let ctx = ResolutionContext::from_imports(&imports);

        assert_eq!(ctx.use_aliases.get("F").map(String::as_str), Some("App\\Util\\Formatter"));
        assert_eq!(ctx.imports.get("User").map(String::as_str), Some("App\\Models\\User"));
        assert_eq!(ctx.qualify("F"), "App\\Util\\Formatter");
        assert_eq!(ctx.qualify("\\Exception"), "Exception");
    }

    #[test]
    fn test_self_and_parent() {
        let (_dir, store, resolver) = setup();
        let base = declare(&store, SymbolKind::Class, "App\\Base", "a.php", 1);
        let mut child = Symbol::new(SymbolKind::Class, "App\\Child", Location::new("b.php", 1, 1), "php")
            .with_namespace(Some("App".to_string()));
        child.extends = vec!["Base".to_string()];
        store.add_symbol(&child).unwrap();

        let ctx = ResolutionContext {
            namespace: Some("App".to_string()),
            current_class: Some("App\\Child".to_string()),
            ..Default::default()
        };

        assert_eq!(resolver.resolve("self", &ctx).unwrap().unwrap().id, child.id);
        assert_eq!(resolver.resolve("static", &ctx).unwrap().unwrap().id, child.id);
        assert_eq!(resolver.resolve("parent", &ctx).unwrap().unwrap().id, base.id);
    }

    #[test]
    fn test_alias_beats_suffix_match() {
        let (_dir, store, resolver) = setup();
        declare(&store, SymbolKind::Class, "Lib\\Formatter", "lib.php", 1);
        let aliased = declare(&store, SymbolKind::Class, "App\\Util\\Formatter", "util.php", 1);

        let ctx = ResolutionContext::from_imports(&[import("App\\Util\\Formatter", None)]);
        let found = resolver.resolve("Formatter", &ctx).unwrap().unwrap();
        assert_eq!(found.id, aliased.id);
    }

    #[test]
    fn test_cache_serves_repeat_lookups() {
        let (_dir, store, resolver) = setup();
        declare(&store, SymbolKind::Class, "App\\Base", "a.php", 1);
        let ctx = ResolutionContext {
            namespace: Some("App".to_string()),
            ..Default::default()
        };

        resolver.resolve("Base", &ctx).unwrap();
        resolver.resolve("Base", &ctx).unwrap();

        let stats = resolver.stats();
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.resolved, 2);
    }

    #[test]
    fn test_implements_on_class_is_dropped() {
        let (_dir, store, resolver) = setup();
        let target = declare(&store, SymbolKind::Class, "App\\NotAnInterface", "a.php", 1);
        let source = declare(&store, SymbolKind::Class, "App\\Impl", "b.php", 1);
        let ctx = ResolutionContext {
            namespace: Some("App".to_string()),
            ..Default::default()
        };

        let outcome = resolver
            .link_name(
                Source { id: &source.id, kind: &source.kind },
                "NotAnInterface",
                ReferenceKind::Implements,
                &ctx,
                &site(),
                Some(SymbolKind::Interface),
            )
            .unwrap();

        assert_eq!(outcome, LinkOutcome::Dropped);
        assert!(store.references_to(&target.id, None).unwrap().is_empty());
        assert_eq!(store.stats().unwrap().total_references, 0);
        assert_eq!(resolver.stats().dropped_structural, 1);
    }

    #[test]
    fn test_structural_validation_matrix() {
        use ReferenceKind::*;
        use SymbolKind::*;

        assert!(Resolver::validate_structural(&Extends, &Class, &Class));
        assert!(Resolver::validate_structural(&Extends, &Interface, &Interface));
        assert!(!Resolver::validate_structural(&Extends, &Class, &Interface));
        assert!(Resolver::validate_structural(&Implements, &Enum, &Interface));
        assert!(!Resolver::validate_structural(&Implements, &Class, &Trait));
        assert!(Resolver::validate_structural(&UsesTrait, &Class, &Trait));
        assert!(!Resolver::validate_structural(&UsesTrait, &Class, &Class));
        assert!(Resolver::validate_structural(&Calls, &Function, &Class));
    }

    #[test]
    fn test_miss_synthesizes_tagged_placeholders() {
        let (_dir, store, resolver) = setup();
        let source = declare(&store, SymbolKind::Class, "App\\Impl", "b.php", 1);
        let ctx = ResolutionContext {
            namespace: Some("App".to_string()),
            ..Default::default()
        };
        let src = Source { id: &source.id, kind: &source.kind };

        let internal = resolver
            .link_name(src, "Missing", ReferenceKind::Extends, &ctx, &site(), Some(SymbolKind::Class))
            .unwrap();
        let LinkOutcome::Placeholder(id) = internal else {
            panic!("expected placeholder, got {:?}", internal);
        };
        let placeholder = store.get_by_id(&id).unwrap().unwrap();
        assert_eq!(placeholder.name, "App\\Missing");
        assert!(placeholder.metadata.contains_key("is_unresolved_internal"));

        let external = resolver
            .link_name(src, "\\Vendor\\Contract", ReferenceKind::Implements, &ctx, &site(), Some(SymbolKind::Interface))
            .unwrap();
        let LinkOutcome::Placeholder(id) = external else {
            panic!("expected placeholder, got {:?}", external);
        };
        assert!(store.get_by_id(&id).unwrap().unwrap().metadata.contains_key("is_external"));

        let plain_miss = resolver
            .link_name(src, "strlen", ReferenceKind::Calls, &ctx, &site(), None)
            .unwrap();
        assert_eq!(plain_miss, LinkOutcome::Unresolved);

        let stats = resolver.stats();
        assert_eq!(stats.unresolved, 3);
        assert_eq!(stats.placeholders, 2);
        assert_eq!(store.stats().unwrap().total_references, 2);
    }

    #[test]
    fn test_resolve_member_walks_extends() {
        let (_dir, store, resolver) = setup();
        let base = declare(&store, SymbolKind::Class, "App\\Base", "a.php", 1);
        let save = Symbol::new(SymbolKind::Method, "save", Location::new("a.php", 2, 5), "php")
            .with_parent(Some(base.id.clone()));
        store.add_symbol(&save).unwrap();

        let mut child = Symbol::new(SymbolKind::Class, "App\\Child", Location::new("b.php", 1, 1), "php")
            .with_namespace(Some("App".to_string()));
        child.extends = vec!["Base".to_string()];
        store.add_symbol(&child).unwrap();

        let found = resolver.resolve_member(&child, "save", &[SymbolKind::Method]).unwrap().unwrap();
        assert_eq!(found.id, save.id);
        assert!(resolver.resolve_member(&child, "delete", &[SymbolKind::Method]).unwrap().is_none());
    }
}
