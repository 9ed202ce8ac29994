// Query execution engine

use anyhow::Result;
use rusqlite::params;
use serde::Serialize;
use std::sync::Arc;

use crate::index::db::{query_symbols, SymbolStore};
use crate::index::{Reference, ReferenceKind, Symbol};
use crate::plugins::endpoint_linker::{normalize_endpoint, VERSIONED_PREFIX};

const CALL_KINDS: &[ReferenceKind] = &[
    ReferenceKind::Calls,
    ReferenceKind::CallsStatic,
    ReferenceKind::CallsEndpoint,
];

/// Supported query types
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum QueryKind {
    Extends,
    Implements,
    Callers,
    Callees,
    Children,
    Endpoint,
}

/// Query result
///
/// For incoming edges (`extends`, `implements`, `callers`, `endpoint`) the
/// location is the reference site; otherwise it is the symbol's declaration.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub symbol_id: String,
    pub name: String,
    pub kind: String,
    pub file: String,
    pub line: u32,
    pub edge: Option<String>,
    pub context: Option<String>,
}

impl QueryResult {
    fn declared(symbol: &Symbol) -> Self {
        Self {
            symbol_id: symbol.id.clone(),
            name: symbol.name.clone(),
            kind: symbol.kind.as_str().to_string(),
            file: symbol.location.file.clone(),
            line: symbol.location.line,
            edge: None,
            context: None,
        }
    }

    fn at_site(symbol: &Symbol, reference: &Reference) -> Self {
        Self {
            file: reference.file.clone(),
            line: reference.line,
            edge: Some(reference.kind.as_str().to_string()),
            context: reference.context.clone(),
            ..Self::declared(symbol)
        }
    }
}

/// Query engine
pub struct QueryEngine {
    store: Arc<SymbolStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<SymbolStore>) -> Self {
        Self { store }
    }

    pub fn run(&self, kind: QueryKind, target: &str) -> Result<Vec<QueryResult>> {
        match kind {
            QueryKind::Extends => self.find_extending(target),
            QueryKind::Implements => self.find_implementing(target),
            QueryKind::Callers => self.find_callers(target),
            QueryKind::Callees => self.find_callees(target),
            QueryKind::Children => self.find_children(target),
            QueryKind::Endpoint => self.find_endpoint(target),
        }
    }

    /// Direct subclasses of a class or interface: linked EXTENDS edges,
    /// then declarations naming the target that never got linked.
    pub fn find_extending(&self, target: &str) -> Result<Vec<QueryResult>> {
        let mut results = self.incoming(target, &[ReferenceKind::Extends])?;
        let declared = self.store.find_extending(target)?;
        append_unlinked(&mut results, declared);
        Ok(results)
    }

    pub fn find_implementing(&self, target: &str) -> Result<Vec<QueryResult>> {
        let mut results = self.incoming(target, &[ReferenceKind::Implements])?;
        let declared = self.store.find_implementing(target)?;
        append_unlinked(&mut results, declared);
        Ok(results)
    }

    /// Every call site reaching the target, including remote ones
    pub fn find_callers(&self, target: &str) -> Result<Vec<QueryResult>> {
        self.incoming(target, CALL_KINDS)
    }

    pub fn find_callees(&self, target: &str) -> Result<Vec<QueryResult>> {
        let mut results = Vec::new();
        for symbol in self.targets(target)? {
            for kind in CALL_KINDS {
                for reference in self.store.references_from(&symbol.id, Some(kind))? {
                    if let Some(callee) = self.store.get_by_id(&reference.target_id)? {
                        results.push(QueryResult {
                            edge: Some(reference.kind.as_str().to_string()),
                            context: reference.context.clone(),
                            ..QueryResult::declared(&callee)
                        });
                    }
                }
            }
        }
        Ok(results)
    }

    pub fn find_children(&self, target: &str) -> Result<Vec<QueryResult>> {
        let mut results = Vec::new();
        for symbol in self.targets(target)? {
            for child in self.store.get_children(&symbol.id)? {
                results.push(QueryResult::declared(&child));
            }
        }
        Ok(results)
    }

    /// Handler serving an endpoint path, followed by the remote calls
    /// linked to it.
    pub fn find_endpoint(&self, endpoint: &str) -> Result<Vec<QueryResult>> {
        let key = normalize_endpoint(endpoint);
        let stripped = key.strip_prefix(VERSIONED_PREFIX).unwrap_or(&key).to_string();

        let handlers = {
            let conn = self.store.reader()?;
            query_symbols(
                &conn,
                "json_extract(metadata, '$.endpoint') IN (?1, ?2) ORDER BY file, line, col",
                params![key, stripped],
            )?
        };

        let mut results = Vec::new();
        for handler in handlers {
            results.push(QueryResult::declared(&handler));
            for reference in self.store.references_to(&handler.id, Some(&ReferenceKind::CallsEndpoint))? {
                if let Some(call) = self.store.get_by_id(&reference.source_id)? {
                    results.push(QueryResult::at_site(&call, &reference));
                }
            }
        }
        Ok(results)
    }

    fn incoming(&self, target: &str, kinds: &[ReferenceKind]) -> Result<Vec<QueryResult>> {
        let mut results = Vec::new();
        for symbol in self.targets(target)? {
            for kind in kinds {
                for reference in self.store.references_to(&symbol.id, Some(kind))? {
                    if let Some(source) = self.store.get_by_id(&reference.source_id)? {
                        results.push(QueryResult::at_site(&source, &reference));
                    }
                }
            }
        }
        Ok(results)
    }

    /// Symbols a query target names. `Class::member` selects members of a
    /// class; anything else matches the stored name exactly, placeholders
    /// included.
    fn targets(&self, target: &str) -> Result<Vec<Symbol>> {
        let target = target.trim().trim_start_matches('\\');

        let Some((class, member)) = target.rsplit_once("::") else {
            return self.symbols_named(target);
        };

        let mut members = Vec::new();
        for owner in self.symbols_named(class)? {
            if owner.external || !owner.kind.is_classlike() {
                continue;
            }
            members.extend(
                self.store
                    .get_children(&owner.id)?
                    .into_iter()
                    .filter(|child| child.name == member),
            );
        }
        Ok(members)
    }

    fn symbols_named(&self, name: &str) -> Result<Vec<Symbol>> {
        let conn = self.store.reader()?;
        Ok(query_symbols(&conn, "name = ?1 ORDER BY external, file, line", [name])?)
    }
}

fn append_unlinked(results: &mut Vec<QueryResult>, declared: Vec<Symbol>) {
    for symbol in declared {
        if !results.iter().any(|r| r.symbol_id == symbol.id) {
            results.push(QueryResult::declared(&symbol));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{external_symbol_id, Location, SymbolKind};
    use tempfile::tempdir;

    fn edge(source: &Symbol, target_id: &str, kind: ReferenceKind, line: u32) -> Reference {
        Reference {
            source_id: source.id.clone(),
            target_id: target_id.to_string(),
            kind,
            file: source.location.file.clone(),
            line,
            column: 9,
            context: None,
        }
    }

    fn fixture() -> (tempfile::TempDir, Arc<SymbolStore>) {
        let dir = tempdir().unwrap();
        let store = SymbolStore::open(dir.path().join("g.db")).unwrap();

        let base = Symbol::new(SymbolKind::Class, "App\\Base", Location::new("src/Base.php", 3, 1), "php");
        let child = Symbol::new(SymbolKind::Class, "App\\Child", Location::new("src/Child.php", 5, 1), "php");
        let run = Symbol::new(SymbolKind::Method, "run", Location::new("src/Child.php", 7, 5), "php")
            .with_parent(Some(child.id.clone()));
        let helper = Symbol::new(SymbolKind::Function, "App\\helper", Location::new("src/helpers.php", 3, 1), "php");
        let contract = store.ensure_external(SymbolKind::Interface, "Psr\\Log\\LoggerInterface", false).unwrap();

        for symbol in [&base, &child, &run, &helper] {
            store.add_symbol(symbol).unwrap();
        }
        store.add_reference(&edge(&child, &base.id, ReferenceKind::Extends, 5)).unwrap();
        store.add_reference(&edge(&child, &contract.id, ReferenceKind::Implements, 5)).unwrap();
        store.add_reference(&edge(&run, &helper.id, ReferenceKind::Calls, 8)).unwrap();

        (dir, Arc::new(store))
    }

    #[test]
    fn test_structural_queries() {
        let (_dir, store) = fixture();
        let engine = QueryEngine::new(store);

        let extending = engine.run(QueryKind::Extends, "\\App\\Base").unwrap();
        assert_eq!(extending.len(), 1);
        assert_eq!(extending[0].name, "App\\Child");
        assert_eq!(extending[0].edge.as_deref(), Some("EXTENDS"));

        let implementing = engine.run(QueryKind::Implements, "Psr\\Log\\LoggerInterface").unwrap();
        assert_eq!(implementing.len(), 1);
        assert_eq!(implementing[0].name, "App\\Child");

        // Declared but never linked
        let mut orphan = Symbol::new(SymbolKind::Class, "App\\Orphan", Location::new("src/Orphan.php", 4, 1), "php");
        orphan.extends = vec!["\\App\\Base".to_string()];
        engine.store.add_symbol(&orphan).unwrap();
        let extending = engine.run(QueryKind::Extends, "App\\Base").unwrap();
        assert_eq!(extending.len(), 2);
        assert_eq!(extending[1].name, "App\\Orphan");
        assert_eq!(extending[1].edge, None);

        let children = engine.run(QueryKind::Children, "App\\Child").unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "run");
    }

    #[test]
    fn test_call_queries() {
        let (_dir, store) = fixture();
        let engine = QueryEngine::new(store.clone());

        let callers = engine.run(QueryKind::Callers, "App\\helper").unwrap();
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].name, "run");
        assert_eq!(callers[0].line, 8);

        let callees = engine.run(QueryKind::Callees, "App\\Child::run").unwrap();
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].symbol_id, store.find_by_name("App\\helper", None).unwrap()[0].id);

        assert!(engine.run(QueryKind::Callees, "App\\Missing::run").unwrap().is_empty());
        assert!(engine.run(QueryKind::Callers, "nothing").unwrap().is_empty());
    }

    #[test]
    fn test_placeholder_targets_are_queryable() {
        let (_dir, store) = fixture();
        let engine = QueryEngine::new(store);

        let results = engine.targets("Psr\\Log\\LoggerInterface").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].id,
            external_symbol_id(&SymbolKind::Interface, "Psr\\Log\\LoggerInterface")
        );
    }

    #[test]
    fn test_endpoint_query_lists_handler_and_calls() {
        let (_dir, store) = fixture();
        let handler = Symbol::new(
            SymbolKind::Method,
            "actionConvert",
            Location::new("src/Controllers/LeadController.php", 9, 5),
            "php",
        )
        .with_meta("endpoint", "lead/action/convert");
        let call = Symbol::new(
            SymbolKind::extension("api_call"),
            "POST /lead/action/convert",
            Location::new("web/lead.js", 4, 3),
            "javascript",
        );
        store.add_symbol(&handler).unwrap();
        store.add_symbol(&call).unwrap();
        store
            .add_reference(&edge(&call, &handler.id, ReferenceKind::CallsEndpoint, 4))
            .unwrap();

        let engine = QueryEngine::new(store);
        let results = engine.run(QueryKind::Endpoint, "/api/v1/Lead/action/convert?id=3").unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].symbol_id, handler.id);
        assert_eq!(results[0].edge, None);
        assert_eq!(results[1].symbol_id, call.id);
        assert_eq!(results[1].edge.as_deref(), Some("CALLS_ENDPOINT"));

        assert!(engine.run(QueryKind::Endpoint, "/lead/action/archive").unwrap().is_empty());
    }
}
