// Links frontend remote calls to backend controller actions

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{Plugin, PluginContext};
use crate::index::db::NS_SEPARATOR;
use crate::index::{Reference, ReferenceKind, Symbol, SymbolKind};
use crate::resolver::last_segment;

/// Extension kind emitted by frontend modules for remote calls
pub const API_CALL_KIND: &str = "api_call";

/// Path prefix tried off when the exact path has no handler
pub const VERSIONED_PREFIX: &str = "api/v1/";

static ACTION_METHOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:get|post|put|patch|delete)?[Aa]ction([A-Z]\w*)$").unwrap());

/// `[verb]Action<Name>` on a `<Short>Controller` under a `Controllers` namespace serves
/// `<short>/action/<name>`.
#[derive(Debug, Default)]
pub struct EndpointLinker {
    /// Endpoint key -> handler symbol id
    endpoints: BTreeMap<String, String>,
}

impl EndpointLinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoints(&self) -> &BTreeMap<String, String> {
        &self.endpoints
    }

    fn lookup(&self, path: &str) -> Option<&String> {
        self.endpoints.get(path).or_else(|| {
            path.strip_prefix(VERSIONED_PREFIX)
                .and_then(|rest| self.endpoints.get(rest))
        })
    }
}

impl Plugin for EndpointLinker {
    fn name(&self) -> &str {
        "endpoint_linker"
    }

    fn after_collect(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        self.endpoints.clear();

        for class in ctx.store.find_by_kind(&SymbolKind::Class)? {
            let Some(controller) = controller_name(&class.name) else {
                continue;
            };

            for method in ctx.store.get_children(&class.id)? {
                if method.kind != SymbolKind::Method {
                    continue;
                }
                let Some(key) = endpoint_key(&controller, &method.name) else {
                    continue;
                };

                debug!("Endpoint {} -> {}::{}", key, class.name, method.name);
                if self.endpoints.contains_key(&key) {
                    debug!("Endpoint {} already registered, keeping first handler", key);
                    continue;
                }
                let tagged = method.clone().with_meta("endpoint", key.as_str());
                ctx.store.add_symbol(&tagged)?;
                self.endpoints.insert(key, method.id);
            }
        }

        info!("Registered {} backend endpoints", self.endpoints.len());
        ctx.bump("endpoints_registered", self.endpoints.len());
        Ok(())
    }

    fn after_resolve(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        let mut linked = 0;
        let mut unlinked = 0;

        for call in ctx.store.find_by_kind(&SymbolKind::extension(API_CALL_KIND))? {
            let Some(raw) = call.meta_str("endpoint") else {
                unlinked += 1;
                continue;
            };
            let path = normalize_endpoint(raw);

            match self.lookup(&path) {
                Some(handler) => {
                    ctx.store.add_reference(&calls_endpoint(&call, handler, raw))?;
                    linked += 1;
                }
                None => {
                    debug!("No backend handler for {} ({}:{})", raw, call.location.file, call.location.line);
                    unlinked += 1;
                }
            }
        }

        info!("Endpoint calls: {} linked, {} unlinked", linked, unlinked);
        ctx.bump("endpoints_linked", linked);
        ctx.bump("endpoints_unlinked", unlinked);
        Ok(())
    }
}

fn calls_endpoint(call: &Symbol, handler: &str, raw: &str) -> Reference {
    Reference {
        source_id: call.id.clone(),
        target_id: handler.to_string(),
        kind: ReferenceKind::CallsEndpoint,
        file: call.location.file.clone(),
        line: call.location.line,
        column: call.location.column,
        context: Some(raw.to_string()),
    }
}

/// `App\Controllers\LeadController` -> `lead`
pub fn controller_name(class_fqn: &str) -> Option<String> {
    let mut segments = class_fqn.trim_start_matches(NS_SEPARATOR).split(NS_SEPARATOR);
    if !segments.any(|segment| segment == "Controllers") {
        return None;
    }
    let short = last_segment(class_fqn).strip_suffix("Controller")?;
    if short.is_empty() {
        return None;
    }
    Some(short.to_lowercase())
}

/// `lead` + `postActionConvert` -> `lead/action/convert`
pub fn endpoint_key(controller: &str, method: &str) -> Option<String> {
    let captures = ACTION_METHOD.captures(method)?;
    Some(format!("{}/action/{}", controller, captures[1].to_lowercase()))
}

/// Drop scheme/host and query string, trim slashes, lowercase.
pub fn normalize_endpoint(raw: &str) -> String {
    let without_query = raw.split(['?', '#']).next().unwrap_or_default();
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or_default(),
        None => without_query,
    };
    path.trim().trim_matches('/').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::index::db::SymbolStore;
    use crate::index::Location;
    use std::path::Path;
    use tempfile::tempdir;

    fn api_call(store: &SymbolStore, endpoint: &str, line: u32) -> Symbol {
        let call = Symbol::new(
            SymbolKind::extension(API_CALL_KIND),
            format!("fetch {}", endpoint),
            Location::new("web/app.js", line, 5),
            "javascript",
        )
        .with_meta("endpoint", endpoint)
        .with_meta("http_method", "POST");
        store.add_symbol(&call).unwrap();
        call
    }

    fn backend(store: &SymbolStore) -> Symbol {
        let class = Symbol::new(
            SymbolKind::Class,
            "App\\Controllers\\LeadController",
            Location::new("src/Controllers/LeadController.php", 5, 1),
            "php",
        );
        let method = Symbol::new(
            SymbolKind::Method,
            "actionConvert",
            Location::new("src/Controllers/LeadController.php", 7, 5),
            "php",
        )
        .with_parent(Some(class.id.clone()));
        store.add_symbol(&class).unwrap();
        store.add_symbol(&method).unwrap();
        method
    }

    fn run_hooks(store: &SymbolStore, linker: &mut EndpointLinker) -> BTreeMap<String, usize> {
        let config = Config::default();
        let mut stats = BTreeMap::new();
        let mut ctx = PluginContext {
            config: &config,
            root: Path::new("."),
            store,
            modules: &[],
            stats: &mut stats,
        };
        linker.after_collect(&mut ctx).unwrap();
        linker.after_resolve(&mut ctx).unwrap();
        stats
    }

    #[test]
    fn test_endpoint_key_convention() {
        assert_eq!(controller_name("App\\Controllers\\LeadController").as_deref(), Some("lead"));
        assert_eq!(controller_name("App\\Http\\LeadController"), None);
        assert_eq!(controller_name("App\\Controllers\\Helper"), None);

        assert_eq!(endpoint_key("lead", "actionConvert").as_deref(), Some("lead/action/convert"));
        assert_eq!(endpoint_key("lead", "postActionConvert").as_deref(), Some("lead/action/convert"));
        assert_eq!(endpoint_key("lead", "convert"), None);
        assert_eq!(endpoint_key("lead", "actions"), None);
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/Lead/action/convert"), "lead/action/convert");
        assert_eq!(normalize_endpoint("/lead/action/convert/?id=4"), "lead/action/convert");
        assert_eq!(normalize_endpoint("https://crm.local/Api/V1/lead/action/list"), "api/v1/lead/action/list");
    }

    #[test]
    fn test_matching_call_is_linked() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::open(dir.path().join("g.db")).unwrap();
        let handler = backend(&store);
        let call = api_call(&store, "/Lead/action/convert", 10);

        let stats = run_hooks(&store, &mut EndpointLinker::new());

        let edges = store.references_from(&call.id, Some(&ReferenceKind::CallsEndpoint)).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_id, handler.id);
        assert_eq!(stats.get("endpoints_linked"), Some(&1));
        assert_eq!(
            store.get_by_id(&handler.id).unwrap().unwrap().meta_str("endpoint"),
            Some("lead/action/convert")
        );
    }

    #[test]
    fn test_versioned_prefix_is_retried() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::open(dir.path().join("g.db")).unwrap();
        let handler = backend(&store);
        let call = api_call(&store, "/api/v1/lead/action/convert?x=1", 12);

        run_hooks(&store, &mut EndpointLinker::new());

        let edges = store.references_from(&call.id, None).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_id, handler.id);
    }

    #[test]
    fn test_unmatched_call_stays_unlinked() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::open(dir.path().join("g.db")).unwrap();
        backend(&store);
        let call = api_call(&store, "/lead/action/archive", 20);

        let stats = run_hooks(&store, &mut EndpointLinker::new());

        assert!(store.references_from(&call.id, None).unwrap().is_empty());
        assert_eq!(stats.get("endpoints_linked"), Some(&0));
        assert_eq!(stats.get("endpoints_unlinked"), Some(&1));
    }
}
