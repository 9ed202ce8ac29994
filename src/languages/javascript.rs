// JavaScript language module

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tree_sitter::{Language, Node};

use super::{child_of_kind, field_text, has_child_kind, named_children, node_location, node_text, parse_tree, snippet};
use crate::index::db::SymbolStore;
use crate::index::{file_symbol_id, Parameter, ReferenceKind, Symbol, SymbolKind};
use crate::indexer::{add_counts, FileCounters, FileDriver, FileOutcome, LanguageModule, ModuleStats, PhaseContext};
use crate::plugins::endpoint_linker::API_CALL_KIND;
use crate::resolver::{LinkOutcome, Resolver, Site, Source};

pub const LANGUAGE_NAME: &str = "javascript";

const EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs"];

const MAX_CLASS_DEPTH: usize = 8;

static AJAX_REQUEST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(get|post|put|patch|delete)Request$").unwrap());

const HTTP_VERBS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options"];

fn language() -> Language {
    tree_sitter_javascript::LANGUAGE.into()
}

/// Remote call sites become `api_call` symbols carrying the literal endpoint
/// text and HTTP method.
pub struct JavaScriptModule {
    store: Arc<SymbolStore>,
    root: PathBuf,
    counters: FileCounters,
    links: ModuleStats,
}

impl JavaScriptModule {
    pub fn new(store: Arc<SymbolStore>, root: PathBuf) -> Self {
        Self {
            store,
            root,
            counters: FileCounters::default(),
            links: ModuleStats::new(),
        }
    }
}

impl LanguageModule for JavaScriptModule {
    fn name(&self) -> &str {
        LANGUAGE_NAME
    }

    fn extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }

    fn collect(&mut self, ctx: &PhaseContext<'_>) -> Result<()> {
        let driver = FileDriver::new(&self.store, &self.root, ctx.cancel, LANGUAGE_NAME);

        for path in ctx.files_with(EXTENSIONS) {
            driver.collect(path, &mut self.counters, |_, source| collect_symbols(source, path));
        }

        Ok(())
    }

    fn resolve(&mut self, ctx: &PhaseContext<'_>) -> Result<()> {
        let driver = FileDriver::new(&self.store, &self.root, ctx.cancel, LANGUAGE_NAME);

        for path in ctx.files_with(EXTENSIONS) {
            let mut file_links = BTreeMap::new();
            let outcome = driver.resolve(path, &mut self.counters, |store, source| {
                let declared = store.get_in_file(path)?;
                let tree = parse_tree(&language(), source, "JavaScript")?;
                let mut linker = Linker::new(ctx.resolver, source, path, declared);
                linker.walk(tree.root_node())?;
                file_links = linker.outcomes;
                Ok(())
            });
            if outcome == FileOutcome::Resolved {
                add_counts(&mut self.links, file_links);
            }
        }

        Ok(())
    }

    fn stats(&self) -> ModuleStats {
        let mut stats = ModuleStats::new();
        self.counters.write_into(&mut stats);
        for (outcome, n) in &self.links {
            stats.insert(format!("references_{}", outcome), *n);
        }
        stats
    }
}

/// Parse one file and return its declarations and remote call sites.
pub fn collect_symbols(content: &str, file_path: &str) -> Result<Vec<Symbol>> {
    let tree = parse_tree(&language(), content, "JavaScript")?;
    let mut collector = Collector {
        content,
        file: file_path,
        scope: Vec::new(),
        symbols: Vec::new(),
    };
    collector.walk(tree.root_node());
    Ok(collector.symbols)
}

/// Remote call recognised at a call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub endpoint: String,
    pub http_method: String,
    pub client: &'static str,
}

struct Collector<'s> {
    content: &'s str,
    file: &'s str,
    /// Ids of enclosing functions/classes
    scope: Vec<String>,
    symbols: Vec<Symbol>,
}

impl Collector<'_> {
    fn symbol(&self, kind: SymbolKind, name: &str, node: Node<'_>) -> Symbol {
        Symbol::new(kind, name, node_location(node, self.file), LANGUAGE_NAME).with_parent(self.scope.last().cloned())
    }

    fn walk(&mut self, node: Node<'_>) {
        let declared = match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                field_text(node, "name", self.content).map(|name| self.function(SymbolKind::Function, name, node, node))
            }
            "method_definition" => {
                field_text(node, "name", self.content).map(|name| self.function(SymbolKind::Method, name, node, node))
            }
            "variable_declarator" => {
                let value = node.child_by_field_name("value");
                match (field_text(node, "name", self.content), value) {
                    (Some(name), Some(value))
                        if matches!(value.kind(), "arrow_function" | "function_expression" | "function") =>
                    {
                        Some(self.function(SymbolKind::Function, name, node, value))
                    }
                    _ => None,
                }
            }
            "class_declaration" | "class" => field_text(node, "name", self.content).map(|name| self.class(name, node)),
            "call_expression" => {
                if let Some(call) = detect_api_call(node, self.content) {
                    self.api_call(call, node);
                }
                None
            }
            _ => None,
        };

        if let Some(id) = &declared {
            self.scope.push(id.clone());
        }
        for child in named_children(node) {
            self.walk(child);
        }
        if declared.is_some() {
            self.scope.pop();
        }
    }

    /// Returns the new symbol's id for scoping.
    fn function(&mut self, kind: SymbolKind, name: &str, node: Node<'_>, signature: Node<'_>) -> String {
        let mut function = self.symbol(kind, name, node);
        function.parameters = parameters(signature, self.content);
        function.is_static = has_child_kind(node, "static");
        if node_text(signature, self.content).trim_start().starts_with("async") {
            function = function.with_meta("async", true);
        }
        let id = function.id.clone();
        self.symbols.push(function);
        id
    }

    fn class(&mut self, name: &str, node: Node<'_>) -> String {
        let mut class = self.symbol(SymbolKind::Class, name, node);
        if let Some(heritage) = child_of_kind(node, &["class_heritage"]) {
            class.extends = named_children(heritage)
                .into_iter()
                .map(|c| node_text(c, self.content).to_string())
                .collect();
        }
        let id = class.id.clone();
        self.symbols.push(class);
        id
    }

    fn api_call(&mut self, call: ApiCall, node: Node<'_>) {
        let name = format!("{} {}", call.http_method, call.endpoint);
        let symbol = self
            .symbol(SymbolKind::extension(API_CALL_KIND), &name, node)
            .with_meta("endpoint", call.endpoint.as_str())
            .with_meta("http_method", call.http_method.as_str())
            .with_meta("client", call.client)
            .with_meta("dynamic", call.endpoint.contains("${"));
        self.symbols.push(symbol);
    }
}

fn parameters(signature: Node<'_>, content: &str) -> Vec<Parameter> {
    let Some(list) = signature
        .child_by_field_name("parameters")
        .or_else(|| signature.child_by_field_name("parameter"))
    else {
        return Vec::new();
    };
    if list.kind() == "identifier" {
        return vec![Parameter {
            name: node_text(list, content).to_string(),
            type_hint: None,
        }];
    }
    named_children(list)
        .into_iter()
        .filter_map(|param| {
            let name_node = match param.kind() {
                "identifier" => Some(param),
                "assignment_pattern" => param.child_by_field_name("left"),
                "rest_pattern" => child_of_kind(param, &["identifier"]),
                _ => None,
            }?;
            Some(Parameter {
                name: node_text(name_node, content).to_string(),
                type_hint: None,
            })
        })
        .collect()
}

/// Literal text of a string or template argument. For concatenations the
/// leftmost literal is kept.
fn literal(node: Node<'_>, content: &str) -> Option<String> {
    match node.kind() {
        "string" => Some(node_text(node, content).trim_matches(['\'', '"']).to_string()),
        "template_string" => Some(node_text(node, content).trim_matches('`').to_string()),
        "binary_expression" => node.child_by_field_name("left").and_then(|left| literal(left, content)),
        _ => None,
    }
}

/// String value of `key` in an object literal argument
fn object_property(object: Node<'_>, key: &str, content: &str) -> Option<String> {
    if object.kind() != "object" {
        return None;
    }
    named_children(object)
        .into_iter()
        .filter(|pair| pair.kind() == "pair")
        .find(|pair| {
            field_text(*pair, "key", content)
                .map(|k| k.trim_matches(['\'', '"']))
                == Some(key)
        })
        .and_then(|pair| pair.child_by_field_name("value"))
        .and_then(|value| literal(value, content))
}

/// Recognise a remote call: `fetch(url, {method})`, `axios.post(url)`,
/// `Ajax.getRequest(url)`, `$.get(url)` or `$.ajax({url, type})`.
pub fn detect_api_call(call: Node<'_>, content: &str) -> Option<ApiCall> {
    let function = call.child_by_field_name("function")?;
    let args = call
        .child_by_field_name("arguments")
        .map(named_children)
        .unwrap_or_default();
    let first = args.first().copied();

    match function.kind() {
        "identifier" if node_text(function, content) == "fetch" => {
            let endpoint = literal(first?, content)?;
            let http_method = args
                .get(1)
                .and_then(|options| object_property(*options, "method", content))
                .unwrap_or_else(|| "GET".to_string());
            Some(ApiCall {
                endpoint,
                http_method: http_method.to_uppercase(),
                client: "fetch",
            })
        }
        "member_expression" => {
            let object = field_text(function, "object", content)?;
            let property = field_text(function, "property", content)?;

            let (http_method, client) = match object {
                "axios" if HTTP_VERBS.contains(&property) => (property.to_uppercase(), "axios"),
                "Ajax" => (AJAX_REQUEST.captures(property)?[1].to_uppercase(), "ajax"),
                "$" | "jQuery" if property == "get" || property == "post" => (property.to_uppercase(), "jquery"),
                "$" | "jQuery" if property == "ajax" => {
                    let options = first?;
                    let endpoint = object_property(options, "url", content)?;
                    let http_method = object_property(options, "method", content)
                        .or_else(|| object_property(options, "type", content))
                        .unwrap_or_else(|| "GET".to_string());
                    return Some(ApiCall {
                        endpoint,
                        http_method: http_method.to_uppercase(),
                        client: "jquery",
                    });
                }
                _ => return None,
            };

            Some(ApiCall {
                endpoint: literal(first?, content)?,
                http_method,
                client,
            })
        }
        _ => None,
    }
}

/// Resolve-pass walker for one file. Names are looked up among JavaScript
/// symbols only, preferring the current file.
struct Linker<'a> {
    resolver: &'a Resolver,
    content: &'a str,
    file: &'a str,
    declared: HashMap<(u32, u32, String), Symbol>,
    file_id: String,
    class: Option<Symbol>,
    function: Option<Symbol>,
    memo: HashMap<(String, SymbolKind), Option<Symbol>>,
    outcomes: BTreeMap<&'static str, usize>,
}

impl<'a> Linker<'a> {
    fn new(resolver: &'a Resolver, content: &'a str, file: &'a str, declared: Vec<Symbol>) -> Self {
        let declared = declared
            .into_iter()
            .map(|s| ((s.location.line, s.location.column, s.kind.to_string()), s))
            .collect();
        Self {
            resolver,
            content,
            file,
            declared,
            file_id: file_symbol_id(file),
            class: None,
            function: None,
            memo: HashMap::new(),
            outcomes: BTreeMap::new(),
        }
    }

    fn declared_at(&self, node: Node<'_>, kind: &SymbolKind) -> Option<Symbol> {
        let start = node.start_position();
        self.declared
            .get(&(start.row as u32 + 1, start.column as u32 + 1, kind.to_string()))
            .cloned()
    }

    fn find(&mut self, name: &str, kind: SymbolKind) -> Result<Option<Symbol>> {
        let key = (name.to_string(), kind.clone());
        if let Some(found) = self.memo.get(&key) {
            return Ok(found.clone());
        }

        let mut candidates: Vec<Symbol> = self
            .resolver
            .store()
            .find_by_name(name, Some(LANGUAGE_NAME))?
            .into_iter()
            .filter(|s| s.kind == kind && (kind != SymbolKind::Function || s.parent_id.is_none()))
            .collect();
        candidates.sort_by(|a, b| {
            (a.location.file != self.file, &a.location.file, a.location.line).cmp(&(
                b.location.file != self.file,
                &b.location.file,
                b.location.line,
            ))
        });
        let found = candidates.into_iter().next();
        self.memo.insert(key, found.clone());
        Ok(found)
    }

    /// Method on `class` or one of its JavaScript base classes
    fn method_of(&mut self, class: &Symbol, name: &str) -> Result<Option<Symbol>> {
        let mut current = Some(class.clone());
        for _ in 0..MAX_CLASS_DEPTH {
            let Some(class) = current else {
                break;
            };
            let method = self
                .resolver
                .store()
                .get_children(&class.id)?
                .into_iter()
                .find(|c| c.kind == SymbolKind::Method && c.name == name);
            if method.is_some() {
                return Ok(method);
            }
            current = match class.extends.first() {
                Some(base) => self.find(base, SymbolKind::Class)?,
                None => None,
            };
        }
        Ok(None)
    }

    fn connect(&mut self, target: Option<Symbol>, kind: ReferenceKind, node: Node<'_>) -> Result<()> {
        let Some(target) = target else {
            self.resolver.record_miss();
            *self.outcomes.entry("unresolved").or_insert(0) += 1;
            return Ok(());
        };

        let (id, source_kind) = self
            .function
            .as_ref()
            .or(self.class.as_ref())
            .map(|s| (s.id.clone(), s.kind.clone()))
            .unwrap_or_else(|| (self.file_id.clone(), SymbolKind::File));
        let start = node.start_position();
        let site = Site {
            file: self.file.to_string(),
            line: start.row as u32 + 1,
            column: start.column as u32 + 1,
            context: Some(snippet(node_text(node, self.content))),
        };

        let outcome = self.resolver.connect(
            Source {
                id: &id,
                kind: &source_kind,
            },
            &target,
            kind,
            &site,
        )?;
        let key = match outcome {
            LinkOutcome::Dropped => "dropped",
            _ => "linked",
        };
        *self.outcomes.entry(key).or_insert(0) += 1;
        Ok(())
    }

    fn walk(&mut self, node: Node<'_>) -> Result<()> {
        match node.kind() {
            "class_declaration" | "class" => {
                if let Some(class) = self.declared_at(node, &SymbolKind::Class) {
                    let previous = self.class.replace(class.clone());
                    let previous_function = self.function.take();
                    for base in &class.extends {
                        let target = self.find(base, SymbolKind::Class)?;
                        self.connect(target, ReferenceKind::Extends, node)?;
                    }
                    self.walk_children(node)?;
                    self.class = previous;
                    self.function = previous_function;
                    return Ok(());
                }
            }
            "function_declaration" | "generator_function_declaration" | "variable_declarator" => {
                if let Some(function) = self.declared_at(node, &SymbolKind::Function) {
                    return self.within_function(function, node);
                }
            }
            "method_definition" => {
                if let Some(method) = self.declared_at(node, &SymbolKind::Method) {
                    return self.within_function(method, node);
                }
            }
            "call_expression" => self.call(node)?,
            "new_expression" => {
                if let Some(constructor) = node.child_by_field_name("constructor").filter(|c| c.kind() == "identifier") {
                    let target = self.find(node_text(constructor, self.content), SymbolKind::Class)?;
                    self.connect(target, ReferenceKind::Instantiates, node)?;
                }
            }
            _ => {}
        }

        self.walk_children(node)
    }

    fn walk_children(&mut self, node: Node<'_>) -> Result<()> {
        for child in named_children(node) {
            self.walk(child)?;
        }
        Ok(())
    }

    fn within_function(&mut self, function: Symbol, node: Node<'_>) -> Result<()> {
        let previous = self.function.replace(function);
        self.walk_children(node)?;
        self.function = previous;
        Ok(())
    }

    fn call(&mut self, node: Node<'_>) -> Result<()> {
        let Some(function) = node.child_by_field_name("function") else {
            return Ok(());
        };

        match function.kind() {
            "identifier" => {
                let name = node_text(function, self.content);
                if name == "fetch" {
                    return Ok(());
                }
                let target = self.find(name, SymbolKind::Function)?;
                self.connect(target, ReferenceKind::Calls, node)
            }
            "member_expression" => {
                let object = function.child_by_field_name("object");
                let is_this = object.is_some_and(|o| o.kind() == "this");
                let (true, Some(class), Some(property)) =
                    (is_this, self.class.clone(), field_text(function, "property", self.content))
                else {
                    return Ok(());
                };
                let target = self.method_of(&class, property)?;
                self.connect(target, ReferenceKind::Calls, node)
            }
            _ => Ok(()),
        }
    }
}
