// PHP language module

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tree_sitter::{Language, Node};

use super::{child_of_kind, field_text, has_child_kind, named_children, node_location, node_text, parse_tree, snippet};
use crate::index::db::{SymbolStore, NS_SEPARATOR};
use crate::index::{file_symbol_id, Parameter, ReferenceKind, Symbol, SymbolKind, Visibility};
use crate::indexer::{add_counts, FileCounters, FileDriver, FileOutcome, LanguageModule, ModuleStats, PhaseContext};
use crate::resolver::{LinkOutcome, ResolutionContext, Resolver, Site, Source};

pub const LANGUAGE_NAME: &str = "php";

const NAME_KINDS: &[&str] = &["name", "qualified_name"];
const SCOPE_KINDS: &[&str] = &["name", "qualified_name", "relative_scope"];

const BUILTIN_TYPES: &[&str] = &[
    "int", "float", "string", "bool", "array", "callable", "iterable", "object", "mixed", "void", "null",
    "never", "false", "true",
];

fn language() -> Language {
    tree_sitter_php::LANGUAGE_PHP.into()
}

/// Types, namespaces and functions are named by their fully qualified name;
/// members by their simple name with `parent_id` pointing at the class-like.
pub struct PhpModule {
    store: Arc<SymbolStore>,
    root: PathBuf,
    counters: FileCounters,
    links: ModuleStats,
}

impl PhpModule {
    pub fn new(store: Arc<SymbolStore>, root: PathBuf) -> Self {
        Self {
            store,
            root,
            counters: FileCounters::default(),
            links: ModuleStats::new(),
        }
    }
}

impl LanguageModule for PhpModule {
    fn name(&self) -> &str {
        LANGUAGE_NAME
    }

    fn extensions(&self) -> &[&'static str] {
        &["php"]
    }

    fn collect(&mut self, ctx: &PhaseContext<'_>) -> Result<()> {
        let driver = FileDriver::new(&self.store, &self.root, ctx.cancel, LANGUAGE_NAME);

        for path in ctx.files_with(&["php"]) {
            driver.collect(path, &mut self.counters, |_, source| collect_symbols(source, path));
        }

        Ok(())
    }

    fn resolve(&mut self, ctx: &PhaseContext<'_>) -> Result<()> {
        let driver = FileDriver::new(&self.store, &self.root, ctx.cancel, LANGUAGE_NAME);

        for path in ctx.files_with(&["php"]) {
            let mut file_links = BTreeMap::new();
            let outcome = driver.resolve(path, &mut self.counters, |store, source| {
                let declared = store.get_in_file(path)?;
                let tree = parse_tree(&language(), source, "PHP")?;
                let mut linker = Linker::new(ctx.resolver, source, path, declared);
                linker.run(tree.root_node())?;
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

/// Parse one file and return every declaration in it.
pub fn collect_symbols(content: &str, file_path: &str) -> Result<Vec<Symbol>> {
    let tree = parse_tree(&language(), content, "PHP")?;
    let mut collector = Collector {
        content,
        file: file_path,
        namespace: None,
        symbols: Vec::new(),
    };
    collector.walk(tree.root_node());
    Ok(collector.symbols)
}

struct Collector<'s> {
    content: &'s str,
    file: &'s str,
    namespace: Option<String>,
    symbols: Vec<Symbol>,
}

impl Collector<'_> {
    fn qualify(&self, name: &str) -> String {
        match self.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            Some(ns) => format!("{}{}{}", ns, NS_SEPARATOR, name),
            None => name.to_string(),
        }
    }

    fn symbol(&self, kind: SymbolKind, name: impl Into<String>, node: Node<'_>) -> Symbol {
        Symbol::new(kind, name, node_location(node, self.file), LANGUAGE_NAME).with_namespace(self.namespace.clone())
    }

    fn text(&self, node: Node<'_>) -> &str {
        node_text(node, self.content)
    }

    fn names_in(&self, node: Node<'_>) -> Vec<String> {
        named_children(node)
            .into_iter()
            .filter(|c| NAME_KINDS.contains(&c.kind()))
            .map(|c| self.text(c).to_string())
            .collect()
    }

    fn walk(&mut self, node: Node<'_>) {
        match node.kind() {
            "namespace_definition" => self.namespace_definition(node),
            "namespace_use_declaration" => self.imports(node),
            "class_declaration" | "interface_declaration" | "trait_declaration" | "enum_declaration" => {
                self.class_like(node)
            }
            "function_definition" => self.function(node),
            "const_declaration" => self.constants(node, None),
            _ => {
                for child in named_children(node) {
                    self.walk(child);
                }
            }
        }
    }

    fn namespace_definition(&mut self, node: Node<'_>) {
        let name = field_text(node, "name", self.content).map(|n| n.trim_start_matches(NS_SEPARATOR).to_string());

        if let Some(name) = &name {
            let symbol = Symbol::new(SymbolKind::Namespace, name.clone(), node_location(node, self.file), LANGUAGE_NAME);
            self.symbols.push(symbol);
        }

        match node.child_by_field_name("body") {
            Some(body) => {
                let previous = std::mem::replace(&mut self.namespace, name);
                self.walk(body);
                self.namespace = previous;
            }
            // `namespace App;` applies to the rest of the file
            None => self.namespace = name,
        }
    }

    fn imports(&mut self, node: Node<'_>) {
        for clause in parse_use_declaration(self.text(node)) {
            let mut symbol = self
                .symbol(SymbolKind::Import, clause.target.clone(), node)
                .with_meta("use_kind", clause.kind.as_str());
            if let Some(alias) = clause.alias {
                symbol = symbol.with_meta("alias", alias).with_meta("explicit_alias", true);
            }
            self.symbols.push(symbol);
        }
    }

    fn class_like(&mut self, node: Node<'_>) {
        let Some(name) = field_text(node, "name", self.content) else {
            return;
        };
        let kind = match node.kind() {
            "interface_declaration" => SymbolKind::Interface,
            "trait_declaration" => SymbolKind::Trait,
            "enum_declaration" => SymbolKind::Enum,
            _ => SymbolKind::Class,
        };

        let mut class = self.symbol(kind, self.qualify(name), node);
        class.is_abstract = has_child_kind(node, "abstract_modifier");
        class.is_final = has_child_kind(node, "final_modifier");
        if let Some(base) = child_of_kind(node, &["base_clause"]) {
            class.extends = self.names_in(base);
        }
        if let Some(interfaces) = child_of_kind(node, &["class_interface_clause"]) {
            class.implements = self.names_in(interfaces);
        }

        let mut traits = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            for member in named_children(body) {
                match member.kind() {
                    "method_declaration" => self.method(member, &class),
                    "property_declaration" => self.properties(member, &class),
                    "const_declaration" => self.constants(member, Some(&class)),
                    "enum_case" => self.enum_case(member, &class),
                    "use_declaration" => traits.extend(self.names_in(member)),
                    _ => {}
                }
            }
        }

        if !traits.is_empty() {
            class = class.with_meta("traits", traits);
        }
        self.symbols.push(class);
    }

    fn function(&mut self, node: Node<'_>) {
        let Some(name) = field_text(node, "name", self.content) else {
            return;
        };
        let mut function = self.symbol(SymbolKind::Function, self.qualify(name), node);
        function.return_type = return_type(node, self.content);
        function.parameters = self.parameters(node, None);
        self.symbols.push(function);
    }

    fn method(&mut self, node: Node<'_>, class: &Symbol) {
        let Some(name) = field_text(node, "name", self.content) else {
            return;
        };
        let mut method = self.symbol(SymbolKind::Method, name, node).with_parent(Some(class.id.clone()));
        method.visibility = Some(self.visibility(node));
        method.is_static = has_child_kind(node, "static_modifier");
        method.is_abstract = has_child_kind(node, "abstract_modifier");
        method.is_final = has_child_kind(node, "final_modifier");
        method.return_type = return_type(node, self.content);
        method.parameters = self.parameters(node, Some(class));
        self.symbols.push(method);
    }

    fn visibility(&self, node: Node<'_>) -> Visibility {
        child_of_kind(node, &["visibility_modifier"])
            .and_then(|v| Visibility::parse(self.text(v)))
            .unwrap_or(Visibility::Public)
    }

    /// Parameter list of a function or method. Constructor-promoted
    /// parameters also become properties of `class`.
    fn parameters(&mut self, node: Node<'_>, class: Option<&Symbol>) -> Vec<Parameter> {
        let Some(list) = node.child_by_field_name("parameters") else {
            return Vec::new();
        };

        let mut parameters = Vec::new();
        for param in named_children(list) {
            if !matches!(param.kind(), "simple_parameter" | "variadic_parameter" | "property_promotion_parameter") {
                continue;
            }
            let Some(name) = field_text(param, "name", self.content) else {
                continue;
            };
            let name = name.trim_start_matches('$').to_string();
            let type_hint = field_text(param, "type", self.content).map(str::to_string);

            if let (Some(class), "property_promotion_parameter") = (class, param.kind()) {
                let mut property = self
                    .symbol(SymbolKind::Property, name.clone(), param)
                    .with_parent(Some(class.id.clone()))
                    .with_meta("promoted", true);
                property.visibility = Some(self.visibility(param));
                if let Some(hint) = &type_hint {
                    property = property.with_meta("type", hint.as_str());
                }
                self.symbols.push(property);
            }

            parameters.push(Parameter { name, type_hint });
        }
        parameters
    }

    fn properties(&mut self, node: Node<'_>, class: &Symbol) {
        let visibility = self.visibility(node);
        let is_static = has_child_kind(node, "static_modifier");
        let type_hint = field_text(node, "type", self.content);

        for element in named_children(node).into_iter().filter(|c| c.kind() == "property_element") {
            let Some(var) = child_of_kind(element, &["variable_name"]) else {
                continue;
            };
            let name = self.text(var).trim_start_matches('$').to_string();
            let mut property = self
                .symbol(SymbolKind::Property, name, element)
                .with_parent(Some(class.id.clone()));
            property.visibility = Some(visibility);
            property.is_static = is_static;
            if let Some(hint) = type_hint {
                property = property.with_meta("type", hint);
            }
            self.symbols.push(property);
        }
    }

    fn constants(&mut self, node: Node<'_>, class: Option<&Symbol>) {
        for element in named_children(node).into_iter().filter(|c| c.kind() == "const_element") {
            let Some(name) = child_of_kind(element, &["name"]).map(|n| self.text(n).to_string()) else {
                continue;
            };
            let constant = match class {
                Some(class) => {
                    let mut constant = self
                        .symbol(SymbolKind::Constant, name, element)
                        .with_parent(Some(class.id.clone()));
                    constant.visibility = Some(self.visibility(node));
                    constant
                }
                None => self.symbol(SymbolKind::Constant, self.qualify(&name), element),
            };
            self.symbols.push(constant);
        }
    }

    fn enum_case(&mut self, node: Node<'_>, class: &Symbol) {
        let Some(name) = field_text(node, "name", self.content) else {
            return;
        };
        let case = self
            .symbol(SymbolKind::Constant, name, node)
            .with_parent(Some(class.id.clone()))
            .with_meta("enum_case", true);
        self.symbols.push(case);
    }
}

fn return_type(node: Node<'_>, content: &str) -> Option<String> {
    field_text(node, "return_type", content)
        .map(|t| t.trim_start_matches(':').trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Class-like names mentioned by a type hint, builtins removed.
pub fn type_names(hint: &str) -> Vec<String> {
    hint.split(['|', '&', '(', ')'])
        .map(|part| part.trim().trim_start_matches('?').trim())
        .filter(|part| !part.is_empty() && !BUILTIN_TYPES.contains(&part.to_ascii_lowercase().as_str()))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseKind {
    Class,
    Function,
    Constant,
}

impl UseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UseKind::Class => "class",
            UseKind::Function => "function",
            UseKind::Constant => "const",
        }
    }

    fn placeholder(use_kind: Option<&str>) -> SymbolKind {
        match use_kind {
            Some("function") => SymbolKind::Function,
            Some("const") => SymbolKind::Constant,
            _ => SymbolKind::Class,
        }
    }
}

/// One imported name from a `use` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseClause {
    pub target: String,
    pub alias: Option<String>,
    pub kind: UseKind,
}

/// Split `use` statement text into clauses, expanding group uses.
pub fn parse_use_declaration(text: &str) -> Vec<UseClause> {
    let body = text.trim().trim_end_matches(';').trim();
    let Some(body) = body.strip_prefix("use") else {
        return Vec::new();
    };
    let (kind, body) = split_use_kind(body.trim());

    match body.split_once('{') {
        Some((prefix, group)) => {
            let prefix = prefix.trim().trim_matches(NS_SEPARATOR);
            group
                .trim_end()
                .trim_end_matches('}')
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .filter_map(|item| {
                    let (item_kind, item) = split_use_kind(item);
                    let kind = if item_kind == UseKind::Class { kind } else { item_kind };
                    use_clause(&format!("{}{}{}", prefix, NS_SEPARATOR, item), kind)
                })
                .collect()
        }
        None => body.split(',').filter_map(|item| use_clause(item, kind)).collect(),
    }
}

fn split_use_kind(text: &str) -> (UseKind, &str) {
    if let Some(rest) = text.strip_prefix("function ") {
        (UseKind::Function, rest.trim())
    } else if let Some(rest) = text.strip_prefix("const ") {
        (UseKind::Constant, rest.trim())
    } else {
        (UseKind::Class, text)
    }
}

fn use_clause(item: &str, kind: UseKind) -> Option<UseClause> {
    let tokens: Vec<&str> = item.split_whitespace().collect();
    let (target, alias) = match tokens.as_slice() {
        [target] => (*target, None),
        [target, keyword, alias] if keyword.eq_ignore_ascii_case("as") => (*target, Some(alias.to_string())),
        _ => return None,
    };
    let target = target.trim_start_matches(NS_SEPARATOR);
    if target.is_empty() {
        return None;
    }
    Some(UseClause {
        target: target.to_string(),
        alias,
        kind,
    })
}

/// Resolve-pass walker for one file.
struct Linker<'a> {
    resolver: &'a Resolver,
    content: &'a str,
    file: &'a str,
    imports: Vec<Symbol>,
    declared: HashMap<(u32, u32, String), Symbol>,
    ctx: ResolutionContext,
    file_id: String,
    class: Option<Symbol>,
    function: Option<Symbol>,
    outcomes: BTreeMap<&'static str, usize>,
}

impl<'a> Linker<'a> {
    fn new(resolver: &'a Resolver, content: &'a str, file: &'a str, declared: Vec<Symbol>) -> Self {
        let ctx = ResolutionContext::from_imports(&declared);
        let imports = declared.iter().filter(|s| s.kind == SymbolKind::Import).cloned().collect();
        let declared = declared
            .into_iter()
            .map(|s| ((s.location.line, s.location.column, s.kind.to_string()), s))
            .collect();

        Self {
            resolver,
            content,
            file,
            imports,
            declared,
            ctx,
            file_id: file_symbol_id(file),
            class: None,
            function: None,
            outcomes: BTreeMap::new(),
        }
    }

    fn run(&mut self, root: Node<'_>) -> Result<()> {
        for import in std::mem::take(&mut self.imports) {
            let placeholder = UseKind::placeholder(import.meta_str("use_kind"));
            let rooted = format!("{}{}", NS_SEPARATOR, import.name);
            self.link_at(&rooted, ReferenceKind::Imports, &import.location, Some(placeholder))?;
        }
        self.walk(root)
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        node_text(node, self.content)
    }

    fn declared_at(&self, node: Node<'_>, kind: &SymbolKind) -> Option<Symbol> {
        let start = node.start_position();
        self.declared
            .get(&(start.row as u32 + 1, start.column as u32 + 1, kind.to_string()))
            .cloned()
    }

    /// Innermost enclosing declaration, the file itself at top level
    fn source(&self) -> (String, SymbolKind) {
        self.function
            .as_ref()
            .or(self.class.as_ref())
            .map(|s| (s.id.clone(), s.kind.clone()))
            .unwrap_or_else(|| (self.file_id.clone(), SymbolKind::File))
    }

    fn site(&self, node: Node<'_>) -> Site {
        let start = node.start_position();
        Site {
            file: self.file.to_string(),
            line: start.row as u32 + 1,
            column: start.column as u32 + 1,
            context: Some(snippet(self.text(node))),
        }
    }

    fn record(&mut self, outcome: &LinkOutcome) {
        let key = match outcome {
            LinkOutcome::Linked(_) => "linked",
            LinkOutcome::Placeholder(_) => "placeholder",
            LinkOutcome::Unresolved => "unresolved",
            LinkOutcome::Dropped => "dropped",
        };
        *self.outcomes.entry(key).or_insert(0) += 1;
    }

    fn link(&mut self, name: &str, kind: ReferenceKind, node: Node<'_>, placeholder: Option<SymbolKind>) -> Result<()> {
        let site = self.site(node);
        self.link_site(name, kind, site, placeholder)
    }

    fn link_at(
        &mut self,
        name: &str,
        kind: ReferenceKind,
        location: &crate::index::Location,
        placeholder: Option<SymbolKind>,
    ) -> Result<()> {
        let site = Site {
            file: self.file.to_string(),
            line: location.line,
            column: location.column,
            context: None,
        };
        self.link_site(name, kind, site, placeholder)
    }

    fn link_site(&mut self, name: &str, kind: ReferenceKind, site: Site, placeholder: Option<SymbolKind>) -> Result<()> {
        let (id, source_kind) = self.source();
        let outcome = self.resolver.link_name(
            Source {
                id: &id,
                kind: &source_kind,
            },
            name,
            kind,
            &self.ctx,
            &site,
            placeholder,
        )?;
        self.record(&outcome);
        Ok(())
    }

    fn connect(&mut self, target: &Symbol, kind: ReferenceKind, node: Node<'_>) -> Result<()> {
        let (id, source_kind) = self.source();
        let site = self.site(node);
        let outcome = self.resolver.connect(
            Source {
                id: &id,
                kind: &source_kind,
            },
            target,
            kind,
            &site,
        )?;
        self.record(&outcome);
        Ok(())
    }

    fn walk(&mut self, node: Node<'_>) -> Result<()> {
        match node.kind() {
            "namespace_definition" => {
                let name = field_text(node, "name", self.content).map(|n| n.trim_start_matches(NS_SEPARATOR).to_string());
                match node.child_by_field_name("body") {
                    Some(body) => {
                        let previous = std::mem::replace(&mut self.ctx.namespace, name);
                        self.walk(body)?;
                        self.ctx.namespace = previous;
                    }
                    None => self.ctx.namespace = name,
                }
                return Ok(());
            }
            "class_declaration" | "interface_declaration" | "trait_declaration" | "enum_declaration" => {
                return self.class_like(node);
            }
            "function_definition" | "method_declaration" => return self.function_like(node),
            "object_creation_expression" => self.instantiation(node)?,
            "throw_expression" | "throw_statement" => self.throw(node)?,
            "scoped_call_expression" => self.static_call(node)?,
            "member_call_expression" => self.member_call(node)?,
            "function_call_expression" => self.function_call(node)?,
            "class_constant_access_expression" => self.constant_access(node)?,
            "scoped_property_access_expression" => self.static_property_access(node)?,
            "member_access_expression" => self.member_access(node)?,
            "binary_expression" => self.instance_of(node)?,
            _ => {}
        }

        for child in named_children(node) {
            self.walk(child)?;
        }
        Ok(())
    }

    fn class_like(&mut self, node: Node<'_>) -> Result<()> {
        let kind = match node.kind() {
            "interface_declaration" => SymbolKind::Interface,
            "trait_declaration" => SymbolKind::Trait,
            "enum_declaration" => SymbolKind::Enum,
            _ => SymbolKind::Class,
        };
        let Some(class) = self.declared_at(node, &kind) else {
            debug!("No collected {} at {}:{}", kind, self.file, node.start_position().row + 1);
            return Ok(());
        };

        let previous_class = self.class.replace(class.clone());
        let previous_function = self.function.take();
        let previous_fqn = self.ctx.current_class.replace(class.name.clone());

        let base_kind = if kind == SymbolKind::Interface {
            SymbolKind::Interface
        } else {
            SymbolKind::Class
        };
        for base in &class.extends {
            self.link(base, ReferenceKind::Extends, node, Some(base_kind.clone()))?;
        }
        for interface in &class.implements {
            self.link(interface, ReferenceKind::Implements, node, Some(SymbolKind::Interface))?;
        }
        let traits: Vec<String> = class
            .metadata
            .get("traits")
            .and_then(|v| v.as_array())
            .map(|names| names.iter().filter_map(|n| n.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        for name in &traits {
            self.link(name, ReferenceKind::UsesTrait, node, Some(SymbolKind::Trait))?;
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body)?;
        }

        self.class = previous_class;
        self.function = previous_function;
        self.ctx.current_class = previous_fqn;
        Ok(())
    }

    fn function_like(&mut self, node: Node<'_>) -> Result<()> {
        let kind = if node.kind() == "method_declaration" {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        let Some(function) = self.declared_at(node, &kind) else {
            for child in named_children(node) {
                self.walk(child)?;
            }
            return Ok(());
        };

        let previous_function = self.function.replace(function.clone());
        let previous_id = self.ctx.current_function.replace(function.id.clone());

        for hint in function.parameters.iter().filter_map(|p| p.type_hint.as_deref()) {
            for name in type_names(hint) {
                self.link(&name, ReferenceKind::ParameterType, node, Some(SymbolKind::Class))?;
            }
        }
        if let Some(hint) = function.return_type.as_deref() {
            for name in type_names(hint) {
                self.link(&name, ReferenceKind::Returns, node, Some(SymbolKind::Class))?;
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body)?;
        }

        self.function = previous_function;
        self.ctx.current_function = previous_id;
        Ok(())
    }

    fn instantiation(&mut self, node: Node<'_>) -> Result<()> {
        if let Some(class) = child_of_kind(node, SCOPE_KINDS) {
            let name = self.text(class);
            self.link(name, ReferenceKind::Instantiates, node, Some(SymbolKind::Class))?;
        }
        Ok(())
    }

    fn throw(&mut self, node: Node<'_>) -> Result<()> {
        let Some(creation) = child_of_kind(node, &["object_creation_expression"]) else {
            return Ok(());
        };
        if let Some(class) = child_of_kind(creation, SCOPE_KINDS) {
            let name = self.text(class);
            self.link(name, ReferenceKind::Throws, node, Some(SymbolKind::Class))?;
        }
        Ok(())
    }

    /// Class named by a `scope` node, when it resolves
    fn scope_class(&self, scope: Node<'_>) -> Result<Option<Symbol>> {
        if !SCOPE_KINDS.contains(&scope.kind()) {
            return Ok(None);
        }
        Ok(self.resolver.resolve(self.text(scope), &self.ctx)?)
    }

    /// `Scope::member` reference: to the member when found, else the class,
    /// else a placeholder for the class.
    fn scoped_member(
        &mut self,
        node: Node<'_>,
        scope: Node<'_>,
        member: &str,
        member_kinds: &[SymbolKind],
        kind: ReferenceKind,
    ) -> Result<()> {
        if !SCOPE_KINDS.contains(&scope.kind()) {
            return Ok(());
        }

        match self.scope_class(scope)? {
            Some(class) => {
                let target = match self.resolver.resolve_member(&class, member, member_kinds)? {
                    Some(found) => found,
                    None => class,
                };
                self.connect(&target, kind, node)
            }
            None => {
                let name = self.text(scope);
                self.link(name, kind, node, Some(SymbolKind::Class))
            }
        }
    }

    fn static_call(&mut self, node: Node<'_>) -> Result<()> {
        let (Some(scope), Some(name)) = (node.child_by_field_name("scope"), field_text(node, "name", self.content)) else {
            return Ok(());
        };
        self.scoped_member(node, scope, name, &[SymbolKind::Method], ReferenceKind::CallsStatic)
    }

    fn constant_access(&mut self, node: Node<'_>) -> Result<()> {
        let children = named_children(node);
        let (Some(scope), Some(member)) = (children.first().copied(), children.get(1).copied()) else {
            return Ok(());
        };
        let member = self.text(member);
        if member == "class" {
            return match self.scope_class(scope)? {
                Some(class) => self.connect(&class, ReferenceKind::Accesses, node),
                None if SCOPE_KINDS.contains(&scope.kind()) => {
                    let name = self.text(scope);
                    self.link(name, ReferenceKind::Accesses, node, Some(SymbolKind::Class))
                }
                None => Ok(()),
            };
        }
        self.scoped_member(node, scope, member, &[SymbolKind::Constant], ReferenceKind::Accesses)
    }

    fn static_property_access(&mut self, node: Node<'_>) -> Result<()> {
        let (Some(scope), Some(name)) = (node.child_by_field_name("scope"), field_text(node, "name", self.content)) else {
            return Ok(());
        };
        let name = name.trim_start_matches('$');
        self.scoped_member(node, scope, name, &[SymbolKind::Property], ReferenceKind::Accesses)
    }

    /// Member of the enclosing class when the receiver is `$this`
    fn this_member(&self, node: Node<'_>, kinds: &[SymbolKind]) -> Result<Option<Symbol>> {
        let receiver = field_text(node, "object", self.content);
        let (Some("$this"), Some(class), Some(name)) = (receiver, self.class.as_ref(), field_text(node, "name", self.content)) else {
            return Ok(None);
        };
        Ok(self.resolver.resolve_member(class, name, kinds)?)
    }

    fn member_call(&mut self, node: Node<'_>) -> Result<()> {
        match self.this_member(node, &[SymbolKind::Method])? {
            Some(method) => self.connect(&method, ReferenceKind::Calls, node),
            None => {
                // Receiver types are not inferred
                *self.outcomes.entry("dynamic").or_insert(0) += 1;
                Ok(())
            }
        }
    }

    fn member_access(&mut self, node: Node<'_>) -> Result<()> {
        if let Some(property) = self.this_member(node, &[SymbolKind::Property])? {
            self.connect(&property, ReferenceKind::Accesses, node)?;
        }
        Ok(())
    }

    fn function_call(&mut self, node: Node<'_>) -> Result<()> {
        let Some(function) = node.child_by_field_name("function") else {
            return Ok(());
        };
        if !NAME_KINDS.contains(&function.kind()) {
            return Ok(());
        }
        let name = self.text(function);
        self.link(name, ReferenceKind::Calls, node, None)
    }

    fn instance_of(&mut self, node: Node<'_>) -> Result<()> {
        if field_text(node, "operator", self.content) != Some("instanceof") {
            return Ok(());
        }
        let Some(right) = node.child_by_field_name("right") else {
            return Ok(());
        };
        if !NAME_KINDS.contains(&right.kind()) {
            return Ok(());
        }
        let name = self.text(right);
        self.link(name, ReferenceKind::InstanceOf, node, Some(SymbolKind::Class))
    }
}
