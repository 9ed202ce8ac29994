// Symbol graph data model

pub mod schema;
pub mod db;

use serde::{Deserialize, Serialize};

/// Kinds that name a type-like or namespace-level entity. Only these take part
/// in qualified-name resolution; file and directory symbols never do.
pub const TYPE_BEARING_KINDS: &[SymbolKind] = &[
    SymbolKind::Class,
    SymbolKind::Interface,
    SymbolKind::Trait,
    SymbolKind::Enum,
    SymbolKind::Function,
    SymbolKind::Namespace,
    SymbolKind::TypeAlias,
    SymbolKind::Constant,
];

/// Symbol kinds
///
/// `Other` carries extension kinds introduced by language modules or plugins
/// (`api_call`, `api_route`, `jsx_element`, ...) without widening this enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SymbolKind {
    Class,
    Interface,
    Trait,
    Enum,
    Function,
    Method,
    Property,
    Constant,
    Namespace,
    File,
    Directory,
    Variable,
    Import,
    TypeAlias,
    Other(String),
}

impl SymbolKind {
    pub fn as_str(&self) -> &str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Trait => "trait",
            SymbolKind::Enum => "enum",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Constant => "constant",
            SymbolKind::Namespace => "namespace",
            SymbolKind::File => "file",
            SymbolKind::Directory => "directory",
            SymbolKind::Variable => "variable",
            SymbolKind::Import => "import",
            SymbolKind::TypeAlias => "type_alias",
            SymbolKind::Other(kind) => kind,
        }
    }

    /// Extension kind owned by a language module or plugin.
    pub fn extension(kind: &str) -> Self {
        SymbolKind::from(kind)
    }

    pub fn is_type_bearing(&self) -> bool {
        TYPE_BEARING_KINDS.contains(self)
    }

    /// Classes, interfaces, traits and enums: things members hang off.
    pub fn is_classlike(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::Interface | SymbolKind::Trait | SymbolKind::Enum
        )
    }
}

impl From<&str> for SymbolKind {
    fn from(s: &str) -> Self {
        match s {
            "class" => SymbolKind::Class,
            "interface" => SymbolKind::Interface,
            "trait" => SymbolKind::Trait,
            "enum" => SymbolKind::Enum,
            "function" => SymbolKind::Function,
            "method" => SymbolKind::Method,
            "property" => SymbolKind::Property,
            "constant" => SymbolKind::Constant,
            "namespace" => SymbolKind::Namespace,
            "file" => SymbolKind::File,
            "directory" => SymbolKind::Directory,
            "variable" => SymbolKind::Variable,
            "import" => SymbolKind::Import,
            "type_alias" => SymbolKind::TypeAlias,
            other => SymbolKind::Other(other.to_string()),
        }
    }
}

impl From<String> for SymbolKind {
    fn from(s: String) -> Self {
        SymbolKind::from(s.as_str())
    }
}

impl From<SymbolKind> for String {
    fn from(kind: SymbolKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference (edge) kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReferenceKind {
    Calls,
    CallsStatic,
    Extends,
    Implements,
    UsesTrait,
    Imports,
    Instantiates,
    Throws,
    Accesses,
    Returns,
    ParameterType,
    InstanceOf,
    Contains,
    Defines,
    /// Frontend call site reaching a backend handler.
    CallsEndpoint,
    Other(String),
}

impl ReferenceKind {
    pub fn as_str(&self) -> &str {
        match self {
            ReferenceKind::Calls => "CALLS",
            ReferenceKind::CallsStatic => "CALLS_STATIC",
            ReferenceKind::Extends => "EXTENDS",
            ReferenceKind::Implements => "IMPLEMENTS",
            ReferenceKind::UsesTrait => "USES_TRAIT",
            ReferenceKind::Imports => "IMPORTS",
            ReferenceKind::Instantiates => "INSTANTIATES",
            ReferenceKind::Throws => "THROWS",
            ReferenceKind::Accesses => "ACCESSES",
            ReferenceKind::Returns => "RETURNS",
            ReferenceKind::ParameterType => "PARAMETER_TYPE",
            ReferenceKind::InstanceOf => "INSTANCEOF",
            ReferenceKind::Contains => "CONTAINS",
            ReferenceKind::Defines => "DEFINES",
            ReferenceKind::CallsEndpoint => "CALLS_ENDPOINT",
            ReferenceKind::Other(kind) => kind,
        }
    }

    /// EXTENDS, IMPLEMENTS and USES_TRAIT are checked for kind compatibility
    /// before they are stored.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ReferenceKind::Extends | ReferenceKind::Implements | ReferenceKind::UsesTrait
        )
    }
}

impl From<&str> for ReferenceKind {
    fn from(s: &str) -> Self {
        match s {
            "CALLS" => ReferenceKind::Calls,
            "CALLS_STATIC" => ReferenceKind::CallsStatic,
            "EXTENDS" => ReferenceKind::Extends,
            "IMPLEMENTS" => ReferenceKind::Implements,
            "USES_TRAIT" => ReferenceKind::UsesTrait,
            "IMPORTS" => ReferenceKind::Imports,
            "INSTANTIATES" => ReferenceKind::Instantiates,
            "THROWS" => ReferenceKind::Throws,
            "ACCESSES" => ReferenceKind::Accesses,
            "RETURNS" => ReferenceKind::Returns,
            "PARAMETER_TYPE" => ReferenceKind::ParameterType,
            "INSTANCEOF" => ReferenceKind::InstanceOf,
            "CONTAINS" => ReferenceKind::Contains,
            "DEFINES" => ReferenceKind::Defines,
            "CALLS_ENDPOINT" => ReferenceKind::CallsEndpoint,
            other => ReferenceKind::Other(other.to_string()),
        }
    }
}

impl From<String> for ReferenceKind {
    fn from(s: String) -> Self {
        ReferenceKind::from(s.as_str())
    }
}

impl From<ReferenceKind> for String {
    fn from(kind: ReferenceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Some(Visibility::Public),
            "protected" => Some(Visibility::Protected),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

/// Location in source code, 1-based
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            end_line: line,
            end_column: column,
        }
    }

    pub fn with_end(mut self, end_line: u32, end_column: u32) -> Self {
        self.end_line = end_line;
        self.end_column = end_column;
        self
    }
}

/// A declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
}

/// A named, located program entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub location: Location,
    pub namespace: Option<String>,
    pub parent_id: Option<String>,
    pub visibility: Option<Visibility>,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    pub return_type: Option<String>,
    pub parameters: Vec<Parameter>,
    pub extends: Vec<String>,
    pub implements: Vec<String>,
    pub language: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Synthesized placeholder for a name with no declaration in the project.
    pub external: bool,
    /// Filled in by the store on write.
    pub content_hash: String,
}

impl Symbol {
    /// Creates a symbol whose id is derived from its file, start position,
    /// kind and name.
    pub fn new(kind: SymbolKind, name: impl Into<String>, location: Location, language: &str) -> Self {
        let name = name.into();
        let id = symbol_id(&location.file, location.line, location.column, &kind, &name);

        Self {
            id,
            name,
            kind,
            location,
            namespace: None,
            parent_id: None,
            visibility: None,
            is_static: false,
            is_abstract: false,
            is_final: false,
            return_type: None,
            parameters: Vec::new(),
            extends: Vec::new(),
            implements: Vec::new(),
            language: language.to_string(),
            metadata: serde_json::Map::new(),
            external: false,
            content_hash: String::new(),
        }
    }

    /// Placeholder standing in for a name that could not be resolved.
    pub fn external(kind: SymbolKind, name: &str, internal: bool) -> Self {
        let mut symbol = Self::new(kind, name, Location::default(), "external");
        symbol.id = external_symbol_id(&symbol.kind, name);
        symbol.external = true;
        let flag = if internal { "is_unresolved_internal" } else { "is_external" };
        symbol.metadata.insert(flag.to_string(), serde_json::Value::Bool(true));
        symbol
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Hash of the fields that matter for the graph. Positions are covered by
    /// the id; everything else a re-parse could change is hashed here.
    pub fn compute_content_hash(&self) -> String {
        let semantic = serde_json::json!([
            self.name,
            self.kind.as_str(),
            self.location.end_line,
            self.location.end_column,
            self.namespace,
            self.parent_id,
            self.visibility.map(|v| v.as_str()),
            self.is_static,
            self.is_abstract,
            self.is_final,
            self.return_type,
            self.parameters,
            self.extends,
            self.implements,
            self.language,
            self.metadata,
            self.external,
        ]);
        blake3::hash(semantic.to_string().as_bytes()).to_hex().to_string()
    }
}

/// Directed, typed relationship between two symbols
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub source_id: String,
    pub target_id: String,
    pub kind: ReferenceKind,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: Option<String>,
}

/// Content-derived symbol id: stable across re-analysis of unchanged source.
pub fn symbol_id(file: &str, line: u32, column: u32, kind: &SymbolKind, name: &str) -> String {
    let key = format!("{}\0{}\0{}\0{}\0{}", file, line, column, kind.as_str(), name);
    blake3::hash(key.as_bytes()).to_hex()[..32].to_string()
}

pub fn external_symbol_id(kind: &SymbolKind, name: &str) -> String {
    symbol_id("<external>", 0, 0, kind, name)
}

/// Id of the skeleton symbol for a file path (relative, `/`-separated).
pub fn file_symbol_id(path: &str) -> String {
    symbol_id(path, 1, 1, &SymbolKind::File, path)
}

pub fn directory_symbol_id(path: &str) -> String {
    symbol_id(path, 1, 1, &SymbolKind::Directory, path)
}

pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_kind_round_trip_through_strings() {
        assert_eq!(SymbolKind::from("type_alias"), SymbolKind::TypeAlias);
        assert_eq!(SymbolKind::from("api_call"), SymbolKind::Other("api_call".to_string()));
        assert_eq!(ReferenceKind::from("ROUTES_TO_CONTROLLER").as_str(), "ROUTES_TO_CONTROLLER");
        assert!(ReferenceKind::Implements.is_structural());
        assert!(!ReferenceKind::Calls.is_structural());
    }

    #[test]
    fn test_file_and_directory_are_not_type_bearing() {
        assert!(!SymbolKind::File.is_type_bearing());
        assert!(!SymbolKind::Directory.is_type_bearing());
        assert!(SymbolKind::Interface.is_type_bearing());
    }

    #[test]
    fn test_external_symbol_flags() {
        let internal = Symbol::external(SymbolKind::Class, "App\\Missing", true);
        assert!(internal.external);
        assert_eq!(internal.metadata.get("is_unresolved_internal"), Some(&serde_json::Value::Bool(true)));

        let vendor = Symbol::external(SymbolKind::Class, "Vendor\\Thing", false);
        assert_eq!(vendor.metadata.get("is_external"), Some(&serde_json::Value::Bool(true)));
        assert_eq!(vendor.id, external_symbol_id(&SymbolKind::Class, "Vendor\\Thing"));
    }

    #[test]
    fn test_content_hash_tracks_semantic_fields() {
        let a = Symbol::new(SymbolKind::Class, "App\\Base", Location::new("a.php", 3, 1), "php");
        let mut b = a.clone();
        assert_eq!(a.compute_content_hash(), b.compute_content_hash());

        b.extends.push("Model".to_string());
        assert_ne!(a.compute_content_hash(), b.compute_content_hash());
    }

    proptest! {
        #[test]
        fn symbol_ids_are_deterministic(file in "[a-z/]{1,20}\\.php", line in 1u32..10_000, column in 1u32..200, name in "[A-Za-z_]{1,12}") {
            let first = symbol_id(&file, line, column, &SymbolKind::Class, &name);
            let second = symbol_id(&file, line, column, &SymbolKind::Class, &name);
            prop_assert_eq!(&first, &second);
            prop_assert_ne!(first, symbol_id(&file, line, column, &SymbolKind::Interface, &name));
        }
    }
}
