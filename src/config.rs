// Configuration management for symgraph

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the project root
pub const CONFIG_FILE: &str = ".symgraph.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub languages: LanguagesConfig,
    pub plugins: PluginsConfig,
    pub storage: StorageConfig,
    pub indexing: IndexingConfig,
    pub resolution: ResolutionConfig,
    pub export: Option<ExportConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguagesConfig {
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database path, relative to the project root unless absolute
    pub path: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    /// Extra file extensions recorded in the file tree even when no
    /// language module claims them
    pub extensions: Vec<String>,
    pub watch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResolutionConfig {
    /// First namespace segments owned by this project; unresolved names
    /// under them become "unresolved internal" placeholders
    pub namespace_roots: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExportConfig {
    pub output: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-project".to_string(),
            root: ".".to_string(),
        }
    }
}

impl Default for LanguagesConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["php".to_string(), "javascript".to_string()],
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["file_links".to_string(), "endpoint_linker".to_string()],
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: ".symgraph.db".to_string(),
            pool_size: 4,
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude: vec![
                "vendor/".to_string(),
                "node_modules/".to_string(),
                "*.min.js".to_string(),
                "**/__tests__/**".to_string(),
                ".git/".to_string(),
                ".symgraph.db".to_string(),
            ],
            include: vec![],
            extensions: vec![],
            watch: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from project directory.
    /// Looks for .symgraph.toml in the project root; a relative
    /// `project.root` is taken relative to that directory.
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let project_dir = project_dir.as_ref();
        let config_path = project_dir.join(CONFIG_FILE);

        let mut config = match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::debug!("Could not load config from {}: {}", config_path.display(), e);
                tracing::info!("Using default configuration");
                Self::default()
            }
        };

        if Path::new(&config.project.root).is_relative() {
            config.project.root = project_dir.join(&config.project.root).to_string_lossy().to_string();
        }

        config
    }

    /// Absolute-ish project root as configured
    pub fn project_root(&self) -> PathBuf {
        PathBuf::from(&self.project.root)
    }

    /// Database location; relative paths live under the project root
    pub fn db_path(&self) -> PathBuf {
        let path = Path::new(&self.storage.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root().join(path)
        }
    }

    /// Check if a file path should be indexed based on include/exclude patterns
    pub fn should_index_file(&self, file_path: &str) -> bool {
        // Check exclude patterns first
        for pattern in &self.indexing.exclude {
            if self.matches_pattern(file_path, pattern) {
                return false;
            }
        }

        // If include patterns are specified, file must match at least one
        if !self.indexing.include.is_empty() {
            for pattern in &self.indexing.include {
                if self.matches_pattern(file_path, pattern) {
                    return true;
                }
            }
            return false;
        }

        true
    }

    /// Directories are only subject to exclude patterns
    pub fn should_enter_dir(&self, dir_path: &str) -> bool {
        let with_slash = format!("{}/", dir_path.trim_end_matches('/'));
        !self
            .indexing
            .exclude
            .iter()
            .any(|pattern| self.matches_pattern(&with_slash, pattern))
    }

    /// Simple pattern matching (supports glob-style patterns)
    fn matches_pattern(&self, file_path: &str, pattern: &str) -> bool {
        if pattern.ends_with('/') {
            // Directory pattern
            file_path.starts_with(pattern) || file_path.contains(&format!("/{}", pattern))
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            if suffix.starts_with('*') {
                // Recursive pattern like **/__tests__/**
                let inner = pattern.trim_matches('*').trim_matches('/');
                let needle = format!("/{}/", inner);
                format!("/{}", file_path).contains(&needle)
            } else {
                // File pattern like *.min.js
                file_path.ends_with(suffix)
            }
        } else {
            // Exact match or prefix
            file_path.contains(pattern)
        }
    }

    /// Get enabled languages, filtered by what's actually supported
    pub fn get_enabled_languages(&self) -> Vec<String> {
        self.languages
            .enabled
            .iter()
            .filter(|lang| crate::languages::SUPPORTED.contains(&lang.as_str()))
            .cloned()
            .collect()
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project.name.is_empty() {
            return Err(anyhow::anyhow!("Project name cannot be empty"));
        }

        for lang in &self.languages.enabled {
            if !crate::languages::SUPPORTED.contains(&lang.as_str()) {
                return Err(anyhow::anyhow!("Unsupported language: {}", lang));
            }
        }

        for plugin in &self.plugins.enabled {
            if !crate::plugins::BUILTIN.contains(&plugin.as_str()) {
                return Err(anyhow::anyhow!("Unknown plugin: {}", plugin));
            }
        }

        if self.storage.path.is_empty() {
            return Err(anyhow::anyhow!("Storage path cannot be empty"));
        }
        if self.storage.pool_size == 0 {
            return Err(anyhow::anyhow!("Pool size must be greater than 0"));
        }

        if self.resolution.namespace_roots.iter().any(|root| root.is_empty()) {
            return Err(anyhow::anyhow!("Namespace roots cannot be empty strings"));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }
        let valid_formats = ["compact", "full"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!("Invalid log format: {}", self.logging.format));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project.name, "unnamed-project");
        assert!(config.languages.enabled.contains(&"php".to_string()));
        assert!(config.plugins.enabled.contains(&"endpoint_linker".to_string()));
        assert!(config.indexing.exclude.contains(&"vendor/".to_string()));
        assert!(config.export.is_none());
    }

    #[test]
    fn test_should_index_file() {
        let config = Config::default();

        assert!(config.should_index_file("src/Controller.php"));
        assert!(config.should_index_file("web/js/app.js"));

        assert!(!config.should_index_file("vendor/laravel/Model.php"));
        assert!(!config.should_index_file("web/node_modules/axios/index.js"));
        assert!(!config.should_index_file("src/__tests__/app.js"));
        assert!(!config.should_index_file("web/js/app.min.js"));
        assert!(!config.should_index_file(".symgraph.db"));
    }

    #[test]
    fn test_should_enter_dir() {
        let config = Config::default();

        assert!(config.should_enter_dir("src"));
        assert!(!config.should_enter_dir("vendor"));
        assert!(!config.should_enter_dir("web/node_modules"));
        assert!(!config.should_enter_dir(".git"));
    }

    #[test]
    fn test_pattern_matching() {
        let config = Config::default();

        assert!(config.matches_pattern("vendor/autoload.php", "vendor/"));
        assert!(config.matches_pattern("lib/vendor/autoload.php", "vendor/"));

        assert!(config.matches_pattern("test.php", "*.php"));
        assert!(!config.matches_pattern("test.js", "*.php"));

        assert!(config.matches_pattern("src/__tests__/a.js", "**/__tests__/**"));
        assert!(config.matches_pattern("__tests__/a.js", "**/__tests__/**"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [project]
            name = "shop"

            [resolution]
            namespace_roots = ["App"]

            [export]
            output = "graph.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.project.name, "shop");
        assert_eq!(config.project.root, ".");
        assert_eq!(config.storage.path, ".symgraph.db");
        assert_eq!(config.resolution.namespace_roots, vec!["App".to_string()]);
        assert_eq!(config.export.unwrap().output.as_deref(), Some("graph.json"));
        assert!(config.languages.enabled.contains(&"javascript".to_string()));
    }

    #[test]
    fn test_db_path_is_relative_to_root() {
        let mut config = Config::default();
        config.project.root = "/srv/shop".to_string();
        assert_eq!(config.db_path(), PathBuf::from("/srv/shop/.symgraph.db"));

        config.storage.path = "/tmp/graph.db".to_string();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/graph.db"));
    }

    #[test]
    fn test_from_project_dir_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[project]\nname = \"demo\"\n\n[plugins]\nenabled = [\"file_links\"]\n",
        )
        .unwrap();

        let config = Config::from_project_dir(dir.path());

        assert_eq!(config.project.name, "demo");
        assert_eq!(config.plugins.enabled, vec!["file_links".to_string()]);
        assert_eq!(config.project_root(), dir.path().join("."));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        assert!(config.validate().is_ok());

        config.project.name = "".to_string();
        assert!(config.validate().is_err());
        config.project.name = "test".to_string();

        config.languages.enabled = vec!["cobol".to_string()];
        assert!(config.validate().is_err());
        config.languages.enabled = vec!["php".to_string()];

        config.plugins.enabled = vec!["nope".to_string()];
        assert!(config.validate().is_err());
        config.plugins.enabled = vec![];

        config.storage.pool_size = 0;
        assert!(config.validate().is_err());
        config.storage.pool_size = 2;

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "info".to_string();

        config.logging.format = "pretty".to_string();
        assert!(config.validate().is_err());
        config.logging.format = "compact".to_string();

        assert!(config.validate().is_ok());
    }
}
