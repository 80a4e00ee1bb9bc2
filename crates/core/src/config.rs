//! Configuration management.
//!
//! Configuration is merged from multiple sources, lowest precedence first:
//! - Built-in defaults
//! - Config file (`.kbqa/config.yaml` in the workspace, or `KBQA_CONFIG`)
//! - Environment variables
//! - Command-line flags (applied by the binary via [`AppConfig::with_overrides`])

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .kbqa/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Relational store settings
    pub database: DatabaseConfig,

    /// Embedding provider settings
    pub embedding: EmbeddingSettings,

    /// Vector index settings
    pub vector_index: VectorIndexSettings,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON
    pub log_json: bool,
}

/// Relational store (SQLite) settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path, relative to the workspace unless absolute.
    /// `:memory:` opens a private in-memory database.
    pub path: PathBuf,

    /// Upper bound on simultaneously open connections
    pub max_open_connections: usize,

    /// Connections kept around for reuse once released
    pub max_idle_connections: usize,

    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".kbqa/kbqa.sqlite"),
            max_open_connections: 8,
            max_idle_connections: 2,
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    /// Configuration for a private in-memory database.
    pub fn memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            max_open_connections: 1,
            max_idle_connections: 1,
            ..Default::default()
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Provider name: "mock", "ollama", "google"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Custom endpoint URL
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
            api_key_env: None,
            timeout_secs: 30,
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorIndexSettings {
    /// Backend name: "memory", "sqlite", "pinecone"
    pub provider: String,

    /// Index file for the "sqlite" backend, relative to the workspace
    pub path: PathBuf,

    /// Data-plane host URL for the "pinecone" backend
    pub host: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Optional namespace within the index
    pub namespace: Option<String>,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for VectorIndexSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            path: PathBuf::from(".kbqa/vectors.sqlite"),
            host: None,
            api_key_env: None,
            namespace: None,
            timeout_secs: 30,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    database: Option<DatabaseConfig>,
    embedding: Option<EmbeddingSettings>,
    vector_index: Option<VectorIndexSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

const EMBEDDING_PROVIDERS: [&str; 3] = ["mock", "ollama", "google"];
const VECTOR_PROVIDERS: [&str; 3] = ["memory", "sqlite", "pinecone"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            database: DatabaseConfig::default(),
            embedding: EmbeddingSettings::default(),
            vector_index: VectorIndexSettings::default(),
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file, environment variables and defaults.
    ///
    /// Environment variables:
    /// - `KBQA_WORKSPACE`: Override workspace path
    /// - `KBQA_CONFIG`: Path to config file
    /// - `KBQA_DB_PATH`: Database file
    /// - `KBQA_DB_MAX_OPEN_CONNS` / `KBQA_DB_MAX_IDLE_CONNS`: Pool bounds
    /// - `KBQA_EMBEDDING_PROVIDER` / `KBQA_EMBEDDING_MODEL`: Embedding provider
    /// - `KBQA_VECTOR_PROVIDER`: Vector index backend
    /// - `PINECONE_HOST` / `PINECONE_NAMESPACE`: Pinecone data plane
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("KBQA_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("KBQA_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.kbqa_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(database) = config_file.database {
            result.database = database;
        }
        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(vector_index) = config_file.vector_index {
            result.vector_index = vector_index;
        }
        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        Ok(result)
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(path) = std::env::var("KBQA_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(value) = std::env::var("KBQA_DB_MAX_OPEN_CONNS") {
            self.database.max_open_connections = parse_env_usize("KBQA_DB_MAX_OPEN_CONNS", &value)?;
        }
        if let Ok(value) = std::env::var("KBQA_DB_MAX_IDLE_CONNS") {
            self.database.max_idle_connections = parse_env_usize("KBQA_DB_MAX_IDLE_CONNS", &value)?;
        }
        if let Ok(provider) = std::env::var("KBQA_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Ok(model) = std::env::var("KBQA_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(provider) = std::env::var("KBQA_VECTOR_PROVIDER") {
            self.vector_index.provider = provider;
        }
        if let Ok(host) = std::env::var("PINECONE_HOST") {
            self.vector_index.host = Some(host);
        }
        if let Ok(namespace) = std::env::var("PINECONE_NAMESPACE") {
            self.vector_index.namespace = Some(namespace);
        }

        self.log_level = std::env::var("RUST_LOG").ok().or(self.log_level.take());

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        database: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(database) = database {
            self.database.path = database;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .kbqa directory.
    pub fn kbqa_dir(&self) -> PathBuf {
        self.workspace.join(".kbqa")
    }

    /// Ensure the .kbqa directory exists.
    pub fn ensure_kbqa_dir(&self) -> AppResult<()> {
        let dir = self.kbqa_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .kbqa directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolve a possibly relative path against the workspace.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.as_os_str() == ":memory:" {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Database settings with the path resolved against the workspace.
    pub fn resolved_database(&self) -> DatabaseConfig {
        DatabaseConfig {
            path: self.resolve_path(&self.database.path),
            ..self.database.clone()
        }
    }

    /// Read an API key from the named environment variable.
    pub fn resolve_api_key(env_var: Option<&str>) -> AppResult<Option<String>> {
        match env_var {
            Some(var) => std::env::var(var).map(Some).map_err(|_| {
                AppError::Config(format!("API key not found in environment variable: {}", var))
            }),
            None => Ok(None),
        }
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> AppResult<()> {
        let db = &self.database;
        if db.max_open_connections == 0 {
            return Err(AppError::Config(
                "database.max_open_connections must be at least 1".to_string(),
            ));
        }
        if db.max_idle_connections == 0 || db.max_idle_connections > db.max_open_connections {
            return Err(AppError::Config(format!(
                "database.max_idle_connections must be between 1 and {}",
                db.max_open_connections
            )));
        }

        let embedding = &self.embedding;
        if !EMBEDDING_PROVIDERS.contains(&embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }
        if embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        if embedding.provider == "google" && embedding.api_key_env.is_none() {
            return Err(AppError::Config(
                "embedding.api_key_env is required for the google provider".to_string(),
            ));
        }

        let vector = &self.vector_index;
        if !VECTOR_PROVIDERS.contains(&vector.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown vector index provider: {}. Supported: {}",
                vector.provider,
                VECTOR_PROVIDERS.join(", ")
            )));
        }
        if vector.provider == "pinecone" && (vector.host.is_none() || vector.api_key_env.is_none())
        {
            return Err(AppError::Config(
                "vector_index.host and vector_index.api_key_env are required for pinecone"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env_usize(name: &str, value: &str) -> AppResult<usize> {
    value
        .parse()
        .map_err(|_| AppError::Config(format!("{} must be a positive integer, got '{}'", name, value)))
}
