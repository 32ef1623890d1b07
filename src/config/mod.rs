//! TOML configuration with `CHUNKGRAPH_*` environment overrides
//!
//! Precedence, highest first: environment, config file, built-in defaults.
use crate::error::{ChunkGraphError, ConfigError};
use crate::indexer::DependencyStrategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything the pipeline, store and surfaces can be tuned with
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chunk store configuration
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Project registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Chunk store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store backend: "lancedb" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Directory holding the LanceDB dataset
    #[serde(default = "default_lancedb_path")]
    pub lancedb_path: PathBuf,

    /// Table holding code chunks
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

/// Embedding model and request policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// FastEmbed model identifier, e.g. "all-MiniLM-L6-v2"
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Number of chunks sent per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Timeout in seconds for one embedding batch
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Attempts per batch before the run fails
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff between attempts
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Hard character budget per embedded text
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Prefix embedded text with the chunk's path and name
    #[serde(default = "default_annotate_path")]
    pub annotate_path: bool,
}

/// Which files are extracted and how the graph is resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Source file extensions considered for extraction
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names skipped anywhere in the tree
    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,

    /// Files larger than this many bytes are skipped
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// How raw dependency names are collected per chunk
    #[serde(default)]
    pub dependency_strategy: DependencyStrategy,

    /// Resolve incremental runs against persisted chunks as well as the run's own chunks
    #[serde(default)]
    pub resolve_against_store: bool,

    /// Delete persisted chunks whose symbol or file disappeared
    #[serde(default = "default_prune_stale_chunks")]
    pub prune_stale_chunks: bool,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Similarity floor used when a request gives none
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Default result limit
    #[serde(default = "default_result_limit")]
    pub limit: usize,
}

/// Project registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// JSON file listing registered projects
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

fn default_store_backend() -> String {
    "lancedb".to_string()
}

fn default_lancedb_path() -> PathBuf {
    crate::paths::PlatformPaths::default_lancedb_path()
}

fn default_table_name() -> String {
    "code_chunks".to_string()
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_batch_size() -> usize {
    300
}

fn default_embedding_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_max_input_chars() -> usize {
    8_000
}

fn default_annotate_path() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    ["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ignored_dirs() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "dist",
        "build",
        "coverage",
        ".next",
        "out",
        "target",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_file_size() -> usize {
    1_048_576 // 1 MB
}

fn default_prune_stale_chunks() -> bool {
    true
}

fn default_min_score() -> f32 {
    0.5
}

fn default_result_limit() -> usize {
    10
}

fn default_registry_path() -> PathBuf {
    crate::paths::PlatformPaths::default_registry_path()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            lancedb_path: default_lancedb_path(),
            table_name: default_table_name(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_input_chars: default_max_input_chars(),
            annotate_path: default_annotate_path(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignored_dirs: default_ignored_dirs(),
            max_file_size: default_max_file_size(),
            dependency_strategy: DependencyStrategy::default(),
            resolve_against_store: false,
            prune_stale_chunks: default_prune_stale_chunks(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            limit: default_result_limit(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

impl EmbeddingConfig {
    /// Retry policy applied to each embedding batch
    pub fn retry_policy(&self) -> crate::retry::RetryPolicy {
        crate::retry::RetryPolicy::new(
            self.max_retries,
            std::time::Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

impl Config {
    /// Parse and validate a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ChunkGraphError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Read the platform config file if present, else fall back to defaults
    pub fn load_or_default() -> Result<Self, ChunkGraphError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Using config file {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Write this config as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ChunkGraphError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::debug!("Wrote config to {}", path.display());
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ChunkGraphError> {
        if self.store.backend != "lancedb" && self.store.backend != "memory" {
            return Err(invalid(
                "store.backend",
                format!("must be 'lancedb' or 'memory', got '{}'", self.store.backend),
            ));
        }

        if self.store.table_name.trim().is_empty() {
            return Err(invalid("store.table_name", "must not be empty"));
        }

        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be greater than 0"));
        }

        if self.embedding.max_retries == 0 {
            return Err(invalid("embedding.max_retries", "must be at least 1"));
        }

        if self.embedding.max_input_chars == 0 {
            return Err(invalid("embedding.max_input_chars", "must be greater than 0"));
        }

        if self.indexing.extensions.is_empty() {
            return Err(invalid("indexing.extensions", "must list at least one extension"));
        }

        if let Some(ext) = self
            .indexing
            .extensions
            .iter()
            .find(|ext| crate::indexer::SourceLanguage::from_extension(ext).is_none())
        {
            return Err(invalid(
                "indexing.extensions",
                format!("'{}' is not a TypeScript or JavaScript extension", ext),
            ));
        }

        if self.indexing.max_file_size == 0 {
            return Err(invalid("indexing.max_file_size", "must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.search.min_score) {
            return Err(invalid(
                "search.min_score",
                format!("must be between 0.0 and 1.0, got {}", self.search.min_score),
            ));
        }

        if self.search.limit == 0 {
            return Err(invalid("search.limit", "must be greater than 0"));
        }

        Ok(())
    }

    /// Overlay `CHUNKGRAPH_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var("CHUNKGRAPH_DB_BACKEND") {
            self.store.backend = backend;
        }

        if let Ok(path) = std::env::var("CHUNKGRAPH_LANCEDB_PATH") {
            self.store.lancedb_path = PathBuf::from(path);
        }

        if let Ok(model) = std::env::var("CHUNKGRAPH_MODEL") {
            self.embedding.model_name = model;
        }

        if let Ok(batch_size) = std::env::var("CHUNKGRAPH_BATCH_SIZE")
            && let Ok(size) = batch_size.parse()
        {
            self.embedding.batch_size = size;
        }

        if let Ok(min_score) = std::env::var("CHUNKGRAPH_MIN_SCORE")
            && let Ok(score) = min_score.parse()
        {
            self.search.min_score = score;
        }

        if let Ok(path) = std::env::var("CHUNKGRAPH_REGISTRY_PATH") {
            self.registry.path = PathBuf::from(path);
        }

        if let Ok(strategy) = std::env::var("CHUNKGRAPH_DEPENDENCY_STRATEGY") {
            match strategy.parse() {
                Ok(parsed) => self.indexing.dependency_strategy = parsed,
                Err(e) => tracing::warn!("Ignoring CHUNKGRAPH_DEPENDENCY_STRATEGY: {}", e),
            }
        }
    }

    /// Platform config file (or defaults) plus environment overrides
    pub fn new() -> Result<Self, ChunkGraphError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit config file, then apply environment overrides
    pub fn from_path_with_env(path: &Path) -> Result<Self, ChunkGraphError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ChunkGraphError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

#[cfg(test)]
mod tests;
