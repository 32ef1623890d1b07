/// Centralized error types for chunkgraph using thiserror
///
/// Domain errors surface at the library boundary (config, registry, request validation).
/// Internal plumbing uses `anyhow` with context and converts at the edges.
use thiserror::Error;

/// Main error type for chunkgraph
#[derive(Error, Debug)]
pub enum ChunkGraphError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Chunk store error: {0}")]
    Store(#[from] StoreError),

    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Version control error: {0}")]
    Vcs(#[from] VcsError),

    #[error("Project registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors related to embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    InitializationFailed(String),

    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),

    #[error("Unknown embedding model: {0}")]
    UnknownModel(String),

    #[error("Embedding generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding count mismatch: sent {sent} texts, received {received} vectors")]
    CountMismatch { sent: usize, received: usize },

    #[error("Model lock was poisoned: {0}")]
    LockPoisoned(String),
}

/// Errors related to the chunk store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to connect to chunk store: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create table '{table}': {reason}")]
    TableCreationFailed { table: String, reason: String },

    #[error("Failed to upsert chunks: {0}")]
    UpsertFailed(String),

    #[error("Failed to search chunks: {0}")]
    SearchFailed(String),

    #[error("Failed to delete chunks: {0}")]
    DeleteFailed(String),

    #[error("Unknown store backend: {0}")]
    UnknownBackend(String),

    #[error("Chunk store is not initialized")]
    NotInitialized,
}

/// Errors related to walking and reading project files
#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Failed to walk directory: {0}")]
    WalkFailed(String),

    #[error("Path escapes the project root: {0}")]
    PathOutsideRoot(String),
}

/// Per-file extraction failures. These are reported, never raised across files.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChunkingError {
    #[error("Failed to parse '{file}': {reason}")]
    ParseFailed { file: String, reason: String },
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Path does not exist: {0}")]
    PathNotFound(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Path is not inside a version-controlled working copy: {0}")]
    NotAWorkingCopy(String),

    #[error("Invalid project name: {0}")]
    InvalidProjectName(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project already exists: {0}")]
    DuplicateProject(String),

    #[error("{field} must be {constraint}, got {actual}")]
    ConstraintViolation {
        field: String,
        constraint: String,
        actual: String,
    },

    #[error("Empty {0}")]
    Empty(String),
}

/// Errors related to version control access
#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Repository not found at: {0}")]
    RepoNotFound(String),

    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    #[error("Failed to diff revisions: {0}")]
    DiffFailed(String),
}

/// Errors related to the persisted project registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to load project registry from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save project registry to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },
}

impl From<anyhow::Error> for ChunkGraphError {
    fn from(err: anyhow::Error) -> Self {
        ChunkGraphError::Other(format!("{:#}", err))
    }
}

impl ChunkGraphError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ChunkGraphError::Embedding(e) => e.is_retryable(),
            ChunkGraphError::Store(StoreError::ConnectionFailed(_)) | ChunkGraphError::Io(_) => true,
            _ => false,
        }
    }
}

impl EmbeddingError {
    /// Timeouts and provider failures may succeed on another attempt; a malformed
    /// response or an unusable model will not
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Timeout(_) | EmbeddingError::GenerationFailed(_)
        )
    }
}

/// Retry classification for `anyhow` errors.
///
/// The first typed error in the chain decides; errors with no typed cause (for example
/// a provider's own failure) are treated as transient.
pub fn is_transient(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<EmbeddingError>() {
            return e.is_retryable();
        }
        if let Some(e) = cause.downcast_ref::<ChunkGraphError>() {
            return e.is_retryable();
        }
    }
    true
}
