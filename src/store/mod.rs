//! Chunk persistence
//!
//! Every backend upserts by `(project, path, name)`: at most one row per key survives,
//! and a replaced row hands its `id` and `created_at` to the incoming chunk.

mod keyword_index;
mod lance_store;
mod memory;
pub mod upsert;

pub use keyword_index::KeywordIndex;
pub use lance_store::LanceChunkStore;
pub use memory::MemoryChunkStore;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::indexer::CodeChunk;
use crate::retry::{RetryPolicy, retry_with_backoff};
use anyhow::Result;
use std::sync::Arc;

/// A chunk returned from a search with its relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: CodeChunk,
    pub score: f32,
}

/// Trait for chunk store operations
#[async_trait::async_trait]
pub trait ChunkStore: Send + Sync {
    /// Prepare storage for vectors of the given dimension
    async fn initialize(&self, dimension: usize) -> Result<()>;

    /// Insert or replace chunks by `(path, name)`. Returns the number of rows written.
    async fn upsert_chunks(&self, project_id: &str, chunks: Vec<CodeChunk>) -> Result<usize>;

    async fn get_chunks_by_project(&self, project_id: &str) -> Result<Vec<CodeChunk>>;

    async fn count_chunks(&self, project_id: &str) -> Result<usize>;

    /// Delete the given chunk ids. Returns the number removed.
    async fn delete_chunks(&self, project_id: &str, ids: &[String]) -> Result<usize>;

    /// Delete every chunk of a project. Returns the number removed.
    async fn delete_project(&self, project_id: &str) -> Result<usize>;

    /// Nearest chunks to `vector`, scored `1 / (1 + distance)` and thresholded by `min_score`
    async fn search_similar(
        &self,
        project_id: &str,
        vector: Vec<f32>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredChunk>>;

    /// Keyword matches over chunk names and code, best first
    async fn search_keyword(
        &self,
        project_id: &str,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Build the store selected by `store.backend`
pub async fn create_store(config: &StoreConfig, retry: &RetryPolicy) -> Result<Arc<dyn ChunkStore>> {
    match config.backend.as_str() {
        "lancedb" => {
            let path = config.lancedb_path.to_string_lossy().to_string();
            let store = retry_with_backoff(retry, "Connecting to LanceDB", || {
                LanceChunkStore::with_path(&path, &config.table_name)
            })
            .await?;
            Ok(Arc::new(store))
        }
        "memory" => {
            tracing::info!("Using in-memory chunk store; nothing will be persisted");
            Ok(Arc::new(MemoryChunkStore::new()))
        }
        other => Err(StoreError::UnknownBackend(other.to_string()).into()),
    }
}

/// Quote a value for a LanceDB SQL filter
pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub(crate) fn sql_in_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    values
        .into_iter()
        .map(sql_literal)
        .collect::<Vec<_>>()
        .join(", ")
}
