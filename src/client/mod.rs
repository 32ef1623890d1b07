//! Core library client for chunkgraph
//!
//! Owns the collaborators (embedder, chunk store, version control, project registry)
//! and exposes every operation the MCP server and CLI offer.

mod index_lock;
mod indexing;

use crate::config::Config;
use crate::embedding::{EmbeddingProvider, EmbeddingRequestor, FastEmbedManager};
use crate::error::ValidationError;
use crate::graph;
use crate::registry::{Project, ProjectRegistry};
use crate::store::{ChunkStore, create_store};
use crate::types::*;
use crate::vcs::{GitVersionControl, VersionControl};
use anyhow::{Context, Result};
use index_lock::{IndexLockResult, IndexLocks};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Main client for indexing projects and querying their chunks
///
/// # Example
///
/// ```no_run
/// use chunkgraph::{AnalyzeProjectRequest, ChunkGraphClient, CreateProjectRequest};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = ChunkGraphClient::new().await?;
///
///     client
///         .create_project(CreateProjectRequest {
///             name: "webapp".to_string(),
///             path: "/path/to/webapp".to_string(),
///             description: None,
///         })
///         .await?;
///
///     let response = client
///         .analyze_project(AnalyzeProjectRequest {
///             project: "webapp".to_string(),
///             force_full: false,
///         })
///         .await?;
///     println!("Indexed {} chunks", response.chunks_indexed);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ChunkGraphClient {
    pub(crate) config: Arc<Config>,
    pub(crate) embedder: Arc<EmbeddingRequestor>,
    pub(crate) store: Arc<dyn ChunkStore>,
    pub(crate) vcs: Arc<dyn VersionControl>,
    pub(crate) registry: Arc<RwLock<ProjectRegistry>>,
    pub(crate) registry_path: PathBuf,
    // In-progress analyze runs, keyed by project id
    pub(crate) indexing_ops: IndexLocks,
}

impl ChunkGraphClient {
    /// Create a client from the default configuration file and environment
    pub async fn new() -> Result<Self> {
        let config = Config::new().context("Failed to load configuration")?;
        Self::with_config(config).await
    }

    /// Create a client with the configured fastembed model, store backend and git
    pub async fn with_config(config: Config) -> Result<Self> {
        tracing::info!("Initializing chunkgraph client");
        tracing::debug!("Store backend: {}", config.store.backend);
        tracing::debug!("Embedding model: {}", config.embedding.model_name);

        let model_name = config.embedding.model_name.clone();
        let provider = tokio::task::spawn_blocking(move || FastEmbedManager::from_model_name(&model_name))
            .await
            .context("Embedding model loader panicked")?
            .context("Failed to initialize embedding provider")?;

        let store = create_store(&config.store, &config.embedding.retry_policy())
            .await
            .context("Failed to open chunk store")?;

        let registry_path = config.registry.path.clone();
        Self::with_components(
            config,
            Arc::new(provider),
            store,
            Arc::new(GitVersionControl::new()),
            registry_path,
        )
        .await
    }

    /// Create a client from explicit collaborators
    pub async fn with_components(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn ChunkStore>,
        vcs: Arc<dyn VersionControl>,
        registry_path: PathBuf,
    ) -> Result<Self> {
        store
            .initialize(provider.dimension())
            .await
            .context("Failed to initialize chunk store")?;

        let registry = ProjectRegistry::load(&registry_path)?;
        tracing::info!("Using project registry: {:?}", registry_path);

        let embedder = EmbeddingRequestor::new(provider, &config.embedding);

        Ok(Self {
            config: Arc::new(config),
            embedder: Arc::new(embedder),
            store,
            vcs,
            registry: Arc::new(RwLock::new(registry)),
            registry_path,
            indexing_ops: IndexLocks::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Canonicalize a user-supplied project path and check it is a directory
    fn canonical_project_path(path: &str) -> Result<PathBuf> {
        let raw = Path::new(path);
        if !raw.exists() {
            return Err(ValidationError::PathNotFound(path.to_string()).into());
        }
        if !raw.is_dir() {
            return Err(ValidationError::NotADirectory(path.to_string()).into());
        }
        std::fs::canonicalize(raw).with_context(|| format!("Failed to canonicalize path: {}", path))
    }

    pub(crate) async fn resolve_project(&self, id_or_name: &str) -> Result<Project> {
        let registry = self.registry.read().await;
        Ok(registry.resolve(id_or_name)?.clone())
    }

    /// Register a project rooted inside a version-controlled working copy
    pub async fn create_project(&self, request: CreateProjectRequest) -> Result<ProjectInfo> {
        request.validate().map_err(|e| anyhow::anyhow!(e))?;

        let path = Self::canonical_project_path(&request.path)?;
        if !self.vcs.is_working_copy(&path) {
            return Err(ValidationError::NotAWorkingCopy(path.display().to_string()).into());
        }

        let mut registry = self.registry.write().await;
        let project = registry.create(request.name.trim(), path, request.description)?;
        if let Err(e) = registry.save(&self.registry_path) {
            registry.remove(&project.id)?;
            return Err(e.into());
        }

        tracing::info!("Created project '{}' ({}) at {:?}", project.name, project.id, project.path);
        Ok(ProjectInfo::from(&project))
    }

    pub async fn list_projects(&self) -> Result<ListProjectsResponse> {
        let registry = self.registry.read().await;
        Ok(ListProjectsResponse {
            projects: registry.list().iter().map(ProjectInfo::from).collect(),
        })
    }

    /// Delete a project's chunks, then the project itself
    pub async fn delete_project(&self, request: DeleteProjectRequest) -> Result<DeleteProjectResponse> {
        request.validate().map_err(|e| anyhow::anyhow!(e))?;
        let project = self.resolve_project(&request.project).await?;

        let chunks_deleted = self
            .store
            .delete_project(&project.id)
            .await
            .context("Failed to delete project chunks")?;

        let mut registry = self.registry.write().await;
        registry.remove(&project.id)?;
        registry.save(&self.registry_path)?;

        tracing::info!(
            "Deleted project '{}' and {} chunk(s)",
            project.name,
            chunks_deleted
        );
        Ok(DeleteProjectResponse {
            project_id: project.id,
            name: project.name,
            chunks_deleted,
        })
    }

    /// Extract, embed and persist a project's chunks
    ///
    /// Runs incrementally when version control reports a previous revision, fully on
    /// the first run or when `force_full` is set, and skips when nothing changed.
    /// Concurrent calls for the same project share one run.
    pub async fn analyze_project(&self, request: AnalyzeProjectRequest) -> Result<AnalyzeResponse> {
        request.validate().map_err(|e| anyhow::anyhow!(e))?;
        let project_id = self.resolve_project(&request.project).await?.id;

        loop {
            match index_lock::try_acquire(&self.indexing_ops, &project_id).await {
                IndexLockResult::WaitForResult(mut receiver) => match receiver.recv().await {
                    Ok(result) => {
                        tracing::info!("Received result from concurrent analyze run");
                        return result.map_err(|e| anyhow::anyhow!(e));
                    }
                    Err(_) => {
                        // The run finished between subscribing and receiving
                        tracing::debug!("Concurrent analyze run closed without a result, retrying");
                        continue;
                    }
                },
                IndexLockResult::Acquired(lock) => {
                    // Re-read under the lock: a previous run may have moved the revision
                    let result = match self.resolve_project(&project_id).await {
                        Ok(project) => indexing::analyze(self, &project, request.force_full).await,
                        Err(e) => Err(e),
                    };

                    match &result {
                        Ok(response) => lock.broadcast_result(&Ok(response.clone())),
                        Err(e) => {
                            tracing::error!("Analyze failed for project {}: {:#}", project_id, e);
                            lock.broadcast_result(&Err(format!("{:#}", e)));
                        }
                    }
                    lock.release().await;
                    return result;
                }
            }
        }
    }

    /// Similarity search: embed the query and look up the nearest chunks
    pub async fn search_chunks(&self, request: SearchChunksRequest) -> Result<SearchResponse> {
        request.validate().map_err(|e| anyhow::anyhow!(e))?;
        let start = Instant::now();
        let project = self.resolve_project(&request.project).await?;

        let query_embedding = self
            .embedder
            .embed_query(&request.query)
            .await
            .context("Failed to generate query embedding")?;

        let limit = request.limit.unwrap_or(self.config.search.limit);
        let min_score = request.min_score.unwrap_or(self.config.search.min_score);
        let results = self
            .store
            .search_similar(&project.id, query_embedding, limit, min_score)
            .await
            .context("Similarity search failed")?;

        Ok(SearchResponse {
            results: results.into_iter().map(ChunkResult::from).collect(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// BM25 keyword search over chunk names and code
    pub async fn search_keyword(&self, request: KeywordSearchRequest) -> Result<SearchResponse> {
        request.validate().map_err(|e| anyhow::anyhow!(e))?;
        let start = Instant::now();
        let project = self.resolve_project(&request.project).await?;

        let limit = request.limit.unwrap_or(self.config.search.limit);
        let results = self
            .store
            .search_keyword(&project.id, &request.keyword, limit)
            .await
            .context("Keyword search failed")?;

        Ok(SearchResponse {
            results: results.into_iter().map(ChunkResult::from).collect(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Direct dependencies, dependents and transitive closure of a named symbol
    pub async fn chunk_dependencies(
        &self,
        request: ChunkDependenciesRequest,
    ) -> Result<ChunkDependenciesResponse> {
        request.validate().map_err(|e| anyhow::anyhow!(e))?;
        let project = self.resolve_project(&request.project).await?;

        let chunks = self
            .store
            .get_chunks_by_project(&project.id)
            .await
            .context("Failed to load project chunks")?;

        let mut matching: Vec<ChunkDependencyInfo> = chunks
            .iter()
            .filter(|c| c.name == request.name)
            .map(|c| ChunkDependencyInfo {
                id: c.id.clone(),
                path: c.path.clone(),
                chunk_type: c.chunk_type,
                line_start: c.line_start,
                line_end: c.line_end,
                dependencies: c.dependencies.clone(),
                dependents: c.dependents.clone(),
            })
            .collect();
        if matching.is_empty() {
            anyhow::bail!(
                "No chunk named '{}' in project '{}'",
                request.name,
                project.name
            );
        }
        matching.sort_by(|a, b| (&a.path, a.line_start).cmp(&(&b.path, b.line_start)));

        let transitive_dependencies = graph::transitive_dependencies(&chunks, &request.name)
            .into_iter()
            .collect();

        Ok(ChunkDependenciesResponse {
            name: request.name,
            chunks: matching,
            transitive_dependencies,
        })
    }
}

#[cfg(test)]
mod tests;
