use crate::error::ValidationError;
use crate::indexer::ChunkType;
use crate::registry::Project;
use crate::store::ScoredChunk;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const MAX_LIMIT: usize = 1000;

fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field.to_string()).to_string());
    }
    Ok(())
}

fn check_limit(limit: Option<usize>) -> Result<(), String> {
    match limit {
        Some(limit) if limit == 0 || limit > MAX_LIMIT => Err(ValidationError::ConstraintViolation {
            field: "limit".to_string(),
            constraint: format!("between 1 and {}", MAX_LIMIT),
            actual: limit.to_string(),
        }
        .to_string()),
        _ => Ok(()),
    }
}

/// Request to register a project
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateProjectRequest {
    /// Unique project name (letters, digits, '-', '_' or '.')
    pub name: String,
    /// Path to the project root; must be inside a git working copy
    pub path: String,
    /// Optional free-form description
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateProjectRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_empty("project name", &self.name)?;
        require_non_empty("path", &self.path)
    }
}

/// A registered project
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
    /// Absolute project root
    pub path: String,
    pub description: Option<String>,
    /// Revision of the last successful analyze run
    pub last_commit_hash: Option<String>,
    /// Unix timestamp (seconds)
    pub created_at: i64,
}

impl From<&Project> for ProjectInfo {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            path: project.path.display().to_string(),
            description: project.description.clone(),
            last_commit_hash: project.last_commit_hash.clone(),
            created_at: project.created_at,
        }
    }
}

/// Request to list registered projects
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListProjectsRequest {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListProjectsResponse {
    pub projects: Vec<ProjectInfo>,
}

/// Request to extract, embed and store a project's chunks
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeProjectRequest {
    /// Project id or name
    pub project: String,
    /// Re-index every file even when the revision is unchanged (default: false)
    #[serde(default)]
    pub force_full: bool,
}

impl AnalyzeProjectRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_empty("project", &self.project)
    }
}

/// How an analyze run was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Every eligible file was processed
    Full,
    /// Only files changed since the last recorded revision were processed
    Incremental,
    /// Nothing changed since the last recorded revision
    Skipped,
}

/// Result of an analyze run
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeResponse {
    pub project_id: String,
    pub mode: AnalysisMode,
    /// Files extracted in this run
    pub files_processed: usize,
    /// Chunks written to the store in this run
    pub chunks_indexed: usize,
    pub embeddings_generated: usize,
    /// Changed paths reported by version control (incremental runs only)
    #[serde(default)]
    pub changed_files: Vec<String>,
    /// Stale chunks removed after the upsert
    pub chunks_pruned: usize,
    /// Dependent links written by the dependency graph pass
    pub dependency_edges: usize,
    /// Sum of every indexed chunk's transitive dependency count
    pub transitive_dependencies: usize,
    /// Chunks stored for the project after the run
    pub total_chunks: usize,
    /// Revision recorded for the next incremental run
    pub revision: Option<String>,
    pub duration_ms: u64,
    /// Non-fatal per-file errors
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Request to delete a project and all of its chunks
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteProjectRequest {
    /// Project id or name
    pub project: String,
}

impl DeleteProjectRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_empty("project", &self.project)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteProjectResponse {
    pub project_id: String,
    pub name: String,
    pub chunks_deleted: usize,
}

/// Similarity search over a project's chunks
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchChunksRequest {
    /// Project id or name
    pub project: String,
    /// Natural-language or code query
    pub query: String,
    /// Number of results (default from configuration)
    #[serde(default)]
    pub limit: Option<usize>,
    /// Minimum similarity score, 0.0 to 1.0 (default from configuration)
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl SearchChunksRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_empty("project", &self.project)?;
        require_non_empty("query", &self.query)?;
        check_limit(self.limit)?;
        if let Some(score) = self.min_score
            && !(0.0..=1.0).contains(&score)
        {
            return Err(ValidationError::ConstraintViolation {
                field: "min_score".to_string(),
                constraint: "between 0.0 and 1.0".to_string(),
                actual: score.to_string(),
            }
            .to_string());
        }
        Ok(())
    }
}

/// BM25 keyword search over a project's chunk names and code
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KeywordSearchRequest {
    /// Project id or name
    pub project: String,
    /// Keywords to match
    pub keyword: String,
    /// Number of results (default from configuration)
    #[serde(default)]
    pub limit: Option<usize>,
}

impl KeywordSearchRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_empty("project", &self.project)?;
        require_non_empty("keyword", &self.keyword)?;
        check_limit(self.limit)
    }
}

/// A chunk in a search result
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChunkResult {
    pub id: String,
    /// Path relative to the project root
    pub path: String,
    pub name: String,
    pub chunk_type: ChunkType,
    pub code: String,
    pub line_start: usize,
    pub line_end: usize,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub score: f32,
}

impl From<ScoredChunk> for ChunkResult {
    fn from(scored: ScoredChunk) -> Self {
        let chunk = scored.chunk;
        Self {
            id: chunk.id,
            path: chunk.path,
            name: chunk.name,
            chunk_type: chunk.chunk_type,
            code: chunk.code,
            line_start: chunk.line_start,
            line_end: chunk.line_end,
            dependencies: chunk.dependencies,
            dependents: chunk.dependents,
            score: scored.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResponse {
    pub results: Vec<ChunkResult>,
    pub duration_ms: u64,
}

/// Request for the dependency neighbourhood of a named symbol
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChunkDependenciesRequest {
    /// Project id or name
    pub project: String,
    /// Symbol name, e.g. a function or class name
    pub name: String,
}

impl ChunkDependenciesRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_empty("project", &self.project)?;
        require_non_empty("symbol name", &self.name)
    }
}

/// One stored chunk carrying the requested name
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChunkDependencyInfo {
    pub id: String,
    pub path: String,
    pub chunk_type: ChunkType,
    pub line_start: usize,
    pub line_end: usize,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChunkDependenciesResponse {
    pub name: String,
    /// Every chunk with this name (names are not unique across files)
    pub chunks: Vec<ChunkDependencyInfo>,
    /// Names reachable through dependencies, excluding the symbol itself
    pub transitive_dependencies: Vec<String>,
}

#[cfg(test)]
mod tests;
