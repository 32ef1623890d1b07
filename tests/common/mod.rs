//! Shared fixtures for integration tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chunkgraph::config::Config;
use chunkgraph::embedding::EmbeddingProvider;
use chunkgraph::indexer::CodeChunk;
use chunkgraph::store::{ChunkStore, MemoryChunkStore, ScoredChunk};
use chunkgraph::vcs::GitVersionControl;
use chunkgraph::{ChunkGraphClient, CreateProjectRequest, ProjectInfo};
use git2::{IndexAddOption, Repository, Signature};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const DIM: usize = 16;

/// Bag-of-tokens embedder: each alphanumeric token hashed into one of `DIM` buckets
pub struct HashingEmbedder;

impl EmbeddingProvider for HashingEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIM];
                for token in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                {
                    let mut hasher = DefaultHasher::new();
                    token.to_lowercase().hash(&mut hasher);
                    v[(hasher.finish() % DIM as u64) as usize] += 1.0;
                }
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1.0);
                v.iter().map(|x| x / norm).collect()
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

/// Embedder that always fails, counting calls
#[derive(Default)]
pub struct FailingEmbedder {
    pub calls: AtomicUsize,
}

impl EmbeddingProvider for FailingEmbedder {
    fn embed_batch(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("model unavailable")
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// In-memory store that counts upsert calls
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryChunkStore,
    pub upserts: AtomicUsize,
}

impl CountingStore {
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkStore for CountingStore {
    async fn initialize(&self, dimension: usize) -> Result<()> {
        self.inner.initialize(dimension).await
    }

    async fn upsert_chunks(&self, project_id: &str, chunks: Vec<CodeChunk>) -> Result<usize> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_chunks(project_id, chunks).await
    }

    async fn get_chunks_by_project(&self, project_id: &str) -> Result<Vec<CodeChunk>> {
        self.inner.get_chunks_by_project(project_id).await
    }

    async fn count_chunks(&self, project_id: &str) -> Result<usize> {
        self.inner.count_chunks(project_id).await
    }

    async fn delete_chunks(&self, project_id: &str, ids: &[String]) -> Result<usize> {
        self.inner.delete_chunks(project_id, ids).await
    }

    async fn delete_project(&self, project_id: &str) -> Result<usize> {
        self.inner.delete_project(project_id).await
    }

    async fn search_similar(
        &self,
        project_id: &str,
        query_vector: Vec<f32>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredChunk>> {
        self.inner
            .search_similar(project_id, query_vector, limit, min_score)
            .await
    }

    async fn search_keyword(
        &self,
        project_id: &str,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.inner.search_keyword(project_id, keyword, limit).await
    }
}

/// A git repository in a temp dir
pub struct GitFixture {
    pub dir: TempDir,
    pub repo: Repository,
}

impl GitFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.dir.path().join(relative)).unwrap();
    }

    /// Stage everything (including deletions) and commit. Returns the commit id.
    pub fn commit(&self, message: &str) -> String {
        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
            .to_string()
    }
}

/// Client wired to real git, an in-memory counting store and a chosen embedder
pub struct Harness {
    pub client: ChunkGraphClient,
    pub store: Arc<CountingStore>,
    pub state_dir: TempDir,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.embedding.retry_base_delay_ms = 1;
    config
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(test_config(), Arc::new(HashingEmbedder)).await
    }

    pub async fn with(config: Config, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let state_dir = TempDir::new().unwrap();
        let store = Arc::new(CountingStore::default());
        let client = ChunkGraphClient::with_components(
            config,
            embedder,
            store.clone(),
            Arc::new(GitVersionControl::new()),
            state_dir.path().join("projects.json"),
        )
        .await
        .unwrap();
        Self {
            client,
            store,
            state_dir,
        }
    }

    pub async fn create(&self, name: &str, root: &Path) -> ProjectInfo {
        self.client
            .create_project(CreateProjectRequest {
                name: name.to_string(),
                path: root.to_string_lossy().to_string(),
                description: None,
            })
            .await
            .unwrap()
    }

    pub async fn chunks(&self, project_id: &str) -> Vec<CodeChunk> {
        let mut chunks = self.store.get_chunks_by_project(project_id).await.unwrap();
        chunks.sort_by(|a, b| (&a.path, a.line_start).cmp(&(&b.path, b.line_start)));
        chunks
    }

    pub async fn chunk(&self, project_id: &str, name: &str) -> CodeChunk {
        self.chunks(project_id)
            .await
            .into_iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("no chunk named {}", name))
    }
}

pub const UTIL_TS: &str = "export function add(a: number, b: number): number {
  return a + b;
}
";

pub const MAIN_TS: &str = "import { add } from './util';

export function run(): number {
  return add(1, 2);
}
";
