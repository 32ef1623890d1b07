use super::upsert::{dedupe_batch, preserve_identity};
use super::{ChunkStore, ScoredChunk};
use crate::error::StoreError;
use crate::indexer::CodeChunk;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Non-persistent [`ChunkStore`] keeping every project's chunks in memory
#[derive(Default)]
pub struct MemoryChunkStore {
    projects: RwLock<HashMap<String, Vec<CodeChunk>>>,
    dimension: AtomicUsize,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Squared L2 distance, the metric LanceDB uses by default
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn keyword_score(chunk: &CodeChunk, terms: &[String]) -> f32 {
    let name = chunk.name.to_lowercase();
    let code = chunk.code.to_lowercase();
    terms
        .iter()
        .map(|term| {
            let in_name = if name.contains(term.as_str()) { 2.0 } else { 0.0 };
            in_name + code.matches(term.as_str()).count() as f32
        })
        .sum()
}

fn sort_by_score(results: &mut [ScoredChunk]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.path.cmp(&b.chunk.path))
            .then_with(|| a.chunk.line_start.cmp(&b.chunk.line_start))
    });
}

#[async_trait::async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn initialize(&self, dimension: usize) -> Result<()> {
        self.dimension.store(dimension, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert_chunks(&self, project_id: &str, chunks: Vec<CodeChunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let dimension = self.dimension.load(Ordering::SeqCst);
        if let Some(bad) = chunks
            .iter()
            .filter_map(|c| c.embedding.as_ref())
            .find(|e| dimension != 0 && e.len() != dimension)
        {
            return Err(StoreError::UpsertFailed(format!(
                "embedding has {} dimensions, store expects {}",
                bad.len(),
                dimension
            ))
            .into());
        }

        let mut incoming = dedupe_batch(chunks);
        let mut projects = self.projects.write().await;
        let rows = projects.entry(project_id.to_string()).or_default();

        let replaced: HashSet<String> = preserve_identity(rows, &mut incoming).into_iter().collect();
        rows.retain(|c| !replaced.contains(&c.id));

        let count = incoming.len();
        rows.extend(incoming.into_iter().map(|mut c| {
            c.project_id = project_id.to_string();
            c
        }));
        Ok(count)
    }

    async fn get_chunks_by_project(&self, project_id: &str) -> Result<Vec<CodeChunk>> {
        let projects = self.projects.read().await;
        Ok(projects.get(project_id).cloned().unwrap_or_default())
    }

    async fn count_chunks(&self, project_id: &str) -> Result<usize> {
        let projects = self.projects.read().await;
        Ok(projects.get(project_id).map_or(0, Vec::len))
    }

    async fn delete_chunks(&self, project_id: &str, ids: &[String]) -> Result<usize> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut projects = self.projects.write().await;
        let Some(rows) = projects.get_mut(project_id) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|c| !ids.contains(c.id.as_str()));
        Ok(before - rows.len())
    }

    async fn delete_project(&self, project_id: &str) -> Result<usize> {
        let mut projects = self.projects.write().await;
        Ok(projects.remove(project_id).map_or(0, |rows| rows.len()))
    }

    async fn search_similar(
        &self,
        project_id: &str,
        vector: Vec<f32>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredChunk>> {
        let projects = self.projects.read().await;
        let mut results: Vec<ScoredChunk> = projects
            .get(project_id)
            .into_iter()
            .flatten()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                if embedding.len() != vector.len() {
                    return None;
                }
                let score = 1.0 / (1.0 + squared_l2(embedding, &vector));
                (score >= min_score).then(|| ScoredChunk {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect();

        sort_by_score(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    async fn search_keyword(
        &self,
        project_id: &str,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let terms: Vec<String> = keyword
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let projects = self.projects.read().await;
        let mut results: Vec<ScoredChunk> = projects
            .get(project_id)
            .into_iter()
            .flatten()
            .filter_map(|chunk| {
                let score = keyword_score(chunk, &terms);
                (score > 0.0).then(|| ScoredChunk {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect();

        sort_by_score(&mut results);
        results.truncate(limit);
        Ok(results)
    }
}
