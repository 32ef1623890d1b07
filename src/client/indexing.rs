//! The analyze pipeline: change detection, extraction, embedding, graph
//! reconciliation, persistence and stale-chunk pruning

use super::ChunkGraphClient;
use crate::graph::{self, ReconcileStats};
use crate::indexer::{ChunkBuilder, CodeChunk, FileInfo, FileWalker};
use crate::registry::Project;
use crate::store::upsert;
use crate::types::{AnalysisMode, AnalyzeResponse};
use crate::vcs::{ChangeDetector, ChangeStatus, RunPlan};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::time::Instant;

/// Files selected for one run
struct RunScope {
    mode: AnalysisMode,
    files: Vec<FileInfo>,
    /// Changed paths reported by version control
    changed_files: Vec<String>,
    /// Changed paths no longer eligible: deleted, ignored, too large or unreadable
    removed: Vec<String>,
    /// Every path the full walk saw, parsed or not
    walked: Option<HashSet<String>>,
}

/// Outcome of extracting every file in scope
#[derive(Default)]
struct Extraction {
    chunks: Vec<CodeChunk>,
    /// Files that parsed, including those yielding no chunks
    extracted_paths: HashSet<String>,
    errors: Vec<String>,
}

pub(crate) async fn analyze(
    client: &ChunkGraphClient,
    project: &Project,
    force_full: bool,
) -> Result<AnalyzeResponse> {
    let start = Instant::now();
    tracing::info!("Analyzing project '{}' at {:?}", project.name, project.path);

    let status = detect_changes(client, project).await?;
    let plan = RunPlan::decide(force_full, &status);
    let revision = status.revision().map(str::to_string);

    let mut scope = match plan {
        RunPlan::Skip => {
            let total_chunks = client.store.count_chunks(&project.id).await?;
            tracing::info!(
                "Project '{}' unchanged since {}, skipping",
                project.name,
                revision.as_deref().unwrap_or("unknown revision")
            );
            return Ok(AnalyzeResponse {
                project_id: project.id.clone(),
                mode: AnalysisMode::Skipped,
                files_processed: 0,
                chunks_indexed: 0,
                embeddings_generated: 0,
                changed_files: Vec::new(),
                chunks_pruned: 0,
                dependency_edges: 0,
                transitive_dependencies: 0,
                total_chunks,
                revision,
                duration_ms: start.elapsed().as_millis() as u64,
                errors: Vec::new(),
            });
        }
        RunPlan::Full => full_scope(client, project).await?,
        RunPlan::Incremental(changed) => incremental_scope(client, project, changed).await?,
    };

    let files_processed = scope.files.len();
    let extraction = extract(client, project, std::mem::take(&mut scope.files)).await?;
    for error in &extraction.errors {
        tracing::warn!("{}", error);
    }

    // Drop duplicate (path, name) keys up front so every edge below refers to a chunk
    // that is actually stored
    let mut chunks = upsert::dedupe_batch(extraction.chunks);
    let produced: HashSet<(String, String)> = chunks
        .iter()
        .map(|c| (c.path.clone(), c.name.clone()))
        .collect();

    let mut embeddings_generated = 0;
    let mut chunks_indexed = 0;
    let stats;
    let mut transitive_dependencies = 0;

    if !chunks.is_empty() {
        // Any failure here aborts the run before anything is written
        embeddings_generated = client
            .embedder
            .embed_chunks(&mut chunks)
            .await
            .context("Embedding failed; no chunks were persisted")?;
    }

    // Widened resolution also runs when nothing was extracted: deleted files can still
    // leave dangling dependencies in untouched chunks
    let context = if client.config.indexing.resolve_against_store
        && scope.mode == AnalysisMode::Incremental
    {
        let (run_stats, changed_context) =
            reconcile_against_store(client, project, &mut chunks, &scope, &extraction.extracted_paths)
                .await?;
        stats = run_stats;
        changed_context
    } else {
        stats = graph::reconcile(&mut chunks);
        Vec::new()
    };

    if !chunks.is_empty() || !context.is_empty() {
        transitive_dependencies = graph::transitive_dependency_counts(&chunks).values().sum();

        let new_count = chunks.len();
        let context_count = context.len();
        chunks.extend(context);
        let written = client
            .store
            .upsert_chunks(&project.id, chunks)
            .await
            .context("Failed to persist chunks")?;
        chunks_indexed = written.saturating_sub(context_count).min(new_count);
        if context_count > 0 {
            tracing::info!(
                "Re-persisted {} unchanged chunk(s) whose dependency links changed",
                context_count
            );
        }
    }

    let chunks_pruned = if client.config.indexing.prune_stale_chunks {
        prune_stale(client, project, &scope, &extraction.extracted_paths, &produced).await?
    } else {
        0
    };

    let total_chunks = client.store.count_chunks(&project.id).await?;
    record_revision(client, project, revision.clone()).await;

    tracing::info!(
        "Analyzed '{}' ({:?}): {} files, {} chunks, {} dependent links, {} pruned",
        project.name,
        scope.mode,
        files_processed,
        chunks_indexed,
        stats.edges,
        chunks_pruned
    );

    Ok(AnalyzeResponse {
        project_id: project.id.clone(),
        mode: scope.mode,
        files_processed,
        chunks_indexed,
        embeddings_generated,
        changed_files: scope.changed_files,
        chunks_pruned,
        dependency_edges: stats.edges,
        transitive_dependencies,
        total_chunks,
        revision,
        duration_ms: start.elapsed().as_millis() as u64,
        errors: extraction.errors,
    })
}

async fn detect_changes(client: &ChunkGraphClient, project: &Project) -> Result<ChangeStatus> {
    let vcs = client.vcs.clone();
    let root = project.path.clone();
    let last = project.last_commit_hash.clone();
    tokio::task::spawn_blocking(move || ChangeDetector::new(vcs.as_ref()).detect(&root, last.as_deref()))
        .await
        .context("Change detection task panicked")
}

async fn full_scope(client: &ChunkGraphClient, project: &Project) -> Result<RunScope> {
    let walker = FileWalker::from_config(&project.path, &client.config.indexing);
    let files = tokio::task::spawn_blocking(move || walker.walk())
        .await
        .context("File walk task panicked")??;

    let walked = files.iter().map(|f| f.relative_path.clone()).collect();
    Ok(RunScope {
        mode: AnalysisMode::Full,
        files,
        changed_files: Vec::new(),
        removed: Vec::new(),
        walked: Some(walked),
    })
}

async fn incremental_scope(
    client: &ChunkGraphClient,
    project: &Project,
    changed: Vec<String>,
) -> Result<RunScope> {
    let walker = FileWalker::from_config(&project.path, &client.config.indexing);
    let paths = changed.clone();
    let loaded = tokio::task::spawn_blocking(move || walker.load(&paths))
        .await
        .context("File load task panicked")??;

    Ok(RunScope {
        mode: AnalysisMode::Incremental,
        files: loaded.files,
        changed_files: changed,
        removed: loaded.missing.into_iter().chain(loaded.skipped).collect(),
        walked: None,
    })
}

/// Build chunks for every file in parallel. A failing file is reported, never fatal.
async fn extract(
    client: &ChunkGraphClient,
    project: &Project,
    files: Vec<FileInfo>,
) -> Result<Extraction> {
    let builder = ChunkBuilder::new(client.config.indexing.dependency_strategy);
    let project_id = project.id.clone();

    tokio::task::spawn_blocking(move || {
        let results: Vec<_> = files
            .par_iter()
            .map(|file| (file.relative_path.clone(), builder.build(&project_id, file)))
            .collect();

        let mut extraction = Extraction::default();
        for (path, result) in results {
            match result {
                Ok(chunks) => {
                    tracing::debug!("{}: {} chunk(s)", path, chunks.len());
                    extraction.chunks.extend(chunks);
                    extraction.extracted_paths.insert(path);
                }
                Err(e) => extraction.errors.push(e.to_string()),
            }
        }
        extraction
    })
    .await
    .context("Extraction task panicked")
}

/// Resolve the run's chunks together with persisted chunks from untouched files.
///
/// Returns the stats and the context chunks whose `dependencies` or `dependents` changed.
async fn reconcile_against_store(
    client: &ChunkGraphClient,
    project: &Project,
    chunks: &mut Vec<CodeChunk>,
    scope: &RunScope,
    extracted_paths: &HashSet<String>,
) -> Result<(ReconcileStats, Vec<CodeChunk>)> {
    let mut context: Vec<CodeChunk> = client
        .store
        .get_chunks_by_project(&project.id)
        .await
        .context("Failed to load stored chunks for dependency resolution")?
        .into_iter()
        .filter(|c| !extracted_paths.contains(&c.path) && !scope.removed.contains(&c.path))
        .collect();

    let (stats, changed) = graph::reconcile_with_context(chunks, &mut context);
    let changed: HashSet<usize> = changed.into_iter().collect();
    let to_persist = context
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| changed.contains(idx))
        .map(|(_, chunk)| chunk)
        .collect();
    Ok((stats, to_persist))
}

/// Delete persisted chunks whose symbol or file is gone.
///
/// Only files that parsed this run, changed files that were deleted, and (on a full
/// run) paths the walk no longer sees are considered.
async fn prune_stale(
    client: &ChunkGraphClient,
    project: &Project,
    scope: &RunScope,
    extracted_paths: &HashSet<String>,
    produced: &HashSet<(String, String)>,
) -> Result<usize> {
    let stored = client
        .store
        .get_chunks_by_project(&project.id)
        .await
        .context("Failed to load stored chunks for pruning")?;

    let stale: Vec<String> = stored
        .into_iter()
        .filter(|c| {
            let symbol_gone = extracted_paths.contains(&c.path)
                && !produced.contains(&(c.path.clone(), c.name.clone()));
            let file_gone = scope.removed.contains(&c.path);
            let not_walked = scope
                .walked
                .as_ref()
                .is_some_and(|walked| !walked.contains(&c.path));
            symbol_gone || file_gone || not_walked
        })
        .map(|c| c.id)
        .collect();

    if stale.is_empty() {
        return Ok(0);
    }
    let deleted = client
        .store
        .delete_chunks(&project.id, &stale)
        .await
        .context("Failed to prune stale chunks")?;
    tracing::info!("Pruned {} stale chunk(s) from '{}'", deleted, project.name);
    Ok(deleted)
}

/// Store the revision for the next incremental run. A registry failure is logged;
/// the next run then re-processes from the previous baseline.
async fn record_revision(client: &ChunkGraphClient, project: &Project, revision: Option<String>) {
    let mut registry = client.registry.write().await;
    if let Err(e) = registry.update_last_revision(&project.id, revision) {
        tracing::warn!("Could not record revision for '{}': {}", project.name, e);
        return;
    }
    if let Err(e) = registry.save(&client.registry_path) {
        tracing::warn!("Failed to save project registry: {}", e);
    }
}
