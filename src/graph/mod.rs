//! Dependency graph reconciliation over a chunk set
//!
//! Resolution is by symbol name within the chunks handed in. On a full run that is the
//! whole project, so `dependents` ends up as the exact transpose of `dependencies`.
//! On an incremental run only the touched files' chunks are present, so edges to or
//! from chunks in unchanged files are dropped for that run. Callers that need those
//! edges pass persisted chunks in as context (see [`reconcile_with_context`]).

mod closure;

pub use closure::{transitive_dependencies, transitive_dependency_counts};

use crate::indexer::CodeChunk;
use std::collections::{HashMap, HashSet};

/// Summary of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Resolved (source name, target name) pairs kept in `dependencies`
    pub resolved: usize,
    /// Raw names that matched no chunk and were dropped
    pub unresolved: usize,
    /// Distinct dependent links written
    pub edges: usize,
}

/// Resolve raw dependency names against the given chunks and rebuild `dependents`.
///
/// Every chunk's `dependencies` is treated as raw input; names matching no chunk (or
/// only the chunk itself) are removed. All `dependents` lists are rebuilt from scratch.
pub fn reconcile(chunks: &mut [CodeChunk]) -> ReconcileStats {
    let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, chunk) in chunks.iter().enumerate() {
        by_name.entry(chunk.name.clone()).or_default().push(idx);
    }

    let mut stats = ReconcileStats::default();
    let mut resolved_deps: Vec<Vec<String>> = Vec::with_capacity(chunks.len());
    // target index -> source names, in discovery order
    let mut incoming: Vec<Vec<String>> = vec![Vec::new(); chunks.len()];

    for chunk in chunks.iter() {
        let mut kept = Vec::new();
        let mut seen = HashSet::new();

        for dep in &chunk.dependencies {
            if !seen.insert(dep.as_str()) {
                continue;
            }
            let targets: Vec<usize> = by_name
                .get(dep)
                .map(|indices| {
                    indices
                        .iter()
                        .copied()
                        .filter(|&t| chunks[t].id != chunk.id)
                        .collect()
                })
                .unwrap_or_default();

            if targets.is_empty() {
                stats.unresolved += 1;
                continue;
            }

            stats.resolved += 1;
            kept.push(dep.clone());
            for target in targets {
                if !incoming[target].contains(&chunk.name) {
                    incoming[target].push(chunk.name.clone());
                    stats.edges += 1;
                }
            }
        }
        resolved_deps.push(kept);
    }

    for ((chunk, deps), dependents) in chunks.iter_mut().zip(resolved_deps).zip(incoming) {
        chunk.dependencies = deps;
        chunk.dependents = dependents;
    }

    tracing::debug!(
        "Reconciled {} chunks: {} resolved, {} unresolved, {} dependent links",
        chunks.len(),
        stats.resolved,
        stats.unresolved,
        stats.edges
    );
    stats
}

/// Reconcile new chunks together with persisted chunks from untouched files.
///
/// Returns the indices into `context` whose `dependencies` or `dependents` changed and
/// need re-persisting. Context chunks keep their stored (already resolved) dependencies
/// as raw input, so a context chunk never gains a dependency on a name it did not
/// resolve before, but loses any whose target is gone.
pub fn reconcile_with_context(
    chunks: &mut Vec<CodeChunk>,
    context: &mut Vec<CodeChunk>,
) -> (ReconcileStats, Vec<usize>) {
    let touched_paths: HashSet<String> = chunks.iter().map(|c| c.path.clone()).collect();
    context.retain(|c| !touched_paths.contains(&c.path));

    let before: Vec<(Vec<String>, Vec<String>)> = context
        .iter()
        .map(|c| (sorted(&c.dependencies), sorted(&c.dependents)))
        .collect();
    let new_count = chunks.len();

    let mut combined: Vec<CodeChunk> = std::mem::take(chunks);
    combined.append(context);
    let stats = reconcile(&mut combined);

    *context = combined.split_off(new_count);
    *chunks = combined;

    let changed = context
        .iter()
        .zip(before)
        .enumerate()
        .filter(|(_, (chunk, (old_deps, old_dependents)))| {
            sorted(&chunk.dependencies) != *old_deps || sorted(&chunk.dependents) != *old_dependents
        })
        .map(|(idx, _)| idx)
        .collect();

    (stats, changed)
}

fn sorted(names: &[String]) -> Vec<String> {
    let mut names = names.to_vec();
    names.sort();
    names
}
