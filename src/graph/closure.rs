//! Transitive dependency analysis for diagnostics

use crate::indexer::CodeChunk;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Every name reachable from `root` through resolved dependencies, excluding `root`.
///
/// Names are merged across chunks sharing a name. Cycles are cut by the visited set.
pub fn transitive_dependencies(chunks: &[CodeChunk], root: &str) -> BTreeSet<String> {
    let edges = edge_map(chunks);
    walk(&edges, root)
}

/// Size of each chunk's transitive dependency set, keyed by chunk id
pub fn transitive_dependency_counts(chunks: &[CodeChunk]) -> HashMap<String, usize> {
    let edges = edge_map(chunks);
    let mut per_name: HashMap<&str, usize> = HashMap::new();

    chunks
        .iter()
        .map(|chunk| {
            let count = *per_name
                .entry(chunk.name.as_str())
                .or_insert_with(|| walk(&edges, &chunk.name).len());
            (chunk.id.clone(), count)
        })
        .collect()
}

fn edge_map(chunks: &[CodeChunk]) -> HashMap<&str, Vec<&str>> {
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for chunk in chunks {
        let targets = edges.entry(chunk.name.as_str()).or_default();
        for dep in &chunk.dependencies {
            if !targets.contains(&dep.as_str()) {
                targets.push(dep.as_str());
            }
        }
    }
    edges
}

fn walk(edges: &HashMap<&str, Vec<&str>>, root: &str) -> BTreeSet<String> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut reached = BTreeSet::new();
    let mut stack: Vec<&str> = edges.get(root).cloned().unwrap_or_default();
    visited.insert(root);

    while let Some(name) = stack.pop() {
        if !visited.insert(name) {
            continue;
        }
        reached.insert(name.to_string());
        if let Some(next) = edges.get(name) {
            stack.extend(next.iter().copied().filter(|n| !visited.contains(n)));
        }
    }
    reached
}
