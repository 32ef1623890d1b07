//! Key-based merge rules shared by every store backend

use crate::indexer::CodeChunk;
use std::collections::{HashMap, HashSet};

/// Collapse duplicate `(path, name)` keys within one batch; the last chunk wins.
///
/// The surviving chunk takes the position of the first occurrence.
pub fn dedupe_batch(chunks: Vec<CodeChunk>) -> Vec<CodeChunk> {
    let mut position: HashMap<(String, String), usize> = HashMap::new();
    let mut out: Vec<CodeChunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let key = (chunk.path.clone(), chunk.name.clone());
        match position.get(&key) {
            Some(&idx) => {
                tracing::debug!("Duplicate chunk key {}::{} in batch", key.0, key.1);
                out[idx] = chunk;
            }
            None => {
                position.insert(key, out.len());
                out.push(chunk);
            }
        }
    }
    out
}

/// Give incoming chunks the identity of the stored rows they replace.
///
/// Returns the ids of every stored row whose key is being written; callers delete
/// those rows before inserting so a key never ends up with two rows.
pub fn preserve_identity(existing: &[CodeChunk], incoming: &mut [CodeChunk]) -> Vec<String> {
    let mut stored: HashMap<(&str, &str), &CodeChunk> = HashMap::new();
    for chunk in existing {
        stored.entry(chunk.key()).or_insert(chunk);
    }

    let now = chrono::Utc::now().timestamp();
    let mut keys: HashSet<(String, String)> = HashSet::new();
    for chunk in incoming.iter_mut() {
        let previous = stored.get(&chunk.key()).copied();
        if let Some(previous) = previous {
            chunk.id = previous.id.clone();
            chunk.created_at = previous.created_at;
        }
        chunk.updated_at = now;
        keys.insert((chunk.path.clone(), chunk.name.clone()));
    }

    existing
        .iter()
        .filter(|c| keys.contains(&(c.path.clone(), c.name.clone())))
        .map(|c| c.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::ChunkType;

    fn chunk(path: &str, name: &str, code: &str) -> CodeChunk {
        CodeChunk::new("p", path, name, ChunkType::Function, code, 1, 2)
    }

    #[test]
    fn test_dedupe_last_wins() {
        let chunks = vec![
            chunk("a.ts", "f", "first"),
            chunk("b.ts", "g", "other"),
            chunk("a.ts", "f", "second"),
        ];
        let deduped = dedupe_batch(chunks);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].code, "second");
        assert_eq!(deduped[1].name, "g");
    }

    #[test]
    fn test_same_name_different_path_are_distinct() {
        let deduped = dedupe_batch(vec![chunk("a.ts", "f", "1"), chunk("b.ts", "f", "2")]);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_preserve_identity() {
        let mut old = chunk("a.ts", "f", "old");
        old.created_at = 100;
        let untouched = chunk("a.ts", "g", "keep");
        let existing = vec![old.clone(), untouched];

        let mut incoming = vec![chunk("a.ts", "f", "new"), chunk("a.ts", "h", "fresh")];
        let fresh_id = incoming[1].id.clone();
        let replaced = preserve_identity(&existing, &mut incoming);

        assert_eq!(replaced, vec![old.id.clone()]);
        assert_eq!(incoming[0].id, old.id);
        assert_eq!(incoming[0].created_at, 100);
        assert!(incoming[0].updated_at >= 100);
        assert_eq!(incoming[0].code, "new");
        assert_eq!(incoming[1].id, fresh_id);
    }

    #[test]
    fn test_preserve_identity_reports_duplicate_stored_rows() {
        let first = chunk("a.ts", "f", "1");
        let second = chunk("a.ts", "f", "2");
        let existing = vec![first.clone(), second.clone()];
        let mut incoming = vec![chunk("a.ts", "f", "3")];

        let replaced = preserve_identity(&existing, &mut incoming);
        assert_eq!(replaced, vec![first.id.clone(), second.id]);
        assert_eq!(incoming[0].id, first.id);
    }
}
