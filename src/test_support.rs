//! Collaborator stand-ins shared by unit tests

use crate::embedding::EmbeddingProvider;
use crate::vcs::VersionControl;
use anyhow::Result;
use std::path::Path;

pub(crate) const HISTOGRAM_DIM: usize = 8;

/// Deterministic embedder: byte histogram folded into a few buckets, L2-normalized
pub(crate) struct HistogramEmbedder;

impl EmbeddingProvider for HistogramEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; HISTOGRAM_DIM];
                for b in text.bytes() {
                    v[b as usize % HISTOGRAM_DIM] += 1.0;
                }
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1.0);
                v.iter().map(|x| x / norm).collect()
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        HISTOGRAM_DIM
    }

    fn model_name(&self) -> &str {
        "histogram"
    }
}

/// Working copy with a fixed revision and no diff support
pub(crate) struct StubVcs {
    working_copy: bool,
    revision: Option<String>,
}

impl StubVcs {
    pub(crate) fn new(working_copy: bool, revision: Option<&str>) -> Self {
        Self {
            working_copy,
            revision: revision.map(str::to_string),
        }
    }
}

impl VersionControl for StubVcs {
    fn is_working_copy(&self, _root: &Path) -> bool {
        self.working_copy
    }

    fn current_revision(&self, _root: &Path) -> Option<String> {
        self.revision.clone()
    }

    fn changed_paths(&self, _root: &Path, _from: &str, _to: &str) -> Option<Vec<String>> {
        None
    }
}
