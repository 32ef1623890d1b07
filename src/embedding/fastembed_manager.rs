use super::EmbeddingProvider;
use crate::error::EmbeddingError;
use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;

/// Model names accepted in `embedding.model_name`, with their fastembed model and dimension
const KNOWN_MODELS: &[(&str, EmbeddingModel, usize)] = &[
    ("all-MiniLM-L6-v2", EmbeddingModel::AllMiniLML6V2, 384),
    ("all-MiniLM-L12-v2", EmbeddingModel::AllMiniLML12V2, 384),
    ("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15, 384),
    ("bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15, 768),
];

/// FastEmbed-based embedding provider
pub struct FastEmbedManager {
    // fastembed needs `&mut self` to embed
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedManager {
    /// Create a new FastEmbedManager with the default model (all-MiniLM-L6-v2)
    pub fn new() -> Result<Self> {
        Self::from_model_name("all-MiniLM-L6-v2")
    }

    /// Create a manager for one of the supported model names
    pub fn from_model_name(name: &str) -> Result<Self> {
        let (name, model, dimension) = lookup(name)?;
        tracing::info!("Initializing FastEmbed model: {} ({} dims)", name, dimension);

        let mut options = InitOptions::default();
        options.model_name = model;
        options.show_download_progress = false;

        let embedding_model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitializationFailed(e.to_string()))
            .context("Failed to initialize FastEmbed model")?;

        Ok(Self {
            model: Mutex::new(embedding_model),
            model_name: name.to_string(),
            dimension,
        })
    }

    /// Dimension of a supported model without loading it
    pub fn dimension_for(name: &str) -> Result<usize> {
        lookup(name).map(|(_, _, dimension)| dimension)
    }
}

fn lookup(name: &str) -> Result<(&'static str, EmbeddingModel, usize)> {
    KNOWN_MODELS
        .iter()
        .find(|(known, _, _)| known.eq_ignore_ascii_case(name))
        .map(|(known, model, dimension)| (*known, model.clone(), *dimension))
        .ok_or_else(|| EmbeddingError::UnknownModel(name.to_string()).into())
}

impl EmbeddingProvider for FastEmbedManager {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut model = self
            .model
            .lock()
            .map_err(|e| EmbeddingError::LockPoisoned(e.to_string()))?;
        let embeddings = model
            .embed(texts, None)
            .map_err(|e| EmbeddingError::GenerationFailed(e.to_string()))?;

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_lookup() {
        assert_eq!(FastEmbedManager::dimension_for("all-MiniLM-L6-v2").unwrap(), 384);
        assert_eq!(FastEmbedManager::dimension_for("BGE-BASE-EN-V1.5").unwrap(), 768);
    }

    #[test]
    fn test_unknown_model() {
        let err = FastEmbedManager::from_model_name("word2vec").err().unwrap();
        assert!(err.to_string().contains("Unknown embedding model: word2vec"));
    }

    // Downloads the model on first use
    #[test]
    #[ignore]
    fn test_embedding_generation() {
        let manager = FastEmbedManager::new().unwrap();
        let texts = vec![
            "export function add(a: number, b: number) { return a + b; }".to_string(),
            "interface Point { x: number; y: number }".to_string(),
        ];

        let embeddings = manager.embed_batch(texts).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 384);
        assert_eq!(manager.model_name(), "all-MiniLM-L6-v2");
        assert!(manager.embed_batch(vec![]).unwrap().is_empty());
    }
}
