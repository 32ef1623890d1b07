//! Batched, concurrent embedding of chunk text
//!
//! Every batch runs on the blocking pool under a timeout and is retried with backoff
//! unless the failure is permanent (a malformed response).
//! The first batch that still fails after its retries fails the whole request.

use super::EmbeddingProvider;
use super::preprocess::{self, PreprocessOptions};
use crate::config::EmbeddingConfig;
use crate::error::{self, EmbeddingError};
use crate::indexer::CodeChunk;
use crate::retry::{RetryPolicy, retry_with_backoff_if};
use anyhow::{Context, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;

pub struct EmbeddingRequestor {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    timeout: Duration,
    retry: RetryPolicy,
    preprocess: PreprocessOptions,
}

impl EmbeddingRequestor {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            batch_size: config.batch_size.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            retry: config.retry_policy(),
            preprocess: PreprocessOptions::from(config),
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Embed every chunk in place. Returns the number of embeddings written.
    pub async fn embed_chunks(&self, chunks: &mut [CodeChunk]) -> Result<usize> {
        let texts: Vec<String> = chunks
            .iter()
            .map(|chunk| preprocess::chunk_text(chunk, &self.preprocess))
            .collect();

        let embeddings = self.embed_texts(texts).await?;
        let count = embeddings.len();
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = Some(embedding);
        }
        Ok(count)
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let text = preprocess::query_text(query, &self.preprocess);
        let mut embeddings = self.embed_texts(vec![text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationFailed("no embedding for query".into()).into())
    }

    /// Embed texts in batches, returning one vector per text in input order
    pub async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let total_batches = texts.len().div_ceil(self.batch_size);
        tracing::info!(
            "Embedding {} texts in {} batch(es) with {}",
            texts.len(),
            total_batches,
            self.provider.model_name()
        );

        let batches = texts
            .chunks(self.batch_size)
            .enumerate()
            .map(|(idx, batch)| self.embed_batch(idx + 1, total_batches, batch.to_vec()));

        let results = try_join_all(batches).await?;
        Ok(results.into_iter().flatten().collect())
    }

    async fn embed_batch(
        &self,
        batch_no: usize,
        total_batches: usize,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>> {
        let name = format!("Embedding batch {}/{}", batch_no, total_batches);
        retry_with_backoff_if(&self.retry, &name, error::is_transient, || {
            let provider = self.provider.clone();
            let texts = texts.clone();
            let timeout = self.timeout;
            async move { embed_once(provider, texts, timeout).await }
        })
        .await
    }
}

async fn embed_once(
    provider: Arc<dyn EmbeddingProvider>,
    texts: Vec<String>,
    timeout: Duration,
) -> Result<Vec<Vec<f32>>> {
    let sent = texts.len();
    let expected_dim = provider.dimension();
    let worker = provider.clone();
    let embed_future = tokio::task::spawn_blocking(move || worker.embed_batch(texts));

    let embeddings = match tokio::time::timeout(timeout, embed_future).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => return Err(e).context("Embedding task panicked"),
        Err(_) => return Err(EmbeddingError::Timeout(timeout.as_secs()).into()),
    };

    if embeddings.len() != sent {
        return Err(EmbeddingError::CountMismatch {
            sent,
            received: embeddings.len(),
        }
        .into());
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != expected_dim) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: expected_dim,
            actual: bad.len(),
        }
        .into());
    }
    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::ChunkType;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encodes each text's length; fails the first `failures` calls
    struct FlakyProvider {
        failures: usize,
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
        short_by_one: bool,
    }

    impl FlakyProvider {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                batch_sizes: Mutex::new(Vec::new()),
                short_by_one: false,
            }
        }
    }

    impl EmbeddingProvider for FlakyProvider {
        fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                anyhow::bail!("model unavailable");
            }
            self.batch_sizes.lock().unwrap().push(texts.len());
            let mut out: Vec<Vec<f32>> = texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect();
            if self.short_by_one {
                out.pop();
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    fn config(batch_size: usize, max_retries: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            batch_size,
            max_retries,
            retry_base_delay_ms: 1,
            annotate_path: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_batches_preserve_order() {
        let provider = Arc::new(FlakyProvider::new(0));
        let requestor = EmbeddingRequestor::new(provider.clone(), &config(2, 1));

        let texts: Vec<String> = (1..=5).map(|n| "x".repeat(n)).collect();
        let embeddings = requestor.embed_texts(texts).await.unwrap();

        let lengths: Vec<f32> = embeddings.iter().map(|e| e[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut sizes = provider.batch_sizes.lock().unwrap().clone();
        sizes.sort();
        assert_eq!(sizes, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let provider = Arc::new(FlakyProvider::new(2));
        let requestor = EmbeddingRequestor::new(provider.clone(), &config(10, 3));
        let embeddings = requestor.embed_texts(vec!["a".into()]).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let provider = Arc::new(FlakyProvider::new(usize::MAX));
        let requestor = EmbeddingRequestor::new(provider.clone(), &config(10, 2));
        let err = requestor
            .embed_texts(vec!["a".into()])
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("model unavailable"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_count_mismatch_fails_without_retry() {
        let mut provider = FlakyProvider::new(0);
        provider.short_by_one = true;
        let provider = Arc::new(provider);
        let requestor = EmbeddingRequestor::new(provider.clone(), &config(10, 3));
        let err = requestor
            .embed_texts(vec!["a".into(), "b".into()])
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("count mismatch"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_embed_chunks_sets_vectors() {
        let requestor = EmbeddingRequestor::new(Arc::new(FlakyProvider::new(0)), &config(10, 1));
        let mut chunks = vec![CodeChunk::new(
            "p",
            "a.ts",
            "a",
            ChunkType::Constant,
            "const a = {\n  b: 1,\n};",
            1,
            3,
        )];
        let count = requestor.embed_chunks(&mut chunks).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(chunks[0].embedding.as_ref().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_empty_input_skips_provider() {
        let provider = Arc::new(FlakyProvider::new(0));
        let requestor = EmbeddingRequestor::new(provider.clone(), &config(10, 1));
        assert!(requestor.embed_texts(Vec::new()).await.unwrap().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
