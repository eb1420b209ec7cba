//! Offline feature-hashing embedder.
//!
//! Maps word tokens and character trigrams into a fixed number of buckets with
//! FNV hashing and a sign bit, then L2-normalizes. The output has no learned
//! semantics, but it is deterministic, needs no model download, and texts that
//! share words or word fragments end up close together. Used for tests and for
//! running the pipeline on machines without the ONNX runtime.

use crate::config::DEFAULT_DIMENSION;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, normalize};
use async_trait::async_trait;
use fnv::FnvHasher;
use std::hash::Hasher;

#[derive(Debug, Clone)]
pub struct HashingEmbedProvider {
    dimension: usize,
}

impl HashingEmbedProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config(
                "Hashing embedder dimension must be at least 1",
            ));
        }
        Ok(Self { dimension })
    }

    /// Embed synchronously. Exposed for callers that are not async.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            self.accumulate(&mut vector, b"w:", token.as_bytes(), 1.0);

            let chars: Vec<char> = format!("#{token}#").chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                self.accumulate(&mut vector, b"t:", trigram.as_bytes(), 0.5);
            }
        }

        normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], namespace: &[u8], feature: &[u8], weight: f32) {
        let mut hasher = FnvHasher::default();
        hasher.write(namespace);
        hasher.write(feature);
        let hash = hasher.finish();

        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedProvider {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| self.embed_sync(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let provider = HashingEmbedProvider::default();
        let a = provider.embed_sync("Sunset over the harbour");
        let b = provider.embed_sync("Sunset over the harbour");

        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSION);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_are_closer() {
        let provider = HashingEmbedProvider::new(256).unwrap();
        let query = provider.embed_sync("birthday cake");
        let related = provider.embed_sync("a chocolate birthday cake with candles");
        let unrelated = provider.embed_sync("invoice for car repair");

        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let provider = HashingEmbedProvider::new(8).unwrap();
        assert_eq!(provider.embed_sync("  ..  "), vec![0.0; 8]);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedProvider::new(0).is_err());
    }

    #[tokio::test]
    async fn test_trait_batch_matches_single() -> Result<()> {
        let provider = HashingEmbedProvider::default();
        let texts = vec!["first text".to_string(), "second text".to_string()];
        let batch = provider.embed_texts(&texts).await?;
        let single = provider.embed_text("second text").await?;

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.dimension, DEFAULT_DIMENSION);
        assert_eq!(batch.embeddings[1], single);
        Ok(())
    }
}
