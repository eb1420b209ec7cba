//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use fastembed::EmbeddingModel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the default sentence-embedding model (384 dimensions).
pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Dimension produced by the default model.
pub const DEFAULT_DIMENSION: usize = 384;

/// Configuration for embedding models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    pub model_name: String,
    /// Directory where downloaded ONNX models are cached
    pub cache_dir: PathBuf,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
    /// Whether to print download progress when fetching the model
    pub show_download_progress: bool,
}

impl EmbedConfig {
    /// Create a configuration for a named model cached under `cache_dir`.
    pub fn new<P: AsRef<Path>>(cache_dir: P, model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            cache_dir: cache_dir.as_ref().to_path_buf(),
            batch_size: 32,
            normalize: true,
            show_download_progress: false,
        }
    }

    /// The all-MiniLM-L6-v2 sentence transformer, cached under `cache_dir`.
    pub fn all_minilm_l6_v2<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self::new(cache_dir, DEFAULT_MODEL_NAME)
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    /// Set the model cache directory (builder style)
    pub fn with_cache_dir<P: AsRef<Path>>(self, cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            ..self
        }
    }

    /// Show download progress on stderr while the model is fetched (builder style)
    pub fn with_download_progress(self, show_download_progress: bool) -> Self {
        Self {
            show_download_progress,
            ..self
        }
    }

    /// Get the configured model name
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Resolve the configured name to one of fastembed's built-in models.
    ///
    /// Matching is case-insensitive and ignores the `sentence-transformers/`
    /// and `Xenova/` prefixes commonly used on HuggingFace.
    pub fn fastembed_model(&self) -> Result<EmbeddingModel> {
        let name = self.model_name.to_lowercase();
        let name = name
            .trim_start_matches("sentence-transformers/")
            .trim_start_matches("xenova/");

        match name {
            "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            other => Err(EmbedError::invalid_config(format!(
                "Unsupported embedding model: {other}"
            ))),
        }
    }

    /// Validate the configuration without loading anything
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be at least 1"));
        }
        self.fastembed_model()?;
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::all_minilm_l6_v2(PathBuf::from("models"))
    }
}
