//! `memora.toml` configuration.
//!
//! Every key is optional; a missing file means all defaults. The vision
//! backend itself is not configured here, it lives in the catalog so it
//! travels with the mounted drive.

use crate::error::{Result, RetrieverError};
use memora_embed::{
    DEFAULT_MODEL_NAME, EmbedConfig, EmbeddingProvider, FastEmbedProvider, HashingEmbedProvider,
};
use memora_vision::VisionTimeouts;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Name of the optional config file at the root of a mounted directory.
pub const CONFIG_FILE_NAME: &str = "memora.toml";

/// Model name selecting [`HashingEmbedProvider`].
pub const HASHING_MODEL: &str = "hashing";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoraConfig {
    pub embedding: EmbeddingSettings,
    pub indexer: IndexerSettings,
    pub vision: VisionSettings,
    pub search: SearchSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// A fastembed model name, or `hashing` for the offline embedder
    pub model: String,
    /// Model download cache; defaults to `<root>/.memora-models`
    pub cache_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL_NAME.to_lowercase(),
            cache_dir: None,
            batch_size: None,
        }
    }
}

/// What happens to the vector index after a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexPolicy {
    /// Rebuild the whole index from the catalog
    #[default]
    FullRebuild,
    /// Insert only the records written by the scan
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
    pub extensions: Vec<String>,
    /// Longest edge of stored thumbnails, in pixels
    pub thumbnail_size: u32,
    pub thumbnail_quality: u8,
    /// Longest edge of the JPEG sent to the vision backend
    pub preview_size: u32,
    pub max_workers: usize,
    pub ocr: bool,
    pub index_policy: IndexPolicy,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png", "webp", "bmp", "gif", "tif", "tiff"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            thumbnail_size: 256,
            thumbnail_quality: 80,
            preview_size: 1024,
            max_workers: 4,
            ocr: true,
            index_policy: IndexPolicy::FullRebuild,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionSettings {
    pub describe_timeout_secs: u64,
    pub expand_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub expand_queries: bool,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            describe_timeout_secs: 10,
            expand_timeout_secs: 3,
            probe_timeout_secs: 5,
            expand_queries: true,
        }
    }
}

impl VisionSettings {
    pub fn timeouts(&self) -> VisionTimeouts {
        VisionTimeouts {
            describe: Duration::from_secs(self.describe_timeout_secs),
            expand: Duration::from_secs(self.expand_timeout_secs),
            probe: Duration::from_secs(self.probe_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_top_k: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_top_k: 12 }
    }
}

impl MemoraConfig {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(RetrieverError::InvalidConfig(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        let config: Self = toml::from_str(&text).map_err(|e| {
            RetrieverError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `<root>/memora.toml`.
    pub fn load_for_root(root: &Path) -> Result<Self> {
        Self::load(&root.join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(RetrieverError::InvalidConfig(msg.to_string()));

        if self.indexer.extensions.is_empty() {
            return invalid("indexer.extensions must list at least one extension");
        }
        if self.indexer.max_workers == 0 {
            return invalid("indexer.max_workers must be at least 1");
        }
        if self.indexer.thumbnail_size < 16 {
            return invalid("indexer.thumbnail_size must be at least 16");
        }
        if !(1..=100).contains(&self.indexer.thumbnail_quality) {
            return invalid("indexer.thumbnail_quality must be between 1 and 100");
        }
        if self.indexer.preview_size < self.indexer.thumbnail_size {
            return invalid("indexer.preview_size must not be smaller than thumbnail_size");
        }
        if self.search.default_top_k == 0 {
            return invalid("search.default_top_k must be at least 1");
        }
        if self.embedding.batch_size == Some(0) {
            return invalid("embedding.batch_size must be at least 1");
        }
        Ok(())
    }
}

impl EmbeddingSettings {
    pub fn is_hashing(&self) -> bool {
        self.model.eq_ignore_ascii_case(HASHING_MODEL)
    }

    /// Construct the configured embedder. Loading a fastembed model may download it.
    pub async fn build_provider(&self, root: &Path) -> Result<Arc<dyn EmbeddingProvider>> {
        if self.is_hashing() {
            info!("Using offline hashing embedder");
            return Ok(Arc::new(HashingEmbedProvider::default()));
        }

        let cache_dir = self
            .cache_dir
            .clone()
            .unwrap_or_else(|| root.join(".memora-models"));
        let mut embed_config = EmbedConfig::new(cache_dir, self.model.clone());
        if let Some(batch_size) = self.batch_size {
            embed_config = embed_config.with_batch_size(batch_size);
        }

        let provider = FastEmbedProvider::create(embed_config)
            .await
            .map_err(|e| RetrieverError::InvalidConfig(format!("embedding model: {e}")))?;
        Ok(Arc::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let config = MemoraConfig::load_for_root(temp_dir.path())?;

        assert_eq!(config, MemoraConfig::default());
        assert_eq!(config.indexer.index_policy, IndexPolicy::FullRebuild);
        assert_eq!(config.search.default_top_k, 12);
        assert!(config.indexer.extensions.contains(&"webp".to_string()));
        Ok(())
    }

    #[test]
    fn test_partial_file_overrides() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            r#"
            [embedding]
            model = "hashing"

            [indexer]
            max_workers = 2
            ocr = false
            index_policy = "incremental"

            [vision]
            expand_timeout_secs = 1
            "#,
        )?;

        let config = MemoraConfig::load_for_root(temp_dir.path())?;
        assert!(config.embedding.is_hashing());
        assert_eq!(config.indexer.max_workers, 2);
        assert!(!config.indexer.ocr);
        assert_eq!(config.indexer.index_policy, IndexPolicy::Incremental);
        assert_eq!(config.indexer.thumbnail_size, 256);
        assert_eq!(config.vision.timeouts().expand, Duration::from_secs(1));
        assert_eq!(config.vision.timeouts().describe, Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn test_invalid_values_rejected() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "[indexer]\nmax_workers = 0\n")?;
        assert!(matches!(
            MemoraConfig::load(&path),
            Err(RetrieverError::InvalidConfig(_))
        ));

        std::fs::write(&path, "[indexer\n")?;
        assert!(matches!(
            MemoraConfig::load(&path),
            Err(RetrieverError::InvalidConfig(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_hashing_provider_needs_no_download() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let settings = EmbeddingSettings {
            model: "Hashing".to_string(),
            ..EmbeddingSettings::default()
        };
        let provider = settings.build_provider(temp_dir.path()).await?;
        assert_eq!(provider.provider_name(), "hashing");
        Ok(())
    }
}
