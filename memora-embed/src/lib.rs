//! # memora-embed
//!
//! Text embedding providers for the memora image memory index.
//!
//! ## Providers
//!
//! - [`FastEmbedProvider`]: local ONNX sentence-embedding models via fastembed
//!   (default `all-MiniLM-L6-v2`, 384 dimensions)
//! - [`HashingEmbedProvider`]: deterministic feature hashing, no model files needed
//!
//! Both implement [`EmbeddingProvider`], which is the only thing the indexer and
//! retriever depend on. Providers are deterministic for identical input and their
//! dimension is fixed at construction.
//!
//! ## Quick Start
//!
//! ```no_run
//! use memora_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::all_minilm_l6_v2("/tmp/models")).await?;
//! let vector = provider.embed_text("a red kite over the beach").await?;
//! assert_eq!(vector.len(), provider.embedding_dimension());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hashing;
pub mod provider;

// Re-export main types for easy access
pub use config::{DEFAULT_DIMENSION, DEFAULT_MODEL_NAME, EmbedConfig};
pub use error::{EmbedError, Result};
pub use hashing::HashingEmbedProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
