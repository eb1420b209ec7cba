//! memora-retriever: local image memory indexing and hybrid search
//!
//! Point it at a directory of photos and screenshots. Every image is hashed,
//! thumbnailed, optionally OCR'd and captioned by a vision model, embedded, and
//! recorded in a SQLite catalog stored alongside the images. Searches combine
//! vector similarity with keyword matches on captions and tags.
//!
//! ## Key Modules
//!
//! - **[`session`]**: The mounted-directory context and its operations
//! - **[`retrieval`]**: Indexer, vector index and hybrid re-ranking
//! - **[`storage`]**: Catalog abstraction with SQLite implementation
//! - **[`status`]**: Catalog statistics and index consistency checks
//! - **[`config`]**: `memora.toml` settings
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memora_retriever::config::MemoraConfig;
//! use memora_retriever::retrieval::SearchRequest;
//! use memora_retriever::session::Session;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let root = Path::new("/media/photos");
//! let (session, _) = Session::mount(root, MemoraConfig::load_for_root(root)?).await?;
//! session.scan(false).await?;
//!
//! for hit in session.search(&SearchRequest::new("birthday cake")).await? {
//!     println!("{:.3} {}", hit.score, hit.path);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Files → Indexer → EnrichmentPipeline → Embedder → ContentCatalog (SQLite)
//!                                                        ↓ rebuild
//! Query → (expansion) → Embedder → VectorIndex → re-rank → ResultView
//! ```

pub mod config;
pub mod error;
pub mod retrieval;
pub mod session;
pub mod status;
pub mod storage;

pub use error::{Result, RetrieverError};
