//! Catalog storage for indexed images.
//!
//! The catalog is the source of truth: one [`MemoryRecord`] per distinct
//! content hash, including its embedding. The in-memory vector index is always
//! derived from it.
//!
//! ## Key Components
//!
//! - **CatalogStore**: the operations the indexer, retriever and status API need
//! - **ContentCatalog**: SQLite implementation stored next to the images
//! - **MemoryRecord**: strongly typed row of the `memories` table

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use memora_vision::VisionConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod sqlite_store;

pub use memora_vision::VisionStatus;
pub use sqlite_store::{CATALOG_FILE_NAME, ContentCatalog};

/// One indexed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Stable identifier derived from the content hash
    pub file_id: String,
    /// Absolute path where the content was last seen
    pub path: String,
    /// Hex blake3 digest of the file bytes
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Capture time from EXIF, in the camera's local time
    pub exif_date: Option<NaiveDateTime>,
    pub ocr_text: Option<String>,
    pub caption: Option<String>,
    pub memory_summary: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip)]
    pub thumbnail: Option<Vec<u8>>,
    pub vision_json: Option<String>,
    pub vision_status: VisionStatus,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryRecord {
    /// Tags as stored in the catalog's `tags` column.
    pub fn tags_text(&self) -> String {
        self.tags.join(", ")
    }

    /// Lowercased summary and tags, the text keyword boosting matches against.
    pub fn keyword_text(&self) -> String {
        format!(
            "{} {}",
            self.memory_summary.as_deref().unwrap_or(""),
            self.tags_text()
        )
        .to_lowercase()
    }
}

/// An embedding together with the identity it is indexed under.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub file_id: String,
    pub path: String,
    pub vector: Vec<f32>,
}

/// Embeddings are persisted as f16; vectors handed to the index are widened
/// from that stored form so every code path sees identical values.
pub fn quantize(vector: &[f32]) -> Vec<half::f16> {
    vector.iter().map(|&x| half::f16::from_f32(x)).collect()
}

pub fn dequantize(vector: &[half::f16]) -> Vec<f32> {
    vector.iter().map(|x| x.to_f32()).collect()
}

/// Storage operations over the image catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a record or replace the one with the same `file_id`.
    async fn upsert_record(&self, record: &MemoryRecord) -> Result<()>;

    async fn get_record(&self, file_id: &str) -> Result<Option<MemoryRecord>>;

    async fn contains_hash(&self, hash: &str) -> Result<bool>;

    /// Records ordered by `created_at`, newest first.
    async fn list_records(&self, limit: usize, offset: usize) -> Result<Vec<MemoryRecord>>;

    /// Every stored embedding, in catalog insertion order.
    async fn embedded_vectors(&self) -> Result<Vec<IndexedVector>>;

    async fn count_records(&self) -> Result<usize>;

    async fn count_embedded(&self) -> Result<usize>;

    /// Record counts keyed by `vision_status`.
    async fn vision_status_counts(&self) -> Result<BTreeMap<String, usize>>;

    async fn thumbnail(&self, file_id: &str) -> Result<Option<Vec<u8>>>;

    async fn vision_config(&self) -> Result<Option<VisionConfig>>;

    async fn save_vision_config(&self, config: &VisionConfig) -> Result<()>;

    /// On-disk size of the catalog, when it is file-backed.
    async fn database_size_bytes(&self) -> Result<Option<u64>>;
}
