//! In-memory exact nearest-neighbour index over catalog embeddings.
//!
//! The index is a flat array scanned with squared L2 distance. It is never
//! persisted: it is rebuilt from the catalog on demand, and between rebuilds it
//! only grows through [`VectorIndex::insert`].
//!
//! Readers clone an `Arc` snapshot under a short read lock, so a search never
//! observes a half-built index. Writers build the replacement off to the side
//! and swap it in.

use crate::storage::{CatalogStore, IndexedVector};
use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// One nearest-neighbour result. Lower scores are closer.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub file_id: String,
    pub path: String,
    pub score: f32,
}

#[derive(Debug, Default)]
struct FlatIndex {
    vectors: Vec<f32>,
    entries: Vec<(String, String)>,
}

impl FlatIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn push(&mut self, item: IndexedVector) {
        self.vectors.extend_from_slice(&item.vector);
        self.entries.push((item.file_id, item.path));
    }
}

#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    inner: RwLock<Arc<FlatIndex>>,
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(Arc::new(FlatIndex::default())),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Replace the index contents with every embedding in the catalog.
    ///
    /// Embeddings of the wrong width (written under a different model) are
    /// skipped. Returns the number of vectors indexed.
    pub async fn build_from_catalog(&self, catalog: &dyn CatalogStore) -> Result<usize> {
        let vectors = catalog.embedded_vectors().await?;

        let mut fresh = FlatIndex::default();
        let mut mismatched = 0usize;
        for item in vectors {
            if item.vector.len() != self.dimension {
                mismatched += 1;
                continue;
            }
            fresh.push(item);
        }

        if mismatched > 0 {
            warn!(
                "Skipped {} embeddings whose dimension is not {}; rescan to re-embed them",
                mismatched, self.dimension
            );
        }

        let count = fresh.len();
        *self.inner.write().await = Arc::new(fresh);
        info!("Built vector index with {} entries", count);
        Ok(count)
    }

    /// Add vectors to the current index without a rebuild.
    ///
    /// An entry with a `file_id` already present replaces the old one, so the
    /// index never holds two vectors for the same record.
    pub async fn insert(&self, items: Vec<IndexedVector>) -> Result<usize> {
        for item in &items {
            if item.vector.len() != self.dimension {
                bail!(
                    "vector for {} has dimension {}, index expects {}",
                    item.file_id,
                    item.vector.len(),
                    self.dimension
                );
            }
        }
        if items.is_empty() {
            return Ok(0);
        }

        let mut guard = self.inner.write().await;
        let added = items.len();
        let order: Vec<String> = items.iter().map(|i| i.file_id.clone()).collect();
        let mut pending: HashMap<String, IndexedVector> = items
            .into_iter()
            .map(|item| (item.file_id.clone(), item))
            .collect();

        // Replacements keep their position, matching the catalog's rowid order.
        let mut next = FlatIndex::default();
        for (position, (file_id, path)) in guard.entries.iter().enumerate() {
            match pending.remove(file_id) {
                Some(item) => next.push(item),
                None => {
                    let start = position * self.dimension;
                    next.push(IndexedVector {
                        file_id: file_id.clone(),
                        path: path.clone(),
                        vector: guard.vectors[start..start + self.dimension].to_vec(),
                    });
                }
            }
        }
        for file_id in order {
            if let Some(item) = pending.remove(&file_id) {
                next.push(item);
            }
        }
        *guard = Arc::new(next);
        Ok(added)
    }

    /// The `top_k` closest entries, closest first. Ties keep index order.
    ///
    /// # Panics
    ///
    /// If `query` does not have the index dimension.
    pub async fn search(&self, query: &[f32], top_k: usize) -> Vec<SearchHit> {
        assert_eq!(
            query.len(),
            self.dimension,
            "query vector dimension does not match the index"
        );

        let snapshot = self.inner.read().await.clone();
        if snapshot.len() == 0 || top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = snapshot
            .vectors
            .chunks_exact(self.dimension)
            .map(|v| squared_l2(query, v))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(position, score)| {
                let (file_id, path) = &snapshot.entries[position];
                SearchHit {
                    file_id: file_id.clone(),
                    path: path.clone(),
                    score,
                }
            })
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn file_ids(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .map(|(file_id, _)| file_id.clone())
            .collect()
    }
}
