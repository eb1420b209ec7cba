//! Incremental directory scanning into the content catalog.
//!
//! A scan runs in three passes:
//!
//! 1. **Triage** (sequential): discover image files, hash their bytes, and
//!    drop content already in the catalog or already seen in this scan.
//! 2. **Preparation** (up to `max_workers` files at once): decode, thumbnail,
//!    enrich and embed each remaining file. Output order follows input order.
//! 3. **Persist** (sequential): upsert each prepared record. The catalog has a
//!    single writer.
//!
//! Errors on a single file are logged and counted; they never abort the scan.

use crate::config::IndexerSettings;
use crate::retrieval::media::{self, ContentHash};
use crate::storage::{
    CatalogStore, IndexedVector, MemoryRecord, VisionStatus, dequantize, quantize,
};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use memora_embed::EmbeddingProvider;
use memora_vision::{Enrichment, EnrichmentPipeline};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counts reported by a scan. Failed files are also counted as skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub summary: ScanSummary,
    /// Vectors of every record written by the scan, for incremental indexing
    pub indexed: Vec<IndexedVector>,
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    content: ContentHash,
}

pub struct Indexer {
    catalog: Arc<dyn CatalogStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    pipeline: EnrichmentPipeline,
    settings: IndexerSettings,
}

impl Indexer {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        pipeline: EnrichmentPipeline,
        settings: IndexerSettings,
    ) -> Self {
        Self {
            catalog,
            embedder,
            pipeline,
            settings,
        }
    }

    /// Index every supported image under `root`.
    ///
    /// Without `rebuild`, content whose hash is already catalogued is skipped
    /// untouched. With `rebuild`, every file is re-processed and its record
    /// replaced.
    pub async fn scan(&self, root: &Path, rebuild: bool) -> Result<ScanOutcome> {
        let files = {
            let root = root.to_path_buf();
            let extensions = self.settings.extensions.clone();
            tokio::task::spawn_blocking(move || media::discover_files(&root, &extensions)).await?
        };
        info!(
            "Scanning {} files under {} (rebuild: {})",
            files.len(),
            root.display(),
            rebuild
        );

        let mut summary = ScanSummary::default();
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for path in files {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    summary.failed += 1;
                    summary.skipped += 1;
                    continue;
                }
            };

            let content = media::content_hash(&bytes);
            if !seen.insert(content.hash.clone()) {
                debug!("Duplicate content at {}, skipping", path.display());
                summary.skipped += 1;
                continue;
            }
            if !rebuild && self.catalog.contains_hash(&content.hash).await? {
                summary.skipped += 1;
                continue;
            }
            candidates.push(Candidate { path, content });
        }

        let prepared: Vec<(PathBuf, Result<MemoryRecord>)> = stream::iter(candidates)
            .map(|candidate| async move {
                let result = self.prepare(&candidate).await;
                (candidate.path, result)
            })
            .buffered(self.settings.max_workers.max(1))
            .collect()
            .await;

        let mut indexed = Vec::new();
        for (path, result) in prepared {
            let stored = match result {
                Ok(record) => {
                    let written = self.catalog.upsert_record(&record).await;
                    written.map(|_| record)
                }
                Err(e) => Err(e),
            };

            match stored {
                Ok(record) => {
                    summary.added += 1;
                    if let Some(vector) = record.embedding {
                        indexed.push(IndexedVector {
                            file_id: record.file_id,
                            path: record.path,
                            vector,
                        });
                    }
                }
                Err(e) => {
                    warn!("Failed to index {}: {:#}", path.display(), e);
                    summary.failed += 1;
                    summary.skipped += 1;
                }
            }
        }

        info!(
            "Scan finished: {} added, {} skipped, {} failed",
            summary.added, summary.skipped, summary.failed
        );
        Ok(ScanOutcome { summary, indexed })
    }

    /// Build the full record for one file. Bytes are re-read here so only
    /// `max_workers` files are held in memory at once.
    async fn prepare(&self, candidate: &Candidate) -> Result<MemoryRecord> {
        let path = &candidate.path;
        let bytes = tokio::fs::read(path).await?;
        if media::content_hash(&bytes) != candidate.content {
            bail!("file changed during scan");
        }

        let modified_at: DateTime<Utc> = tokio::fs::metadata(path).await?.modified()?.into();

        let image = media::prepare_image_blocking(
            bytes,
            self.settings.thumbnail_size,
            self.settings.preview_size,
            self.settings.thumbnail_quality,
        )
        .await?;

        let enrichment = self.pipeline.enrich(path, &image.preview).await;
        let existing = self.catalog.get_record(&candidate.content.file_id).await?;
        let enrichment = keep_completed_enrichment(enrichment, existing.as_ref());

        let text = embedding_text(path, &enrichment);
        let vector = self.embedder.embed_text(&text).await?;

        Ok(MemoryRecord {
            file_id: candidate.content.file_id.clone(),
            path: path.to_string_lossy().into_owned(),
            hash: candidate.content.hash.clone(),
            created_at: image
                .exif_date
                .map(|date| date.and_utc())
                .unwrap_or(modified_at),
            modified_at,
            exif_date: image.exif_date,
            ocr_text: enrichment.ocr_text,
            caption: enrichment.caption,
            memory_summary: enrichment.summary,
            tags: enrichment.tags,
            thumbnail: Some(image.thumbnail),
            vision_json: enrichment.vision_json,
            vision_status: enrichment.vision_status,
            // Round-trip through the stored precision so incremental inserts
            // match what a rebuild would load.
            embedding: Some(dequantize(&quantize(&vector))),
        })
    }
}

/// A record already described by the vision backend keeps that description
/// when re-enrichment does worse.
fn keep_completed_enrichment(fresh: Enrichment, existing: Option<&MemoryRecord>) -> Enrichment {
    let Some(existing) = existing else {
        return fresh;
    };

    let status = existing.vision_status.advance(fresh.vision_status);
    if status == fresh.vision_status {
        return fresh;
    }

    Enrichment {
        ocr_text: fresh.ocr_text.or_else(|| existing.ocr_text.clone()),
        caption: existing.caption.clone(),
        summary: existing.memory_summary.clone(),
        tags: existing.tags.clone(),
        vision_json: existing.vision_json.clone(),
        vision_status: status,
    }
}

/// The text a record is embedded from, never empty.
///
/// In order of preference: the vision summary (or caption) with its tags,
/// OCR text with filename words, filename and parent directory words, and
/// finally the literal `image`.
pub fn embedding_text(path: &Path, enrichment: &Enrichment) -> String {
    let mut parts = Vec::new();
    if let Some(description) = enrichment
        .summary
        .as_deref()
        .or(enrichment.caption.as_deref())
        .filter(|s| !s.trim().is_empty())
    {
        parts.push(description.trim().to_string());
    }
    if !enrichment.tags.is_empty() {
        parts.push(enrichment.tags.join(", "));
    }
    if !parts.is_empty() {
        return parts.join(". ");
    }

    let filename = media::filename_tokens(path);
    if let Some(ocr) = enrichment
        .ocr_text
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let mut text = ocr.to_string();
        if !filename.is_empty() {
            text.push(' ');
            text.push_str(&filename.join(" "));
        }
        return text;
    }

    let mut words = filename;
    words.extend(media::parent_tokens(path));
    if words.is_empty() {
        "image".to_string()
    } else {
        words.join(" ")
    }
}
