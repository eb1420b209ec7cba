//! Per-file enrichment: OCR plus optional vision captioning.

use crate::client::{ImageDescription, VisionClient};
use crate::config::{VisionConfig, VisionTimeouts};
use crate::error::Result;
use crate::ocr::OcrEngine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Expansions this short are treated as degenerate.
pub const MIN_EXPANSION_LEN: usize = 6;

/// Enrichment state of a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionStatus {
    Pending,
    Done,
    Skipped,
    Failed,
}

impl VisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisionStatus::Pending => "pending",
            VisionStatus::Done => "done",
            VisionStatus::Skipped => "skipped",
            VisionStatus::Failed => "failed",
        }
    }

    /// The status to store when a record that is currently `self` is
    /// re-enriched with outcome `next`.
    ///
    /// Nothing moves back to `pending`, and `done` is never replaced by a
    /// worse outcome.
    pub fn advance(self, next: VisionStatus) -> VisionStatus {
        match (self, next) {
            (current, VisionStatus::Pending) => current,
            (VisionStatus::Done, _) => VisionStatus::Done,
            (_, next) => next,
        }
    }
}

impl fmt::Display for VisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(VisionStatus::Pending),
            "done" => Ok(VisionStatus::Done),
            "skipped" => Ok(VisionStatus::Skipped),
            "failed" => Ok(VisionStatus::Failed),
            other => Err(format!("unknown vision status: {other}")),
        }
    }
}

/// Everything enrichment produced for one image. Fields stay `None` when the
/// corresponding step did not run or did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub ocr_text: Option<String>,
    pub caption: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub vision_json: Option<String>,
    pub vision_status: VisionStatus,
}

impl Enrichment {
    fn without_vision(ocr_text: Option<String>, vision_status: VisionStatus) -> Self {
        Self {
            ocr_text,
            caption: None,
            summary: None,
            tags: Vec::new(),
            vision_json: None,
            vision_status,
        }
    }
}

/// Orchestrates OCR and the optional vision backend.
///
/// The backend is a capability: when it is absent, no network call is ever
/// made and every record is marked [`VisionStatus::Skipped`].
#[derive(Clone)]
pub struct EnrichmentPipeline {
    ocr: Option<Arc<dyn OcrEngine>>,
    vision: Option<VisionClient>,
}

impl fmt::Debug for EnrichmentPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichmentPipeline")
            .field("ocr", &self.ocr.as_ref().map(|ocr| ocr.engine_name().to_string()))
            .field("vision", &self.vision.as_ref().map(|v| v.config().model_name.clone()))
            .finish()
    }
}

impl EnrichmentPipeline {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>, vision: Option<VisionClient>) -> Self {
        Self { ocr, vision }
    }

    /// Build a pipeline from an optional stored backend configuration.
    pub fn from_config(
        ocr: Option<Arc<dyn OcrEngine>>,
        vision: Option<VisionConfig>,
        timeouts: VisionTimeouts,
    ) -> Result<Self> {
        let vision = vision
            .map(|config| VisionClient::new(config, timeouts))
            .transpose()?;
        Ok(Self::new(ocr, vision))
    }

    pub fn has_vision(&self) -> bool {
        self.vision.is_some()
    }

    /// Enrich one image. Never fails.
    ///
    /// `image_path` is handed to OCR. `preview_jpeg` is the (downscaled) JPEG
    /// uploaded to the vision backend.
    pub async fn enrich(&self, image_path: &Path, preview_jpeg: &[u8]) -> Enrichment {
        let ocr_text = self.run_ocr(image_path).await;

        let Some(vision) = &self.vision else {
            return Enrichment::without_vision(ocr_text, VisionStatus::Skipped);
        };

        match vision.describe_image(preview_jpeg, "image/jpeg").await {
            Ok(ImageDescription {
                caption,
                summary,
                tags,
                raw,
            }) => {
                debug!("Described {}: {:?}", image_path.display(), caption);
                Enrichment {
                    ocr_text,
                    caption,
                    summary,
                    tags,
                    vision_json: Some(raw),
                    vision_status: VisionStatus::Done,
                }
            }
            Err(e) => {
                warn!("Vision enrichment failed for {}: {}", image_path.display(), e);
                Enrichment::without_vision(ocr_text, VisionStatus::Failed)
            }
        }
    }

    async fn run_ocr(&self, image_path: &Path) -> Option<String> {
        let ocr = self.ocr.as_ref()?;
        match ocr.extract_text(image_path).await {
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => Some(text),
            Err(e) => {
                debug!("OCR skipped for {}: {}", image_path.display(), e);
                None
            }
        }
    }

    /// Expand a search query through the vision backend.
    ///
    /// Returns `None` when no backend is configured, the call fails or times
    /// out, or the rewrite is degenerate. Callers then search with the raw query.
    pub async fn expand_query(&self, query: &str) -> Option<String> {
        let vision = self.vision.as_ref()?;
        match vision.expand_query(query).await {
            Ok(expansion) => {
                let accepted = accept_expansion(query, &expansion);
                if let Some(expanded) = &accepted {
                    info!("Rewrote query '{}' -> '{}'", query, expanded);
                }
                accepted
            }
            Err(e) => {
                warn!("Query expansion failed, using raw query: {}", e);
                None
            }
        }
    }
}

/// Minimum-length and echo guard for query rewrites.
pub fn accept_expansion(query: &str, expansion: &str) -> Option<String> {
    let expansion = expansion.trim();
    if expansion.chars().count() < MIN_EXPANSION_LEN {
        return None;
    }
    if expansion.to_lowercase() == query.trim().to_lowercase() {
        return None;
    }
    Some(expansion.to_string())
}
