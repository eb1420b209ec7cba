//! The mounted-directory context every operation runs against.
//!
//! A [`Session`] owns the catalog connection, the live vector index and the
//! model handles for one mounted directory. It is created by
//! [`Session::mount`] (or [`Session::open`] for an existing catalog) and
//! passed explicitly to callers; there is no process-wide state.

use crate::config::{IndexPolicy, MemoraConfig};
use crate::error::{Result, RetrieverError};
use crate::retrieval::{HybridRetriever, Indexer, ResultView, ScanSummary, SearchRequest, VectorIndex};
use crate::status::{StatusApi, StatusReport};
use crate::storage::{CatalogStore, ContentCatalog, MemoryRecord};
use memora_embed::EmbeddingProvider;
use memora_vision::{EnrichmentPipeline, OcrEngine, ProbeReport, TesseractOcr, VisionConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Returned by [`Session::mount`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MountInfo {
    pub db_path: PathBuf,
    /// Vectors loaded into the index from an existing catalog
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub mounted_path: PathBuf,
    pub catalog_count: usize,
    pub index_count: usize,
}

pub struct Session {
    root: PathBuf,
    config: MemoraConfig,
    catalog: Arc<ContentCatalog>,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.root)
            .field("embedder", &self.embedder.provider_name())
            .field("ocr", &self.ocr.as_ref().map(|o| o.engine_name().to_string()))
            .finish()
    }
}

fn resolve_root(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Err(RetrieverError::InvalidMountPath(path.to_path_buf()));
    }
    path.canonicalize()
        .map_err(|_| RetrieverError::InvalidMountPath(path.to_path_buf()))
}

async fn configured_components(
    root: &Path,
    config: &MemoraConfig,
) -> Result<(Arc<dyn EmbeddingProvider>, Option<Arc<dyn OcrEngine>>)> {
    let embedder = config.embedding.build_provider(root).await?;
    let ocr: Option<Arc<dyn OcrEngine>> = config
        .indexer
        .ocr
        .then(|| Arc::new(TesseractOcr::new()) as Arc<dyn OcrEngine>);
    Ok((embedder, ocr))
}

impl Session {
    /// Mount `path`, creating its catalog if needed, with the embedder and
    /// OCR engine selected by `config`.
    pub async fn mount(path: &Path, config: MemoraConfig) -> Result<(Self, MountInfo)> {
        let root = resolve_root(path)?;
        let (embedder, ocr) = configured_components(&root, &config).await?;
        Self::mount_with(&root, config, embedder, ocr).await
    }

    /// Mount `path` with explicit model handles.
    pub async fn mount_with(
        path: &Path,
        config: MemoraConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        ocr: Option<Arc<dyn OcrEngine>>,
    ) -> Result<(Self, MountInfo)> {
        let root = resolve_root(path)?;
        let catalog = Arc::new(ContentCatalog::open(&root).await?);
        let index = Arc::new(VectorIndex::new(embedder.embedding_dimension()));
        let count = index.build_from_catalog(catalog.as_ref()).await?;

        let info = MountInfo {
            db_path: ContentCatalog::db_path_for(&root),
            count,
        };
        info!("Mounted {} ({} indexed)", root.display(), count);

        let session = Self {
            root,
            config,
            catalog,
            index,
            embedder,
            ocr,
        };
        Ok((session, info))
    }

    /// Open a directory that has already been mounted.
    ///
    /// Fails with [`RetrieverError::NoIndexAvailable`] when there is no catalog.
    pub async fn open(path: &Path, config: MemoraConfig) -> Result<Self> {
        let root = resolve_root(path)?;
        if !ContentCatalog::exists(&root) {
            return Err(RetrieverError::NoIndexAvailable);
        }
        let (embedder, ocr) = configured_components(&root, &config).await?;
        Ok(Self::mount_with(&root, config, embedder, ocr).await?.0)
    }

    pub async fn open_with(
        path: &Path,
        config: MemoraConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        ocr: Option<Arc<dyn OcrEngine>>,
    ) -> Result<Self> {
        let root = resolve_root(path)?;
        if !ContentCatalog::exists(&root) {
            return Err(RetrieverError::NoIndexAvailable);
        }
        Ok(Self::mount_with(&root, config, embedder, ocr).await?.0)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &MemoraConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ContentCatalog {
        &self.catalog
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// OCR plus whatever vision backend is currently stored in the catalog.
    async fn enrichment_pipeline(&self) -> Result<EnrichmentPipeline> {
        let vision = self.catalog.vision_config().await?;
        let timeouts = self.config.vision.timeouts();
        Ok(
            EnrichmentPipeline::from_config(self.ocr.clone(), vision, timeouts).unwrap_or_else(
                |e| {
                    warn!("Ignoring stored vision backend: {}", e);
                    EnrichmentPipeline::new(self.ocr.clone(), None)
                },
            ),
        )
    }

    /// Index new content under the mounted root, then bring the vector index
    /// up to date according to the configured [`IndexPolicy`].
    pub async fn scan(&self, rescan: bool) -> Result<ScanSummary> {
        self.scan_path(None, rescan).await
    }

    /// Like [`Session::scan`], over `path` instead of the mounted root.
    ///
    /// Relative paths are taken from the mounted root. Records always go to the
    /// mounted catalog, whatever directory they come from.
    pub async fn scan_path(&self, path: Option<&Path>, rescan: bool) -> Result<ScanSummary> {
        let target = match path {
            Some(path) => resolve_root(&self.root.join(path))?,
            None => self.root.clone(),
        };

        let pipeline = self.enrichment_pipeline().await?;
        let indexer = Indexer::new(
            self.catalog.clone(),
            self.embedder.clone(),
            pipeline,
            self.config.indexer.clone(),
        );

        let outcome = indexer.scan(&target, rescan).await?;

        match self.config.indexer.index_policy {
            IndexPolicy::FullRebuild => {
                self.index.build_from_catalog(self.catalog.as_ref()).await?;
            }
            IndexPolicy::Incremental => {
                let inserted = self.index.insert(outcome.indexed).await?;
                info!("Inserted {} vectors into the live index", inserted);
            }
        }
        Ok(outcome.summary)
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<ResultView>> {
        let retriever = HybridRetriever::new(
            self.catalog.clone(),
            self.index.clone(),
            self.embedder.clone(),
            self.config.search.default_top_k,
        );

        let pipeline = if self.config.vision.expand_queries {
            Some(self.enrichment_pipeline().await?).filter(EnrichmentPipeline::has_vision)
        } else {
            None
        };

        Ok(retriever.search(request, pipeline.as_ref()).await?)
    }

    pub async fn get(&self, file_id: &str) -> Result<MemoryRecord> {
        self.catalog
            .get_record(file_id)
            .await?
            .ok_or_else(|| RetrieverError::not_found("memory", file_id))
    }

    /// Records newest first, as unscored result views.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<ResultView>> {
        Ok(self
            .catalog
            .list_records(limit, offset)
            .await?
            .into_iter()
            .map(|record| ResultView::from_record(record, 0.0))
            .collect())
    }

    /// Raw JPEG bytes of a record's thumbnail.
    pub async fn thumbnail(&self, file_id: &str) -> Result<Vec<u8>> {
        self.catalog
            .thumbnail(file_id)
            .await?
            .ok_or_else(|| RetrieverError::not_found("thumbnail", file_id))
    }

    pub async fn vision_config(&self) -> Result<Option<VisionConfig>> {
        Ok(self.catalog.vision_config().await?)
    }

    /// Store the vision backend used by later scans and searches.
    pub async fn set_vision_config(&self, config: &VisionConfig) -> Result<()> {
        config
            .validate()
            .map_err(|e| RetrieverError::InvalidConfig(e.to_string()))?;
        self.catalog.save_vision_config(config).await?;
        info!(
            "Vision backend set to {} ({})",
            config.base_url(),
            config.model_name
        );
        Ok(())
    }

    /// Probe a backend without storing it.
    pub async fn test_vision_config(&self, config: &VisionConfig) -> ProbeReport {
        memora_vision::probe(config, self.config.vision.timeouts().probe).await
    }

    pub async fn health(&self) -> Result<Health> {
        Ok(Health {
            mounted_path: self.root.clone(),
            catalog_count: self.catalog.count_records().await?,
            index_count: self.index.count().await,
        })
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let catalog = self.catalog.as_ref();
        Ok(StatusReport {
            root: self.root.display().to_string(),
            catalog: StatusApi::catalog_statistics(catalog).await?,
            vision_backend: StatusApi::vision_backend(catalog).await?,
            consistency: StatusApi::index_consistency(catalog, &self.index).await?,
        })
    }
}
