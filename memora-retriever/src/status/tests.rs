#[cfg(test)]
mod test_suite {
    use super::super::api::StatusApi;
    use super::super::types::ConsistencyStatus;
    use crate::retrieval::VectorIndex;
    use crate::storage::{
        CatalogStore, ContentCatalog, IndexedVector, MemoryRecord, VisionStatus,
    };
    use anyhow::Result;
    use chrono::Utc;
    use memora_vision::VisionConfig;

    async fn catalog_with(records: &[(&str, VisionStatus, bool)]) -> Result<ContentCatalog> {
        let catalog = ContentCatalog::open_memory().await?;
        let now = Utc::now();
        for (id, status, embedded) in records {
            catalog
                .upsert_record(&MemoryRecord {
                    file_id: id.to_string(),
                    path: format!("/m/{id}.jpg"),
                    hash: format!("hash-{id}"),
                    created_at: now,
                    modified_at: now,
                    exif_date: None,
                    ocr_text: None,
                    caption: None,
                    memory_summary: None,
                    tags: Vec::new(),
                    thumbnail: None,
                    vision_json: None,
                    vision_status: *status,
                    embedding: embedded.then(|| vec![1.0, 0.0]),
                })
                .await?;
        }
        Ok(catalog)
    }

    #[tokio::test]
    async fn test_catalog_statistics() -> Result<()> {
        let catalog = catalog_with(&[
            ("a", VisionStatus::Done, true),
            ("b", VisionStatus::Skipped, true),
            ("c", VisionStatus::Skipped, false),
        ])
        .await?;

        let stats = StatusApi::catalog_statistics(&catalog).await?;
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.embedded_records, 2);
        assert_eq!(stats.vision_status_counts.get("skipped"), Some(&2));
        assert_eq!(stats.vision_status_counts.get("done"), Some(&1));
        assert_eq!(stats.database_size_bytes, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_consistent_after_build() -> Result<()> {
        let catalog = catalog_with(&[
            ("a", VisionStatus::Skipped, true),
            ("b", VisionStatus::Skipped, true),
            ("c", VisionStatus::Skipped, false),
        ])
        .await?;
        let index = VectorIndex::new(2);
        index.build_from_catalog(&catalog).await?;

        let report = StatusApi::index_consistency(&catalog, &index).await?;
        assert_eq!(report.overall_status, ConsistencyStatus::Healthy);
        assert_eq!(report.issues_summary.total_issues, 0);
        assert_eq!(report.checks_performed.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_index_is_flagged() -> Result<()> {
        let catalog = catalog_with(&[("a", VisionStatus::Skipped, true)]).await?;
        let index = VectorIndex::new(2);
        index
            .insert(vec![IndexedVector {
                file_id: "ghost".to_string(),
                path: "/m/ghost.jpg".to_string(),
                vector: vec![0.0, 1.0],
            }])
            .await?;

        let report = StatusApi::index_consistency(&catalog, &index).await?;
        assert_eq!(report.overall_status, ConsistencyStatus::Warning);
        let orphans = report
            .checks_performed
            .iter()
            .find(|c| c.check_name == "orphaned_vectors")
            .unwrap();
        assert_eq!(orphans.issues_found, 1);
        assert!(orphans.issue_details[0].contains("ghost"));
        assert!(!report.issues_summary.recommendations.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_vision_backend_hides_key() -> Result<()> {
        let catalog = catalog_with(&[]).await?;
        assert!(!StatusApi::vision_backend(&catalog).await?.configured);

        catalog
            .save_vision_config(
                &VisionConfig::new("http://localhost:11434", "llava").with_api_key("secret"),
            )
            .await?;
        let status = StatusApi::vision_backend(&catalog).await?;
        assert!(status.configured);
        assert!(status.has_api_key);
        assert_eq!(status.model_name.as_deref(), Some("llava"));
        assert!(!serde_json::to_string(&status)?.contains("secret"));
        Ok(())
    }
}
