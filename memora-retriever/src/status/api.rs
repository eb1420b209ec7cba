use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;

use crate::retrieval::VectorIndex;
use crate::storage::CatalogStore;

use super::types::*;

/// Read-only status queries over a catalog and its vector index
pub struct StatusApi;

/// Cap on per-check issue details so a badly broken index stays readable.
const MAX_ISSUE_DETAILS: usize = 20;

impl StatusApi {
    pub async fn catalog_statistics(catalog: &dyn CatalogStore) -> Result<CatalogStatistics> {
        Ok(CatalogStatistics {
            total_records: catalog.count_records().await?,
            embedded_records: catalog.count_embedded().await?,
            vision_status_counts: catalog.vision_status_counts().await?,
            database_size_bytes: catalog.database_size_bytes().await?,
        })
    }

    pub async fn vision_backend(catalog: &dyn CatalogStore) -> Result<VisionBackendStatus> {
        let config = catalog.vision_config().await?;
        Ok(VisionBackendStatus {
            configured: config.is_some(),
            has_api_key: config.as_ref().is_some_and(|c| c.bearer_token().is_some()),
            endpoint_url: config.as_ref().map(|c| c.endpoint_url.clone()),
            model_name: config.map(|c| c.model_name),
        })
    }

    /// Compare the live index against the catalog.
    ///
    /// Two checks: the index holds exactly as many vectors as there are
    /// embedded records, and every indexed `file_id` still has a record.
    pub async fn index_consistency(
        catalog: &dyn CatalogStore,
        index: &VectorIndex,
    ) -> Result<IndexConsistencyReport> {
        let embedded = catalog.embedded_vectors().await?;
        let indexed_ids = index.file_ids().await;

        let mut checks = Vec::new();

        let count_issue = (indexed_ids.len() != embedded.len()).then(|| {
            format!(
                "index holds {} vectors, catalog has {} embedded records",
                indexed_ids.len(),
                embedded.len()
            )
        });
        checks.push(Self::check(
            "vector_count",
            "Index size matches embedded catalog records",
            embedded.len(),
            count_issue.into_iter().collect(),
        ));

        let catalog_ids: HashSet<&str> = embedded.iter().map(|v| v.file_id.as_str()).collect();
        let orphans: Vec<String> = indexed_ids
            .iter()
            .filter(|id| !catalog_ids.contains(id.as_str()))
            .map(|id| format!("indexed file_id {} has no embedded catalog record", id))
            .collect();
        checks.push(Self::check(
            "orphaned_vectors",
            "Every indexed file_id resolves to a catalog record",
            indexed_ids.len(),
            orphans,
        ));

        let total_issues: usize = checks.iter().map(|c| c.issues_found).sum();
        let mut recommendations = Vec::new();
        if total_issues > 0 {
            recommendations.push("Run `memora scan` to rebuild the vector index".to_string());
        }

        Ok(IndexConsistencyReport {
            overall_status: if total_issues == 0 {
                ConsistencyStatus::Healthy
            } else {
                ConsistencyStatus::Warning
            },
            checks_performed: checks,
            issues_summary: IssuesSummary {
                total_issues,
                recommendations,
            },
            check_timestamp: Utc::now().timestamp(),
        })
    }

    fn check(
        name: &str,
        description: &str,
        items_checked: usize,
        issues: Vec<String>,
    ) -> ConsistencyCheck {
        ConsistencyCheck {
            check_name: name.to_string(),
            status: if issues.is_empty() {
                ConsistencyStatus::Healthy
            } else {
                ConsistencyStatus::Warning
            },
            description: description.to_string(),
            items_checked,
            issues_found: issues.len(),
            issue_details: issues.into_iter().take(MAX_ISSUE_DETAILS).collect(),
        }
    }
}
