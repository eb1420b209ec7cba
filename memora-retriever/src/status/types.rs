use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Catalog contents at a glance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStatistics {
    /// Total records in the catalog
    pub total_records: usize,
    /// Records carrying an embedding
    pub embedded_records: usize,
    /// Record count per vision status
    pub vision_status_counts: BTreeMap<String, usize>,
    /// Catalog database size in bytes
    pub database_size_bytes: Option<u64>,
}

/// Whether the optional vision backend is configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionBackendStatus {
    pub configured: bool,
    pub endpoint_url: Option<String>,
    pub model_name: Option<String>,
    /// The API key itself is never reported
    pub has_api_key: bool,
}

/// Index consistency check results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConsistencyReport {
    /// Overall consistency status
    pub overall_status: ConsistencyStatus,
    /// Checks performed
    pub checks_performed: Vec<ConsistencyCheck>,
    /// Summary of issues found
    pub issues_summary: IssuesSummary,
    /// Timestamp when check was performed
    pub check_timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyStatus {
    Healthy,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyCheck {
    /// Name of the check
    pub check_name: String,
    pub status: ConsistencyStatus,
    /// Description of what was checked
    pub description: String,
    pub items_checked: usize,
    pub issues_found: usize,
    pub issue_details: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuesSummary {
    pub total_issues: usize,
    /// Recommendations for fixing issues
    pub recommendations: Vec<String>,
}

/// Everything `memora status` prints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub root: String,
    pub catalog: CatalogStatistics,
    pub vision_backend: VisionBackendStatus,
    pub consistency: IndexConsistencyReport,
}
