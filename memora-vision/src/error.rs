//! Error types for OCR and vision backend calls

pub type Result<T> = std::result::Result<T, VisionError>;

/// Failures from the enrichment collaborators.
///
/// None of these abort indexing or search. [`EnrichmentPipeline`](crate::EnrichmentPipeline)
/// turns them into a [`VisionStatus`](crate::VisionStatus) or falls back to the raw query.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Invalid vision configuration: {0}")]
    InvalidConfig(String),

    #[error("Vision backend timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Vision backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Vision backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed vision response: {0}")]
    MalformedResponse(String),

    #[error("OCR failed: {0}")]
    Ocr(String),
}

impl VisionError {
    /// Map a reqwest failure, reporting deadline hits as [`VisionError::Timeout`].
    pub(crate) fn from_request(err: reqwest::Error, timeout: std::time::Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(err)
        }
    }
}
