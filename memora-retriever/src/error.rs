//! Boundary error type for session operations.
//!
//! Internals (storage, indexing) work with `anyhow::Result`; these variants
//! are what callers of [`Session`](crate::session::Session) branch on.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RetrieverError>;

#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// The mount path is missing or not a directory
    #[error("path does not exist or is not a directory: {}", .0.display())]
    InvalidMountPath(PathBuf),

    /// No catalog has been created for this directory yet
    #[error("no index available; mount and scan first")]
    NoIndexAvailable,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RetrieverError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<sqlx::Error> for RetrieverError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}
