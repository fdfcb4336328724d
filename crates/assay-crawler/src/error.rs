use std::fmt;
use std::time::Duration;

use assay_inventory::error::InventoryError;
use assay_inventory::InventoryKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type SourceResult<T> = Result<T, SourceError>;

/// Errors reported by an external metadata source for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("corrupted metadata: {0}")]
    Corrupted(String),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        SourceError::Unavailable(message.into())
    }

    /// Transient failures that are worth another attempt within the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Unavailable(_) | SourceError::Timeout(_))
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("source error: {0}")]
    Source(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] InventoryError),
    #[error("crawl of {0} was cancelled")]
    Cancelled(InventoryKind),
    #[error("missing upstream snapshot: {0}")]
    MissingUpstream(InventoryKind),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl CrawlError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CrawlError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CrawlError::InternalError(message.into())
    }
}

impl From<SourceError> for CrawlError {
    fn from(error: SourceError) -> Self {
        if error.is_retryable() {
            CrawlError::SourceUnavailable(error.to_string())
        } else {
            CrawlError::Source(error.to_string())
        }
    }
}

/// A source entry that could not be read and was left out of the crawl.
/// Skipped entries never fail a crawl; they are counted in the snapshot metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub key: String,
    pub cause: String,
}

impl SkippedEntry {
    pub fn new(key: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            key: key.into(),
            cause: cause.to_string(),
        }
    }
}

impl fmt::Display for SkippedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partial enumeration: skipped {}: {}", self.key, self.cause)
    }
}

/// A conflict in the crawled topology that was resolved by a tie-break rule.
/// These are reported as warnings and never fail a crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyWarning {
    pub subject: String,
    pub message: String,
}

impl TopologyWarning {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for TopologyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inconsistent topology at {}: {}",
            self.subject, self.message
        )
    }
}
