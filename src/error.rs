//! Error types for the loader engine

use thiserror::Error;

/// Convenience Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors surfaced by the fetcher, unpacker, hasher, staging layer and
/// orchestrator.
///
/// Per-branch kinds (`NotFound`, `ChecksumMismatch`, `LengthMismatch`,
/// `UnsafeArchive`, `ArchiveDecodeError`, `AdapterError`) are fatal for a
/// single branch and never retried within a visit. Transient kinds
/// (`StoreUnavailable`, `Io`, `Network`) are retried per their component's
/// policy. `Cancelled` and `Timeout` short-circuit the scope they occur at.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("checksum mismatch for {url}: expected {expected} got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("length mismatch for {url}: expected {expected} got {actual}")]
    LengthMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("unsafe archive entry: {0}")]
    UnsafeArchive(String),

    #[error("archive decode error: {0}")]
    ArchiveDecodeError(String),

    #[error("adapter error: {0}")]
    AdapterError(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("fetch failed for {url}: http {status}")]
    FetchFailed { url: String, status: u16 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl LoaderError {
    /// Per spec.md §4.8: structural errors are fatal for the branch they
    /// occur in and are never retried within the visit; transient errors
    /// are retried per their component's policy.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            LoaderError::NotFound(_)
                | LoaderError::ChecksumMismatch { .. }
                | LoaderError::LengthMismatch { .. }
                | LoaderError::UnsafeArchive(_)
                | LoaderError::ArchiveDecodeError(_)
                | LoaderError::AdapterError(_)
        )
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        !self.is_structural() && !matches!(self, LoaderError::Cancelled | LoaderError::Timeout(_))
    }
}
