//! Error types for the licensing crate.

use fos_types::TrustFailure;
use thiserror::Error;

/// Licensing errors that are not a validation outcome.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// A trust decision failed (malformed grant, unlicensed module, ...).
    #[error(transparent)]
    Trust(#[from] TrustFailure),

    /// `revalidate` was called before any grant was loaded.
    #[error("no license grant loaded")]
    NoGrant,

    /// Persisted state could not be interpreted.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
