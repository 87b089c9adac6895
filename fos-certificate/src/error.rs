//! Error types for certificate operations.

use crate::sync::SyncStatus;
use fos_types::TrustFailure;
use thiserror::Error;

/// Certificate errors outside the verification result itself.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// A trust rule rejected the operation.
    #[error(transparent)]
    Trust(#[from] TrustFailure),

    /// A sync status change that the state machine does not allow.
    #[error("invalid sync transition from {from} to {to}")]
    InvalidTransition { from: SyncStatus, to: SyncStatus },

    /// The sequence store could not be interpreted.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for certificate operations.
pub type CertificateResult<T> = Result<T, CertificateError>;
