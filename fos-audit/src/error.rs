//! Error types for the audit log.

use std::path::PathBuf;
use thiserror::Error;

/// Audit-log errors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Filesystem error while reading or writing log files.
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Log files exist but no chain anchor could be recovered from them.
    #[error("no chain anchor recoverable from existing logs in {}", .0.display())]
    AnchorMissing(PathBuf),

    /// The writer lock was poisoned by a panicking appender.
    #[error("audit writer lock poisoned")]
    LockPoisoned,

    /// The audit key is missing or malformed.
    #[error("invalid audit key: {0}")]
    InvalidKey(String),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
