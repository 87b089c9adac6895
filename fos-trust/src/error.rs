//! Errors raised while wiring the trust core together.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrustCoreError {
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid signing key: {0}")]
    SigningKey(String),

    #[error("certificate signing is not configured")]
    SigningDisabled,

    #[error(transparent)]
    Audit(#[from] fos_audit::AuditError),

    #[error(transparent)]
    License(#[from] fos_license::LicenseError),

    #[error(transparent)]
    Certificate(#[from] fos_certificate::CertificateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TrustCoreResult<T> = Result<T, TrustCoreError>;
