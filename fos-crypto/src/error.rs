//! Error types for key handling and signature checks.

use fos_types::{ErrorKind, TrustFailure};
use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in key lookup and signature verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No trusted key with this id.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    /// The key declares an algorithm this build cannot verify.
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The stored public key bytes are not a valid key.
    #[error("invalid public key for {0}")]
    InvalidPublicKey(String),

    /// The signature could not be decoded.
    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    /// Signature verification failed.
    #[error("signature verification failed")]
    SignatureInvalid,
}

impl CryptoError {
    /// Maps the error onto the trust failure taxonomy.
    ///
    /// Everything except an unknown key id is reported as `SignatureInvalid`.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownKey(_) => ErrorKind::UnknownSigningKey,
            _ => ErrorKind::SignatureInvalid,
        }
    }
}

impl From<CryptoError> for TrustFailure {
    fn from(err: CryptoError) -> Self {
        let kind = err.kind();
        let failure = TrustFailure::new(kind, err.to_string());
        match err {
            CryptoError::UnknownKey(id) => failure.with_detail("signing_key_id", id),
            _ => failure,
        }
    }
}
