//! Typed failures for trust operations.
//!
//! Every failed `validate`, `verify` or `parse` call carries an [`ErrorKind`]
//! plus a human-readable reason and an optional structured details map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Classification of a trust failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A signature did not verify against the canonical bytes.
    SignatureInvalid,
    /// The named signing key is not in the trusted key set.
    UnknownSigningKey,
    /// A stored content hash disagrees with the recomputed one.
    HashMismatch,
    /// A certificate id check digit disagrees with its data segments.
    ChecksumMismatch,
    /// Input does not match the expected grammar.
    FormatMismatch,
    /// A certificate sequence number is outside `1..=9999`.
    SequenceOutOfRange,
    /// Too few hardware fingerprints match the license binding.
    FingerprintMismatch,
    /// The system clock moved backwards beyond tolerance.
    ClockTamperSuspected,
    /// The license is past its expiry and grace period.
    Expired,
    /// A structured document could not be decoded or violates its invariants.
    MalformedPayload,
    /// Input was empty after trimming.
    EmptyInput,
    /// The requested module is not covered by the current license.
    ModuleNotLicensed,
    /// A request names a license or licensee other than the one in force.
    LicenseMismatch,
}

impl ErrorKind {
    /// Stable identifier used in audit details and CLI output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "signature_invalid",
            Self::UnknownSigningKey => "unknown_signing_key",
            Self::HashMismatch => "hash_mismatch",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::FormatMismatch => "format_mismatch",
            Self::SequenceOutOfRange => "sequence_out_of_range",
            Self::FingerprintMismatch => "fingerprint_mismatch",
            Self::ClockTamperSuspected => "clock_tamper_suspected",
            Self::Expired => "expired",
            Self::MalformedPayload => "malformed_payload",
            Self::EmptyInput => "empty_input",
            Self::ModuleNotLicensed => "module_not_licensed",
            Self::LicenseMismatch => "license_mismatch",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed trust operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {reason}")]
pub struct TrustFailure {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Human-readable explanation for logs and UI messaging.
    pub reason: String,
    /// Structured context (key ids, expected/actual values, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl TrustFailure {
    /// Creates a failure with no details.
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            details: BTreeMap::new(),
        }
    }

    /// Adds a detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Returns true if this failure has the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

/// Result type for trust operations.
pub type TrustResult<T> = Result<T, TrustFailure>;
