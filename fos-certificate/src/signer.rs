//! Certificate signing and verification.
//!
//! Verification checks the stored `dataHash` before anything else, so a
//! tampered certificate is rejected without any asymmetric work.

use crate::certificate::{CertificateDraft, ProcessingCertificate};
use fos_audit::{events, AuditEvent, AuditSink};
use fos_crypto::{decode_signature, encode_signature, CryptoError, KeyRing, SigningKey};
use fos_types::{ErrorKind, TrustFailure, TrustResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of [`CertificateVerifier::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub is_valid: bool,
    /// True only if the asymmetric check ran and passed.
    pub is_signature_verified: bool,
    pub reason: Option<TrustFailure>,
}

impl VerificationOutcome {
    fn valid() -> Self {
        Self {
            is_valid: true,
            is_signature_verified: true,
            reason: None,
        }
    }

    fn invalid(reason: TrustFailure) -> Self {
        Self {
            is_valid: false,
            is_signature_verified: false,
            reason: Some(reason),
        }
    }
}

/// Signs drafts with one private key.
pub struct CertificateSigner {
    key: SigningKey,
    audit: Arc<dyn AuditSink>,
}

impl CertificateSigner {
    pub fn new(key: SigningKey, audit: Arc<dyn AuditSink>) -> Self {
        Self { key, audit }
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        self.key.key_id()
    }

    /// Computes the hash and signature for `draft`. Deterministic.
    pub fn sign(&self, draft: CertificateDraft) -> ProcessingCertificate {
        let mut certificate = ProcessingCertificate::unsigned(draft, self.key.key_id());
        let canonical = certificate.canonical_bytes();
        certificate.data_hash = fos_crypto::sha256_hex(&canonical);
        certificate.signature = encode_signature(&self.key.sign(&canonical));

        self.audit.record(
            AuditEvent::new(events::CERTIFICATE_SIGN, "certificate signed", true)
                .with_detail("certificateId", certificate.certificate_id.to_string())
                .with_detail("moduleId", certificate.module_id.as_str())
                .with_detail("signingKeyId", certificate.signing_key_id.as_str())
                .with_detail("dataHash", certificate.data_hash.as_str()),
        );
        debug!(certificate_id = %certificate.certificate_id, "Signed certificate");
        certificate
    }
}

/// Compares the stored `dataHash` with the recomputed one.
///
/// # Errors
///
/// `HashMismatch` carrying both hashes.
pub fn check_data_hash(certificate: &ProcessingCertificate) -> TrustResult<()> {
    let actual = certificate.compute_data_hash();
    if actual == certificate.data_hash {
        return Ok(());
    }
    Err(
        TrustFailure::new(ErrorKind::HashMismatch, "certificate content does not match its hash")
            .with_detail("expected", certificate.data_hash.as_str())
            .with_detail("actual", actual),
    )
}

/// Verifies certificates against the trusted key ring.
pub struct CertificateVerifier {
    keyring: KeyRing,
    audit: Arc<dyn AuditSink>,
}

impl CertificateVerifier {
    pub fn new(keyring: KeyRing, audit: Arc<dyn AuditSink>) -> Self {
        Self { keyring, audit }
    }

    /// Checks hash, key and signature, in that order, and audits the result.
    pub fn verify(&self, certificate: &ProcessingCertificate) -> VerificationOutcome {
        let outcome = match self.check(certificate) {
            Ok(()) => VerificationOutcome::valid(),
            Err(reason) => VerificationOutcome::invalid(reason),
        };
        self.record(&certificate.certificate_id.to_string(), &outcome);
        outcome
    }

    /// Parses and verifies a certificate document.
    pub fn verify_json(&self, json: &str) -> VerificationOutcome {
        match ProcessingCertificate::from_json(json) {
            Ok(certificate) => self.verify(&certificate),
            Err(reason) => {
                let outcome = VerificationOutcome::invalid(reason);
                self.record("unparsed", &outcome);
                outcome
            }
        }
    }

    fn check(&self, certificate: &ProcessingCertificate) -> TrustResult<()> {
        check_data_hash(certificate)?;
        if self.keyring.get(&certificate.signing_key_id).is_none() {
            return Err(CryptoError::UnknownKey(certificate.signing_key_id.clone()).into());
        }
        let signature = decode_signature(&certificate.signature)?;
        self.keyring.verify(
            &certificate.signing_key_id,
            &certificate.canonical_bytes(),
            &signature,
        )?;
        Ok(())
    }

    fn record(&self, certificate_id: &str, outcome: &VerificationOutcome) {
        let mut event = AuditEvent::new(
            events::CERTIFICATE_VERIFY,
            if outcome.is_valid {
                "certificate verified"
            } else {
                "certificate rejected"
            },
            outcome.is_valid,
        )
        .with_detail("certificateId", certificate_id);
        if let Some(reason) = &outcome.reason {
            event = event.with_detail("errorKind", reason.kind.as_str());
            warn!(certificate_id, kind = %reason.kind, "Certificate verification failed");
        }
        self.audit.record(event);
    }
}
