//! Processing certificates.

use crate::sync::SyncStatus;
use chrono::{DateTime, Utc};
use fos_crypto::{sha256_hex, CanonicalEncoder};
use fos_types::{CertificateId, ErrorKind, TrustFailure, TrustResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DOMAIN: &str = "fos.certificate.v1";

/// Everything a certificate states, before it is signed.
///
/// `certificate_id` must already be allocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDraft {
    pub certificate_id: CertificateId,
    pub license_id: String,
    pub module_id: String,
    pub module_version: String,
    pub issued_at: DateTime<Utc>,
    pub project_metadata: BTreeMap<String, String>,
    pub processing_data: BTreeMap<String, String>,
    pub input_files: Vec<String>,
    pub output_files: Vec<String>,
    pub signatory_name: String,
    pub company_name: String,
}

/// A signed, immutable record that a processing run took place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingCertificate {
    pub certificate_id: CertificateId,
    pub license_id: String,
    pub module_id: String,
    pub module_version: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub project_metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub processing_data: BTreeMap<String, String>,
    #[serde(default)]
    pub input_files: Vec<String>,
    #[serde(default)]
    pub output_files: Vec<String>,
    pub signatory_name: String,
    pub company_name: String,
    pub signing_key_id: String,
    /// Lowercase hex SHA-256 of [`canonical_bytes`](Self::canonical_bytes).
    pub data_hash: String,
    /// Base64 Ed25519 signature over the canonical bytes.
    pub signature: String,
    /// Delivery state towards the tracking server. Not signed.
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl ProcessingCertificate {
    pub(crate) fn unsigned(draft: CertificateDraft, signing_key_id: &str) -> Self {
        Self {
            certificate_id: draft.certificate_id,
            license_id: draft.license_id,
            module_id: draft.module_id,
            module_version: draft.module_version,
            issued_at: draft.issued_at,
            project_metadata: draft.project_metadata,
            processing_data: draft.processing_data,
            input_files: draft.input_files,
            output_files: draft.output_files,
            signatory_name: draft.signatory_name,
            company_name: draft.company_name,
            signing_key_id: signing_key_id.to_string(),
            data_hash: String::new(),
            signature: String::new(),
            sync_status: SyncStatus::Pending,
        }
    }

    /// Parses a certificate document.
    ///
    /// # Errors
    ///
    /// `MalformedPayload` if the text is not a certificate.
    pub fn from_json(json: &str) -> TrustResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            TrustFailure::new(ErrorKind::MalformedPayload, "certificate is not valid JSON")
                .with_detail("error", e.to_string())
        })
    }

    /// Canonical bytes of every signed field. Excludes `dataHash`,
    /// `signature` and `syncStatus`.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new(DOMAIN)
            .str("certificateId", &self.certificate_id.to_string())
            .str("licenseId", &self.license_id)
            .str("moduleId", &self.module_id)
            .str("moduleVersion", &self.module_version)
            .timestamp("issuedAt", &self.issued_at)
            .string_map("projectMetadata", &self.project_metadata)
            .string_map("processingData", &self.processing_data)
            .string_list("inputFiles", &self.input_files)
            .string_list("outputFiles", &self.output_files)
            .str("signatoryName", &self.signatory_name)
            .str("companyName", &self.company_name)
            .str("signingKeyId", &self.signing_key_id)
            .finish()
    }

    /// Recomputes the hash of the canonical bytes.
    #[must_use]
    pub fn compute_data_hash(&self) -> String {
        sha256_hex(&self.canonical_bytes())
    }
}
