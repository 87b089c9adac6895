//! The signed offline license grant.
//!
//! A grant is a JSON document issued by the licensing back office and
//! verified entirely offline. Its `signature` covers the canonical encoding of
//! every other field, so the JSON layout itself (key order, whitespace) is
//! irrelevant to validity.

use chrono::{DateTime, Duration, Utc};
use fos_crypto::{encode_signature, CanonicalEncoder, SigningKey};
use fos_types::{ErrorKind, TrustFailure, TrustResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The only grant schema this build understands.
pub const SCHEMA_VERSION: u32 = 1;

const DOMAIN: &str = "fos.license.v1";

/// Licensee the grant was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    /// Three-letter licensee code used in certificate ids.
    pub code: String,
    pub email: String,
}

/// Product and edition. The edition is reported as the license tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInfo {
    pub name: String,
    pub edition: String,
}

/// Hardware binding: at least `min_matching` of `fingerprints` must be
/// present on the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintBinding {
    pub fingerprints: BTreeSet<String>,
    pub min_matching: u32,
}

/// A signed, offline-verifiable license grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineLicenseGrant {
    pub license_id: String,
    pub schema_version: u32,
    pub client: ClientInfo,
    pub product: ProductInfo,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub grace_period_days: u32,
    #[serde(default)]
    pub modules: BTreeSet<String>,
    #[serde(default)]
    pub features: BTreeSet<String>,
    pub binding: FingerprintBinding,
    pub signing_key_id: String,
    /// Base64 Ed25519 signature over [`canonical_bytes`](Self::canonical_bytes).
    #[serde(default)]
    pub signature: String,
}

impl OfflineLicenseGrant {
    /// Parses a grant document.
    ///
    /// # Errors
    ///
    /// `MalformedPayload` if the text is not a grant.
    pub fn from_json(json: &str) -> TrustResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            TrustFailure::new(ErrorKind::MalformedPayload, "license grant is not valid JSON")
                .with_detail("error", e.to_string())
        })
    }

    /// Serializes the grant as pretty JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Canonical bytes of every field except `signature`.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new(DOMAIN)
            .str("licenseId", &self.license_id)
            .u32("schemaVersion", self.schema_version)
            .str("client.name", &self.client.name)
            .str("client.code", &self.client.code)
            .str("client.email", &self.client.email)
            .str("product.name", &self.product.name)
            .str("product.edition", &self.product.edition)
            .timestamp("issuedAt", &self.issued_at)
            .timestamp("expiresAt", &self.expires_at)
            .u32("gracePeriodDays", self.grace_period_days)
            .string_set("modules", &self.modules)
            .string_set("features", &self.features)
            .string_set("binding.fingerprints", &self.binding.fingerprints)
            .u32("binding.minMatching", self.binding.min_matching)
            .str("signingKeyId", &self.signing_key_id)
            .finish()
    }

    /// Signs the grant with `key`, replacing `signing_key_id` and `signature`.
    #[must_use]
    pub fn signed_with(mut self, key: &SigningKey) -> Self {
        self.signing_key_id = key.key_id().to_string();
        self.signature = encode_signature(&key.sign(&self.canonical_bytes()));
        self
    }

    /// End of the grace window, saturating at the latest representable instant.
    #[must_use]
    pub fn grace_deadline(&self) -> DateTime<Utc> {
        Duration::try_days(i64::from(self.grace_period_days))
            .and_then(|grace| self.expires_at.checked_add_signed(grace))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Structural checks run after the signature has verified.
    ///
    /// # Errors
    ///
    /// `MalformedPayload` naming the violated invariant.
    pub fn check_invariants(&self) -> TrustResult<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(TrustFailure::new(
                ErrorKind::MalformedPayload,
                "unsupported grant schema version",
            )
            .with_detail("schemaVersion", self.schema_version.to_string()));
        }
        let fingerprints = self.binding.fingerprints.len();
        if self.binding.min_matching as usize > fingerprints {
            return Err(TrustFailure::new(
                ErrorKind::MalformedPayload,
                "binding requires more matches than it lists fingerprints",
            )
            .with_detail("minMatching", self.binding.min_matching.to_string())
            .with_detail("fingerprints", fingerprints.to_string()));
        }
        if self.issued_at > self.expires_at {
            return Err(TrustFailure::new(
                ErrorKind::MalformedPayload,
                "grant expires before it was issued",
            ));
        }
        Ok(())
    }

    /// The license id with all but the last four characters masked.
    #[must_use]
    pub fn masked_id(&self) -> String {
        mask_license_id(&self.license_id)
    }
}

/// Masks all but the last four characters with `*`. Ids of four characters
/// or fewer are masked entirely.
#[must_use]
pub fn mask_license_id(id: &str) -> String {
    let len = id.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    id.chars()
        .enumerate()
        .map(|(i, c)| if i < len - 4 { '*' } else { c })
        .collect()
}
