//! Audit log entries and their chained HMAC.
//!
//! On disk each entry is one JSON object per line with keys in this fixed
//! order, which external integrity tooling relies on:
//!
//! ```text
//! sequence, timestamp, eventType, description, success, details, prevHash, entryHmac
//! ```
//!
//! `entryHmac = HMAC-SHA256(key, prevHash ‖ canonical(all fields but entryHmac))`.

use crate::key::AuditKey;
use crate::sink::AuditEvent;
use chrono::{DateTime, Utc};
use fos_crypto::{hmac_sha256_hex, verify_hmac_sha256, CanonicalEncoder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `prevHash` of the very first entry of a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const DOMAIN: &str = "fos.audit.v1";

/// Event type identifiers written by the trust core.
pub mod events {
    pub const LICENSE_LOAD: &str = "license.load";
    pub const LICENSE_VALIDATION: &str = "license.validation";
    pub const CLOCK_JUMP: &str = "license.clock_jump";
    pub const ACCESS_DECISION: &str = "access.decision";
    pub const CERTIFICATE_SIGN: &str = "certificate.sign";
    pub const CERTIFICATE_VERIFY: &str = "certificate.verify";
    pub const CERTIFICATE_ISSUE: &str = "certificate.issue";
    pub const LOG_ROTATED: &str = "audit.rotated";
    pub const CHAIN_BREAK: &str = "audit.chain_break";
}

/// One record of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub description: String,
    pub success: bool,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
    pub prev_hash: String,
    pub entry_hmac: String,
}

impl AuditLogEntry {
    /// Builds and seals an entry chained from `prev_hash`.
    pub(crate) fn seal(
        key: &AuditKey,
        sequence: u64,
        timestamp: DateTime<Utc>,
        event: AuditEvent,
        prev_hash: String,
    ) -> Self {
        let mut entry = Self {
            sequence,
            timestamp: truncate_to_micros(timestamp),
            event_type: event.event_type,
            description: event.description,
            success: event.success,
            details: event.details,
            prev_hash,
            entry_hmac: String::new(),
        };
        entry.entry_hmac = entry.compute_hmac(key, &entry.prev_hash);
        entry
    }

    /// Canonical bytes of every field except `entryHmac`.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new(DOMAIN)
            .u64("sequence", self.sequence)
            .timestamp("timestamp", &self.timestamp)
            .str("eventType", &self.event_type)
            .str("description", &self.description)
            .bool("success", self.success)
            .string_map("details", &self.details)
            .str("prevHash", &self.prev_hash)
            .finish()
    }

    /// HMAC of this entry when chained from `chain_hash`.
    pub(crate) fn compute_hmac(&self, key: &AuditKey, chain_hash: &str) -> String {
        hmac_sha256_hex(key.as_bytes(), &[chain_hash.as_bytes(), &self.canonical_bytes()])
    }

    /// Checks the stored HMAC against this entry chained from `chain_hash`.
    pub(crate) fn hmac_matches(&self, key: &AuditKey, chain_hash: &str) -> bool {
        verify_hmac_sha256(
            key.as_bytes(),
            &[chain_hash.as_bytes(), &self.canonical_bytes()],
            &self.entry_hmac,
        )
    }
}

/// Drops sub-microsecond precision so the in-memory entry and its parsed
/// JSON line encode to the same canonical bytes.
fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}
