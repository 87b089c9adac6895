//! Shared test helpers for license tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use fos_crypto::{KeyRing, SigningKey};
use fos_license::{ClientInfo, FingerprintBinding, OfflineLicenseGrant, ProductInfo, SCHEMA_VERSION};
use std::collections::BTreeSet;

pub const TEST_KEY_ID: &str = "test-2024-01";

/// Returns a deterministic signing key from a fixed seed.
pub fn test_signing_key() -> SigningKey {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    SigningKey::from_bytes(TEST_KEY_ID, &seed)
}

/// A key ring trusting only [`test_signing_key`].
pub fn test_keyring() -> KeyRing {
    KeyRing::new().with_key(test_signing_key().trusted_public_key())
}

pub fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Unsigned grant bound to `{A, B, C}` with `minMatching = 2`, expiring in a year.
pub fn unsigned_grant(now: DateTime<Utc>) -> OfflineLicenseGrant {
    OfflineLicenseGrant {
        license_id: "LIC-2024-00017".into(),
        schema_version: SCHEMA_VERSION,
        client: ClientInfo {
            name: "Northsea Survey BV".into(),
            code: "NSB".into(),
            email: "licensing@northsea.example".into(),
        },
        product: ProductInfo {
            name: "FOS Processing Suite".into(),
            edition: "professional".into(),
        },
        issued_at: now - Duration::days(30),
        expires_at: now + Duration::days(335),
        grace_period_days: 7,
        modules: set(&["processing", "reports"]),
        features: set(&["export.pdf", "batch"]),
        binding: FingerprintBinding {
            fingerprints: set(&["machine:A", "disk:B", "net:C"]),
            min_matching: 2,
        },
        signing_key_id: String::new(),
        signature: String::new(),
    }
}

/// [`unsigned_grant`] signed with the test key.
pub fn signed_grant(now: DateTime<Utc>) -> OfflineLicenseGrant {
    unsigned_grant(now).signed_with(&test_signing_key())
}

/// Local fingerprints that satisfy the standard binding.
pub fn matching_local() -> BTreeSet<String> {
    set(&["machine:A", "disk:B"])
}
