//! Shared test helpers for trust core wiring tests.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use fos_certificate::IssueRequest;
use fos_crypto::{KeyRing, SigningKey};
use fos_license::{
    ClientInfo, FingerprintBinding, OfflineLicenseGrant, ProductInfo, SCHEMA_VERSION,
};
use fos_trust::TrustConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const LICENSE_KEY_ID: &str = "test-2024-01";
pub const CERT_KEY_ID: &str = "test-cert-01";
const CERT_SEED: [u8; 32] = [5u8; 32];

/// Returns a deterministic license signing key from a fixed seed.
pub fn license_key() -> SigningKey {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    SigningKey::from_bytes(LICENSE_KEY_ID, &seed)
}

pub fn cert_key() -> SigningKey {
    SigningKey::from_bytes(CERT_KEY_ID, &CERT_SEED)
}

/// Trusts both test keys.
pub fn test_keyring() -> KeyRing {
    KeyRing::new()
        .with_key(license_key().trusted_public_key())
        .with_key(cert_key().trusted_public_key())
}

pub fn local_fingerprints() -> BTreeSet<String> {
    ["machine:A".to_string(), "disk:B".to_string()].into()
}

pub fn signed_grant() -> OfflineLicenseGrant {
    let now = Utc::now();
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
        issued_at: now - Duration::days(10),
        expires_at: now + Duration::days(355),
        grace_period_days: 7,
        modules: ["processing".to_string()].into(),
        features: ["export.pdf".to_string()].into(),
        binding: FingerprintBinding {
            fingerprints: ["machine:A", "disk:B", "net:C"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            min_matching: 2,
        },
        signing_key_id: String::new(),
        signature: String::new(),
    }
    .signed_with(&license_key())
}

/// Config rooted in `root` with the grant installed and signing enabled.
pub fn installed(root: &Path) -> TrustConfig {
    let mut config = TrustConfig::rooted_at(root);
    std::fs::write(
        &config.license.grant_path,
        signed_grant().to_json_pretty().unwrap(),
    )
    .unwrap();

    let key_file = root.join("certificate.key");
    std::fs::write(&key_file, hex::encode(CERT_SEED)).unwrap();
    config.certificates.signing_key_file = Some(key_file);
    config.certificates.signing_key_id = Some(CERT_KEY_ID.into());
    config
}

pub fn request(module_id: &str) -> IssueRequest {
    IssueRequest {
        license_id: "LIC-2024-00017".into(),
        licensee_code: "NSB".into(),
        module_id: module_id.into(),
        module_version: "4.2.1".into(),
        project_metadata: BTreeMap::from([("project".to_string(), "Borssele".to_string())]),
        processing_data: BTreeMap::from([("lines".to_string(), "412".to_string())]),
        input_files: vec!["raw/line_001.all".into()],
        output_files: vec!["grid/bathy_1m.tif".into()],
        signatory_name: "J. de Vries".into(),
        company_name: "Northsea Survey BV".into(),
    }
}
