//! Shared test helpers for certificate tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use fos_audit::MemoryAuditSink;
use fos_crypto::{KeyRing, SigningKey};
use fos_license::{
    ClientInfo, FingerprintBinding, LastSeenStore, LicenseGate, LicenseValidator,
    OfflineLicenseGrant, ProductInfo, SCHEMA_VERSION,
};
use fos_certificate::{CertificateDraft, IssueRequest};
use fos_types::CertificateId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const TEST_KEY_ID: &str = "test-2024-01";

/// Returns a deterministic signing key from a fixed seed.
pub fn test_signing_key() -> SigningKey {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    SigningKey::from_bytes(TEST_KEY_ID, &seed)
}

pub fn test_keyring() -> KeyRing {
    KeyRing::new().with_key(test_signing_key().trusted_public_key())
}

/// 15 October 2024, 12:00 UTC.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 15, 12, 0, 0).unwrap()
}

pub fn draft() -> CertificateDraft {
    CertificateDraft {
        certificate_id: CertificateId::generate_at("NSB", 1, fixed_now()).unwrap(),
        license_id: "LIC-2024-00017".into(),
        module_id: "processing".into(),
        module_version: "4.2.1".into(),
        issued_at: fixed_now(),
        project_metadata: BTreeMap::from([
            ("project".to_string(), "Borssele Wind Farm".to_string()),
            ("vessel".to_string(), "MV Surveyor".to_string()),
        ]),
        processing_data: BTreeMap::from([
            ("soundVelocity".to_string(), "1502.4".to_string()),
            ("tideModel".to_string(), "LAT-2024".to_string()),
            ("lines".to_string(), "412".to_string()),
        ]),
        input_files: vec!["raw/line_001.all".into(), "raw/line_002.all".into()],
        output_files: vec!["grid/bathy_1m.tif".into()],
        signatory_name: "J. de Vries".into(),
        company_name: "Northsea Survey BV".into(),
    }
}

pub fn request(module_id: &str) -> IssueRequest {
    IssueRequest {
        license_id: "LIC-2024-00017".into(),
        licensee_code: "nsb".into(),
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

/// A gate opened by a valid grant licensing only `processing`.
pub fn licensed_gate(audit: Arc<MemoryAuditSink>) -> Arc<LicenseGate> {
    let now = Utc::now();
    let fingerprints: BTreeSet<String> = ["machine:A".to_string(), "disk:B".to_string()].into();
    let grant = OfflineLicenseGrant {
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
        issued_at: now - Duration::days(1),
        expires_at: now + Duration::days(30),
        grace_period_days: 7,
        modules: ["processing".to_string()].into(),
        features: BTreeSet::new(),
        binding: FingerprintBinding {
            fingerprints: fingerprints.clone(),
            min_matching: 2,
        },
        signing_key_id: String::new(),
        signature: String::new(),
    }
    .signed_with(&test_signing_key());

    let gate = Arc::new(LicenseGate::with_audit(audit.clone()));
    let validator = LicenseValidator::new(
        test_keyring(),
        LastSeenStore::in_memory(None),
        gate.clone(),
        audit,
    );
    let result = validator.validate(&grant, now, &fingerprints);
    assert!(result.is_usable(), "test grant should validate: {:?}", result.reason);
    gate
}
