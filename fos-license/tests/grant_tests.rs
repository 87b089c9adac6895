mod common;

use chrono::Utc;
use common::{set, signed_grant, test_keyring, unsigned_grant, TEST_KEY_ID};
use fos_crypto::decode_signature;
use fos_license::OfflineLicenseGrant;
use fos_types::ErrorKind;
use pretty_assertions::assert_eq;

#[test]
fn signing_sets_key_id_and_signature() {
    let grant = signed_grant(Utc::now());
    assert_eq!(grant.signing_key_id, TEST_KEY_ID);
    assert_eq!(decode_signature(&grant.signature).unwrap().len(), 64);
    assert!(test_keyring()
        .verify(TEST_KEY_ID, &grant.canonical_bytes(), &decode_signature(&grant.signature).unwrap())
        .is_ok());
}

#[test]
fn json_uses_camel_case_fields() {
    let json = signed_grant(Utc::now()).to_json_pretty().unwrap();
    for key in [
        "licenseId",
        "schemaVersion",
        "issuedAt",
        "expiresAt",
        "gracePeriodDays",
        "minMatching",
        "signingKeyId",
    ] {
        assert!(json.contains(&format!("\"{key}\"")), "missing {key}");
    }
}

#[test]
fn json_roundtrip_keeps_signature_valid() {
    let grant = signed_grant(Utc::now());
    let parsed = OfflineLicenseGrant::from_json(&grant.to_json_pretty().unwrap()).unwrap();
    assert_eq!(parsed, grant);
    assert_eq!(parsed.canonical_bytes(), grant.canonical_bytes());
}

#[test]
fn malformed_json_is_malformed_payload() {
    let err = OfflineLicenseGrant::from_json("{\"licenseId\": 12}").unwrap_err();
    assert_eq!(err.kind, ErrorKind::MalformedPayload);
    assert!(err.details.contains_key("error"));
}

#[test]
fn canonical_bytes_exclude_signature() {
    let grant = signed_grant(Utc::now());
    let mut other = grant.clone();
    other.signature = "AAAA".into();
    assert_eq!(grant.canonical_bytes(), other.canonical_bytes());
}

#[test]
fn canonical_bytes_ignore_set_insertion_order() {
    let now = Utc::now();
    let mut a = unsigned_grant(now);
    let mut b = unsigned_grant(now);
    a.modules = set(&["reports", "processing", "qc"]);
    b.modules = set(&["qc", "processing", "reports"]);
    assert_eq!(a.canonical_bytes(), b.canonical_bytes());
}

#[test]
fn invariants_reject_impossible_binding() {
    let mut grant = unsigned_grant(Utc::now());
    grant.binding.min_matching = 4;
    let err = grant.check_invariants().unwrap_err();
    assert_eq!(err.kind, ErrorKind::MalformedPayload);
}

#[test]
fn invariants_reject_inverted_dates() {
    let mut grant = unsigned_grant(Utc::now());
    std::mem::swap(&mut grant.issued_at, &mut grant.expires_at);
    assert_eq!(
        grant.check_invariants().unwrap_err().kind,
        ErrorKind::MalformedPayload
    );
}

#[test]
fn invariants_reject_unknown_schema() {
    let mut grant = unsigned_grant(Utc::now());
    grant.schema_version = 2;
    assert!(grant.check_invariants().is_err());
}

#[test]
fn masked_id_hides_prefix() {
    assert_eq!(unsigned_grant(Utc::now()).masked_id(), "**********0017");
}
