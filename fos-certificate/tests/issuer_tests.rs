mod common;

use chrono::{TimeZone, Utc};
use common::{fixed_now, licensed_gate, request, test_keyring, test_signing_key};
use fos_audit::{events, MemoryAuditSink};
use fos_certificate::{
    CertificateError, CertificateIssuer, CertificateSigner, CertificateVerifier,
    SequenceAllocator,
};
use fos_license::LicenseGate;
use fos_types::{CertificateId, ErrorKind};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn trust_kind(err: &CertificateError) -> Option<ErrorKind> {
    match err {
        CertificateError::Trust(failure) => Some(failure.kind),
        _ => None,
    }
}

// ── Sequence allocation ──────────────────────────────────────────

#[test]
fn sequences_start_at_one_and_increase() {
    let allocator = SequenceAllocator::in_memory();
    let first = allocator.allocate("NSB", fixed_now()).unwrap();
    let second = allocator.allocate("nsb", fixed_now()).unwrap();

    assert_eq!(first.sequence(), 1);
    assert_eq!(second.sequence(), 2);
    assert_eq!(second.licensee_code(), "NSB");
    assert_eq!(second.year_month(), "2410");
    assert_eq!(allocator.last_issued("NSB", "2410").unwrap(), Some(2));
    assert_eq!(CertificateId::parse(&second.to_string()).unwrap(), second);
}

#[test]
fn each_month_and_licensee_counts_separately() {
    let allocator = SequenceAllocator::in_memory();
    let november = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();

    allocator.allocate("NSB", fixed_now()).unwrap();
    allocator.allocate("NSB", fixed_now()).unwrap();
    assert_eq!(allocator.allocate("NSB", november).unwrap().sequence(), 1);
    assert_eq!(allocator.allocate("ABC", fixed_now()).unwrap().sequence(), 1);
    assert_eq!(allocator.last_issued("ABC", "2411").unwrap(), None);
}

#[test]
fn allocations_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("sequences.json");

    {
        let allocator = SequenceAllocator::open(&path).unwrap();
        allocator.allocate("NSB", fixed_now()).unwrap();
        allocator.allocate("NSB", fixed_now()).unwrap();
    }

    let reopened = SequenceAllocator::open(&path).unwrap();
    assert_eq!(reopened.last_issued("NSB", "2410").unwrap(), Some(2));
    assert_eq!(reopened.allocate("NSB", fixed_now()).unwrap().sequence(), 3);
}

#[test]
fn exhausted_month_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sequences.json");
    std::fs::write(&path, r#"{"NSB-2410": 9999}"#).unwrap();

    let allocator = SequenceAllocator::open(&path).unwrap();
    let err = allocator.allocate("NSB", fixed_now()).unwrap_err();
    assert_eq!(trust_kind(&err), Some(ErrorKind::SequenceOutOfRange));
    assert_eq!(allocator.last_issued("NSB", "2410").unwrap(), Some(9999));

    // Next month is fine.
    let november = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
    assert_eq!(allocator.allocate("NSB", november).unwrap().sequence(), 1);
}

#[test]
fn malformed_licensee_code_consumes_nothing() {
    let allocator = SequenceAllocator::in_memory();
    let err = allocator.allocate("NS1", fixed_now()).unwrap_err();
    assert_eq!(trust_kind(&err), Some(ErrorKind::FormatMismatch));
    assert_eq!(allocator.last_issued("NS1", "2410").unwrap(), None);
}

#[test]
fn corrupt_store_is_a_storage_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sequences.json");
    std::fs::write(&path, "not json").unwrap();
    assert!(matches!(
        SequenceAllocator::open(&path),
        Err(CertificateError::Storage(_))
    ));
}

#[test]
fn concurrent_allocations_never_repeat() {
    let allocator = Arc::new(SequenceAllocator::in_memory());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            std::thread::spawn(move || {
                (0..50)
                    .map(|_| allocator.allocate("NSB", fixed_now()).unwrap().sequence())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all: Vec<u16> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    assert_eq!(all, (1..=200).collect::<Vec<u16>>());
}

// ── Issuance ─────────────────────────────────────────────────────

fn issuer(gate: Arc<LicenseGate>, audit: Arc<MemoryAuditSink>) -> CertificateIssuer {
    CertificateIssuer::new(
        gate,
        SequenceAllocator::in_memory(),
        CertificateSigner::new(test_signing_key(), audit.clone()),
        audit,
    )
}

#[test]
fn licensed_module_gets_a_verifiable_certificate() {
    let audit = Arc::new(MemoryAuditSink::new());
    let issuer = issuer(licensed_gate(audit.clone()), audit.clone());

    let certificate = issuer.issue(request("processing"), fixed_now()).unwrap();
    assert_eq!(certificate.certificate_id.to_string().len(), "FOS-NSB-2410-0001-X".len());
    assert_eq!(certificate.certificate_id.sequence(), 1);
    assert_eq!(certificate.module_id, "processing");
    assert_eq!(certificate.issued_at, fixed_now());

    let verifier = CertificateVerifier::new(test_keyring(), audit.clone());
    assert!(verifier.verify(&certificate).is_valid);

    let issued = audit.events_of(events::CERTIFICATE_ISSUE);
    assert_eq!(issued.len(), 1);
    assert!(issued[0].success);
    assert_eq!(audit.events_of(events::CERTIFICATE_SIGN).len(), 1);
}

#[test]
fn unlicensed_module_is_refused_without_consuming_a_sequence() {
    let audit = Arc::new(MemoryAuditSink::new());
    let issuer = issuer(licensed_gate(audit.clone()), audit.clone());

    let err = issuer.issue(request("reports"), fixed_now()).unwrap_err();
    assert_eq!(trust_kind(&err), Some(ErrorKind::ModuleNotLicensed));
    assert_eq!(issuer.allocator().last_issued("NSB", "2410").unwrap(), None);

    let issued = audit.events_of(events::CERTIFICATE_ISSUE);
    assert_eq!(issued.len(), 1);
    assert!(!issued[0].success);
    assert!(audit.events_of(events::CERTIFICATE_SIGN).is_empty());

    // The next licensed run still gets sequence 1.
    let certificate = issuer.issue(request("processing"), fixed_now()).unwrap();
    assert_eq!(certificate.certificate_id.sequence(), 1);
}

#[test]
fn request_must_name_the_license_in_force() {
    let audit = Arc::new(MemoryAuditSink::new());
    let issuer = issuer(licensed_gate(audit.clone()), audit.clone());

    let mut other_license = request("processing");
    other_license.license_id = "LIC-2024-99999".into();
    let err = issuer.issue(other_license, fixed_now()).unwrap_err();
    assert_eq!(trust_kind(&err), Some(ErrorKind::LicenseMismatch));

    let mut other_licensee = request("processing");
    other_licensee.licensee_code = "ABC".into();
    let err = issuer.issue(other_licensee, fixed_now()).unwrap_err();
    assert_eq!(trust_kind(&err), Some(ErrorKind::LicenseMismatch));

    assert_eq!(issuer.allocator().last_issued("NSB", "2410").unwrap(), None);
    assert_eq!(issuer.allocator().last_issued("ABC", "2410").unwrap(), None);
    assert!(audit.events_of(events::CERTIFICATE_SIGN).is_empty());
    let refused = audit.events_of(events::CERTIFICATE_ISSUE);
    assert_eq!(refused.len(), 2);
    assert!(refused.iter().all(|e| !e.success));
}

#[test]
fn uninitialized_gate_refuses_everything() {
    let audit = Arc::new(MemoryAuditSink::new());
    let issuer = issuer(Arc::new(LicenseGate::new()), audit);
    let err = issuer.issue(request("processing"), fixed_now()).unwrap_err();
    assert_eq!(trust_kind(&err), Some(ErrorKind::ModuleNotLicensed));
}

#[test]
fn disposed_gate_refuses_issuance() {
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = licensed_gate(audit.clone());
    let issuer = issuer(gate.clone(), audit);

    assert!(issuer.issue(request("processing"), fixed_now()).is_ok());
    gate.dispose();
    let err = issuer.issue(request("processing"), fixed_now()).unwrap_err();
    assert_eq!(trust_kind(&err), Some(ErrorKind::ModuleNotLicensed));
}
