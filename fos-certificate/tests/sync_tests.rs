mod common;

use common::{draft, test_signing_key};
use fos_audit::MemoryAuditSink;
use fos_certificate::{
    spawn_sync, CertificateSigner, ProcessingCertificate, RetryPolicy, SyncPayload, SyncStatus,
    SyncTransport,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Fails the first `failures` deliveries, then accepts.
struct FlakyServer {
    failures: u32,
    attempts: AtomicU32,
    received: Mutex<Vec<String>>,
}

impl FlakyServer {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            attempts: AtomicU32::new(0),
            received: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SyncTransport for FlakyServer {
    fn deliver(&self, payload: &SyncPayload) -> Result<(), String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(format!("connection refused (attempt {attempt})"));
        }
        self.received
            .lock()
            .unwrap()
            .push(payload.to_json().unwrap());
        Ok(())
    }
}

fn certificate() -> ProcessingCertificate {
    CertificateSigner::new(test_signing_key(), Arc::new(MemoryAuditSink::new())).sign(draft())
}

fn quick_policy(max_attempts: Option<u32>) -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        multiplier: 2,
        max_attempts,
    }
}

#[tokio::test]
async fn delivered_certificate_is_synced() {
    let server = FlakyServer::new(0);
    let (_tx, rx) = watch::channel(false);

    let synced = spawn_sync(certificate(), server.clone(), quick_policy(Some(3)), rx)
        .await
        .unwrap();

    assert_eq!(synced.sync_status, SyncStatus::Synced);
    assert_eq!(server.attempts(), 1);

    let received = server.received.lock().unwrap();
    let sent: ProcessingCertificate = serde_json::from_str(&received[0]).unwrap();
    assert_eq!(sent.certificate_id, synced.certificate_id);
    assert_eq!(sent.signature, synced.signature);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = FlakyServer::new(3);
    let (_tx, rx) = watch::channel(false);

    let synced = spawn_sync(certificate(), server.clone(), quick_policy(Some(5)), rx)
        .await
        .unwrap();

    assert_eq!(synced.sync_status, SyncStatus::Synced);
    assert_eq!(server.attempts(), 4);
}

#[tokio::test]
async fn exhausted_retries_mark_failed() {
    let server = FlakyServer::new(u32::MAX);
    let (_tx, rx) = watch::channel(false);

    let result = spawn_sync(certificate(), server.clone(), quick_policy(Some(2)), rx)
        .await
        .unwrap();

    assert_eq!(result.sync_status, SyncStatus::Failed);
    // First delivery plus two retries.
    assert_eq!(server.attempts(), 3);
}

#[tokio::test]
async fn failed_certificate_is_retried_from_pending() {
    let server = FlakyServer::new(0);
    let (_tx, rx) = watch::channel(false);
    let mut failed = certificate();
    failed.sync_status = SyncStatus::Failed;

    let synced = spawn_sync(failed, server.clone(), quick_policy(Some(1)), rx)
        .await
        .unwrap();
    assert_eq!(synced.sync_status, SyncStatus::Synced);

    // The server saw it as pending.
    let received = server.received.lock().unwrap();
    let sent: ProcessingCertificate = serde_json::from_str(&received[0]).unwrap();
    assert_eq!(sent.sync_status, SyncStatus::Pending);
}

#[tokio::test]
async fn shutdown_interrupts_backoff() {
    let server = FlakyServer::new(u32::MAX);
    let (tx, rx) = watch::channel(false);
    let policy = RetryPolicy {
        initial_delay: Duration::from_secs(3600),
        max_delay: Duration::from_secs(3600),
        multiplier: 2,
        max_attempts: None,
    };

    let handle = spawn_sync(certificate(), server.clone(), policy, rx);
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("sync task should stop on shutdown")
        .unwrap();
    assert_eq!(result.sync_status, SyncStatus::Failed);
    assert_eq!(server.attempts(), 1);
}

#[tokio::test]
async fn sync_never_changes_signed_content() {
    let original = certificate();
    let (_tx, rx) = watch::channel(false);
    let synced = spawn_sync(original.clone(), FlakyServer::new(0), quick_policy(None), rx)
        .await
        .unwrap();

    assert_eq!(synced.data_hash, original.data_hash);
    assert_eq!(synced.signature, original.signature);
    assert_eq!(synced.canonical_bytes(), original.canonical_bytes());
}
