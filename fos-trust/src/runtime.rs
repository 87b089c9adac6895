//! Startup and shutdown of the trust core as one unit.

use crate::config::TrustConfig;
use crate::error::{TrustCoreError, TrustCoreResult};
use crate::keys::load_signing_key;
use chrono::Utc;
use fos_audit::{AuditKey, AuditLog, AuditSink};
use fos_certificate::{
    CertificateIssuer, CertificateSigner, CertificateVerifier, IssueRequest,
    ProcessingCertificate, SequenceAllocator, VerificationOutcome,
};
use fos_crypto::KeyRing;
use fos_license::{
    spawn_revalidation, FingerprintSource, LastSeenStore, LicenseGate, LicenseStatus,
    LicenseValidator,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The running trust core: audit log, license gate, background
/// revalidation and, when a signing key is configured, certificate issuance.
pub struct TrustCore {
    audit: Arc<AuditLog>,
    gate: Arc<LicenseGate>,
    validator: Arc<LicenseValidator>,
    issuer: Option<CertificateIssuer>,
    verifier: CertificateVerifier,
    shutdown: watch::Sender<bool>,
    revalidation: JoinHandle<()>,
}

impl TrustCore {
    /// Opens every store named in `config`, validates the grant once and
    /// starts background revalidation.
    ///
    /// A missing or unreadable grant does not fail startup: the gate stays
    /// closed and every module is denied.
    ///
    /// # Errors
    ///
    /// Audit log, clock store, sequence store or signing key could not be
    /// opened.
    pub async fn start(
        config: TrustConfig,
        keyring: KeyRing,
        fingerprints: Arc<dyn FingerprintSource>,
    ) -> TrustCoreResult<Self> {
        let key = AuditKey::load_or_create(&config.audit.key_file)?;
        let audit = Arc::new(AuditLog::open(config.audit.to_audit_config(), key)?);
        let sink: Arc<dyn AuditSink> = audit.clone();

        let mut clock = LastSeenStore::open(&config.license.last_seen_path)?;
        raise_clock_floor(&mut clock, &audit)?;
        let gate = Arc::new(LicenseGate::with_audit(Arc::clone(&sink)));
        let validator = Arc::new(
            LicenseValidator::new(keyring.clone(), clock, Arc::clone(&gate), Arc::clone(&sink))
                .with_tolerance(config.license.clock_tolerance()),
        );

        if config.license.grant_path.exists() {
            match validator.load_grant(&config.license.grant_path) {
                Ok(grant) => {
                    let source = Arc::clone(&fingerprints);
                    let local = tokio::task::spawn_blocking(move || source.collect())
                        .await
                        .map_err(|e| TrustCoreError::Io(std::io::Error::other(e)))?;
                    let result = validator.validate(&grant, Utc::now(), &local);
                    info!(status = %result.status, "Initial license validation");
                }
                Err(e) => warn!(error = %e, "License grant unusable, all modules locked"),
            }
        } else {
            warn!(path = %config.license.grant_path.display(), "No license grant installed");
        }

        let issuer = match (
            &config.certificates.signing_key_file,
            &config.certificates.signing_key_id,
        ) {
            (Some(path), Some(key_id)) => {
                let signing_key = load_signing_key(path, key_id)?;
                let allocator = SequenceAllocator::open(&config.certificates.sequence_store)?;
                info!(key_id = %key_id, "Certificate signing enabled");
                Some(CertificateIssuer::new(
                    Arc::clone(&gate),
                    allocator,
                    CertificateSigner::new(signing_key, Arc::clone(&sink)),
                    Arc::clone(&sink),
                ))
            }
            (None, None) => None,
            _ => {
                return Err(TrustCoreError::SigningKey(
                    "signing_key_file and signing_key_id must be set together".into(),
                ));
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let revalidation = spawn_revalidation(
            Arc::clone(&validator),
            fingerprints,
            config.license.schedule(),
            shutdown_rx,
        );

        Ok(Self {
            audit,
            gate,
            validator,
            issuer,
            verifier: CertificateVerifier::new(keyring, sink),
            shutdown,
            revalidation,
        })
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<LicenseGate> {
        &self.gate
    }

    #[must_use]
    pub fn validator(&self) -> &Arc<LicenseValidator> {
        &self.validator
    }

    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    #[must_use]
    pub fn status(&self) -> LicenseStatus {
        self.validator.status()
    }

    /// Issues a certificate through the gate.
    ///
    /// # Errors
    ///
    /// `SigningDisabled` without a configured key; otherwise whatever
    /// issuance reports.
    pub fn issue_certificate(&self, request: IssueRequest) -> TrustCoreResult<ProcessingCertificate> {
        let issuer = self.issuer.as_ref().ok_or(TrustCoreError::SigningDisabled)?;
        Ok(issuer.issue(request, Utc::now())?)
    }

    pub fn verify_certificate(&self, certificate: &ProcessingCertificate) -> VerificationOutcome {
        self.verifier.verify(certificate)
    }

    /// Stops revalidation, closes the gate and flushes the audit log.
    pub async fn shutdown(self) -> TrustCoreResult<()> {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.revalidation.await {
            warn!(error = %e, "Revalidation task ended abnormally");
        }
        self.gate.dispose();
        self.audit.flush_async().await?;
        info!("Trust core stopped");
        Ok(())
    }
}

/// The audit trail is a second witness of elapsed time: a deleted or
/// rewound last-seen file cannot drop below the newest audit entry.
fn raise_clock_floor(clock: &mut LastSeenStore, audit: &AuditLog) -> TrustCoreResult<()> {
    if let Some(recorded) = audit.last_recorded_at() {
        if clock.advance(recorded)? {
            info!(last_seen = %recorded, "Raised last-seen time to newest audit entry");
        }
    }
    Ok(())
}
