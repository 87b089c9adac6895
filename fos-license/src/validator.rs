//! Offline license validation.
//!
//! [`evaluate`] is the pure decision. [`LicenseValidator`] wraps it with the
//! state a running application needs: the loaded grant, the forward-only
//! clock record, the gate it publishes to and the audit trail.

use crate::clock::LastSeenStore;
use crate::device::{self, FingerprintSource};
use crate::error::{LicenseError, LicenseResult};
use crate::gate::LicenseGate;
use crate::grant::{mask_license_id, OfflineLicenseGrant};
use crate::status::{LicenseStatus, ValidationResult};
use chrono::{DateTime, Duration, Utc};
use fos_audit::{events, AuditEvent, AuditSink};
use fos_crypto::{decode_signature, KeyRing};
use fos_types::{ErrorKind, TrustFailure};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tracing::{info, warn};

/// Default allowance, in seconds, for the clock being behind the last-seen time.
pub const DEFAULT_CLOCK_TOLERANCE_SECS: i64 = 300;

/// Decides the status of `grant` at `now`.
///
/// Checks run in a fixed order and the first failing one decides:
/// key lookup, signature, payload invariants, clock rollback, expiry, grace,
/// fingerprint binding.
#[must_use]
pub fn evaluate(
    grant: &OfflineLicenseGrant,
    keyring: &KeyRing,
    now: DateTime<Utc>,
    local_fingerprints: &BTreeSet<String>,
    last_seen: Option<DateTime<Utc>>,
    tolerance: Duration,
) -> ValidationResult {
    if keyring.get(&grant.signing_key_id).is_none() {
        return ValidationResult::denied(
            LicenseStatus::Invalid,
            TrustFailure::new(ErrorKind::UnknownSigningKey, "grant signed by an unknown key")
                .with_detail("signingKeyId", grant.signing_key_id.as_str()),
        );
    }

    let verified = decode_signature(&grant.signature).and_then(|signature| {
        keyring.verify(&grant.signing_key_id, &grant.canonical_bytes(), &signature)
    });
    if let Err(e) = verified {
        return ValidationResult::denied(LicenseStatus::Invalid, e.into());
    }

    if let Err(failure) = grant.check_invariants() {
        return ValidationResult::denied(LicenseStatus::Invalid, failure);
    }

    if let Some(seen) = last_seen {
        if seen.checked_sub_signed(tolerance).is_some_and(|floor| now < floor) {
            return ValidationResult::denied(
                LicenseStatus::ClockTamperSuspected,
                TrustFailure::new(
                    ErrorKind::ClockTamperSuspected,
                    "system clock is behind the last trusted time",
                )
                .with_detail("lastSeen", seen.to_rfc3339())
                .with_detail("now", now.to_rfc3339()),
            );
        }
    }

    let deadline = grant.grace_deadline();
    if now > deadline {
        return ValidationResult::denied(
            LicenseStatus::Expired,
            TrustFailure::new(ErrorKind::Expired, "license and grace period have ended")
                .with_detail("expiresAt", grant.expires_at.to_rfc3339())
                .with_detail("graceEndsAt", deadline.to_rfc3339()),
        );
    }

    if now > grant.expires_at {
        return ValidationResult::licensed(LicenseStatus::Grace, grant);
    }

    if !device::matches(&grant.binding, local_fingerprints) {
        let hits = grant
            .binding
            .fingerprints
            .intersection(local_fingerprints)
            .count();
        return ValidationResult::denied(
            LicenseStatus::Invalid,
            TrustFailure::new(
                ErrorKind::FingerprintMismatch,
                "license is bound to different hardware",
            )
            .with_detail("matched", hits.to_string())
            .with_detail("required", grant.binding.min_matching.to_string()),
        );
    }

    ValidationResult::licensed(LicenseStatus::Valid, grant)
}

struct PassState {
    grant: Option<OfflineLicenseGrant>,
    clock: LastSeenStore,
    last: Option<ValidationResult>,
}

/// Stateful validator shared by the application.
pub struct LicenseValidator {
    keyring: KeyRing,
    gate: Arc<LicenseGate>,
    audit: Arc<dyn AuditSink>,
    tolerance: Duration,
    pass: Mutex<PassState>,
}

impl LicenseValidator {
    pub fn new(
        keyring: KeyRing,
        clock: LastSeenStore,
        gate: Arc<LicenseGate>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            keyring,
            gate,
            audit,
            tolerance: Duration::seconds(DEFAULT_CLOCK_TOLERANCE_SECS),
            pass: Mutex::new(PassState {
                grant: None,
                clock,
                last: None,
            }),
        }
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<LicenseGate> {
        &self.gate
    }

    /// Reads and parses a grant file and keeps it for [`revalidate`](Self::revalidate).
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read; `Trust(MalformedPayload)` if it is
    /// not a grant. Both outcomes are audited.
    pub fn load_grant(&self, path: &Path) -> LicenseResult<OfflineLicenseGrant> {
        let parsed = fs::read_to_string(path)
            .map_err(LicenseError::from)
            .and_then(|json| OfflineLicenseGrant::from_json(&json).map_err(LicenseError::from));

        match parsed {
            Ok(grant) => {
                self.audit.record(
                    AuditEvent::new(events::LICENSE_LOAD, "license grant loaded", true)
                        .with_detail("licenseId", grant.masked_id())
                        .with_detail("signingKeyId", grant.signing_key_id.as_str()),
                );
                info!(license_id = %grant.masked_id(), "Loaded license grant");
                self.lock().grant = Some(grant.clone());
                Ok(grant)
            }
            Err(e) => {
                self.audit.record(
                    AuditEvent::new(events::LICENSE_LOAD, "license grant could not be loaded", false)
                        .with_detail("path", path.display().to_string())
                        .with_detail("error", e.to_string()),
                );
                warn!(path = %path.display(), error = %e, "Failed to load license grant");
                Err(e)
            }
        }
    }

    /// Validates `grant`, publishes the result to the gate, records exactly
    /// one audit entry and returns the result.
    ///
    /// The grant also becomes the one used by [`revalidate`](Self::revalidate).
    pub fn validate(
        &self,
        grant: &OfflineLicenseGrant,
        now: DateTime<Utc>,
        local_fingerprints: &BTreeSet<String>,
    ) -> ValidationResult {
        let mut pass = self.lock();

        let result = evaluate(
            grant,
            &self.keyring,
            now,
            local_fingerprints,
            pass.clock.last_seen(),
            self.tolerance,
        );

        if result.status != LicenseStatus::ClockTamperSuspected {
            if let Err(e) = pass.clock.advance(now) {
                warn!(error = %e, "Failed to persist last-seen time");
            }
        }

        self.record_validation(grant, &result);
        self.gate.publish(result.clone());

        pass.grant = Some(grant.clone());
        pass.last = Some(result.clone());
        result
    }

    /// Re-runs validation of the loaded grant with fresh fingerprints.
    ///
    /// # Errors
    ///
    /// `NoGrant` if nothing has been loaded or validated yet.
    pub fn revalidate(
        &self,
        now: DateTime<Utc>,
        fingerprints: &dyn FingerprintSource,
    ) -> LicenseResult<ValidationResult> {
        let grant = self.lock().grant.clone().ok_or(LicenseError::NoGrant)?;
        let local = fingerprints.collect();
        Ok(self.validate(&grant, now, &local))
    }

    /// The most recent result, if any validation has run.
    #[must_use]
    pub fn last_result(&self) -> Option<ValidationResult> {
        self.lock().last.clone()
    }

    /// `Validating` while a pass holds the lock, otherwise the last status.
    #[must_use]
    pub fn status(&self) -> LicenseStatus {
        let pass = match self.pass.try_lock() {
            Ok(pass) => pass,
            Err(TryLockError::WouldBlock) => return LicenseStatus::Validating,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        pass.last
            .as_ref()
            .map_or(LicenseStatus::Uninitialized, |r| r.status)
    }

    /// Records a detected wall-clock jump.
    pub fn record_clock_jump(&self, wall_elapsed: Duration, monotonic_elapsed: Duration) {
        warn!(
            wall_ms = wall_elapsed.num_milliseconds(),
            monotonic_ms = monotonic_elapsed.num_milliseconds(),
            "System clock jump detected"
        );
        self.audit.record(
            AuditEvent::new(events::CLOCK_JUMP, "system clock jump detected", false)
                .with_detail("wallElapsedMs", wall_elapsed.num_milliseconds().to_string())
                .with_detail(
                    "monotonicElapsedMs",
                    monotonic_elapsed.num_milliseconds().to_string(),
                ),
        );
    }

    fn record_validation(&self, grant: &OfflineLicenseGrant, result: &ValidationResult) {
        let mut event = AuditEvent::new(
            events::LICENSE_VALIDATION,
            format!("license validation: {}", result.status),
            result.is_usable(),
        )
        .with_detail("licenseId", mask_license_id(&grant.license_id))
        .with_detail("status", result.status.as_str())
        .with_detail("signingKeyId", grant.signing_key_id.as_str());

        if let Some(reason) = &result.reason {
            event = event
                .with_detail("errorKind", reason.kind.as_str())
                .with_detail("reason", reason.reason.as_str());
        }
        if let Some(tier) = &result.tier {
            event = event.with_detail("tier", tier.as_str());
        }
        self.audit.record(event);

        match &result.reason {
            None => info!(license_id = %grant.masked_id(), status = %result.status, "License validated"),
            Some(reason) => warn!(
                license_id = %grant.masked_id(),
                status = %result.status,
                kind = %reason.kind,
                "License validation failed"
            ),
        }
    }

    /// The pass state only caches results, so a poisoned lock is recovered.
    fn lock(&self) -> MutexGuard<'_, PassState> {
        match self.pass.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
