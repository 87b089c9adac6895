//! Fire-and-forget delivery of certificates to the tracking server.
//!
//! The server only records what it receives; it is never a source of trust.
//! Delivery runs on its own task and never blocks signing or validation.

use crate::certificate::ProcessingCertificate;
use crate::error::{CertificateError, CertificateResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delivery state of a certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    /// `pending → synced | failed`, `failed → pending`.
    #[must_use]
    pub fn can_transition_to(self, to: SyncStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Synced) | (Self::Pending, Self::Failed) | (Self::Failed, Self::Pending)
        )
    }

    /// Moves to `to` if allowed.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` otherwise.
    pub fn transition(self, to: SyncStatus) -> CertificateResult<SyncStatus> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(CertificateError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        })
    }
}

/// What is sent to the tracking server: the whole certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncPayload {
    pub certificate: ProcessingCertificate,
}

impl SyncPayload {
    #[must_use]
    pub fn new(certificate: &ProcessingCertificate) -> Self {
        Self {
            certificate: certificate.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Exponential backoff with a cap and an optional attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30 * 60),
            multiplier: 2,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// attempt limit is exhausted.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }
        let factor = self.multiplier.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        let delay = self.initial_delay.checked_mul(factor).unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

/// The out-of-scope tracking server, as seen from here.
pub trait SyncTransport: Send + Sync {
    /// Delivers one payload. `Err` carries a description for the logs.
    fn deliver(&self, payload: &SyncPayload) -> Result<(), String>;
}

/// Delivers `certificate` in the background, retrying per `policy`.
///
/// The task resolves to the certificate with its final sync status: `Synced`
/// on delivery, `Failed` when attempts run out or `shutdown` fires first.
pub fn spawn_sync(
    mut certificate: ProcessingCertificate,
    transport: Arc<dyn SyncTransport>,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<ProcessingCertificate> {
    tokio::spawn(async move {
        if certificate.sync_status == SyncStatus::Failed {
            certificate.sync_status = SyncStatus::Pending;
        }
        let payload = SyncPayload::new(&certificate);
        let mut attempt = 0u32;

        loop {
            let delivered = {
                let transport = Arc::clone(&transport);
                let payload = payload.clone();
                tokio::task::spawn_blocking(move || transport.deliver(&payload)).await
            };

            match delivered {
                Ok(Ok(())) => {
                    certificate.sync_status = SyncStatus::Synced;
                    info!(certificate_id = %certificate.certificate_id, "Certificate synced");
                    return certificate;
                }
                Ok(Err(e)) => {
                    warn!(certificate_id = %certificate.certificate_id, attempt, error = %e, "Certificate sync failed");
                }
                Err(e) => {
                    warn!(certificate_id = %certificate.certificate_id, error = %e, "Certificate sync task failed");
                }
            }

            attempt += 1;
            let Some(delay) = policy.delay_for_attempt(attempt) else {
                break;
            };
            debug!(certificate_id = %certificate.certificate_id, delay_ms = delay.as_millis() as u64, "Retrying certificate sync");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        certificate.sync_status = SyncStatus::Failed;
        certificate
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        assert!(SyncStatus::Pending.transition(SyncStatus::Synced).is_ok());
        assert!(SyncStatus::Pending.transition(SyncStatus::Failed).is_ok());
        assert!(SyncStatus::Failed.transition(SyncStatus::Pending).is_ok());
        assert!(SyncStatus::Synced.transition(SyncStatus::Pending).is_err());
        assert!(SyncStatus::Failed.transition(SyncStatus::Synced).is_err());
    }

    #[test]
    fn exponential_backoff_with_cap() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2,
            max_attempts: Some(6),
        };
        assert_eq!(policy.delay_for_attempt(0), None);
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for_attempt(4), Some(Duration::from_secs(8)));
        assert_eq!(policy.delay_for_attempt(5), Some(Duration::from_secs(10)));
        assert_eq!(policy.delay_for_attempt(6), Some(Duration::from_secs(10)));
        assert_eq!(policy.delay_for_attempt(7), None);
    }

    #[test]
    fn huge_attempt_saturates_at_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(500), Some(policy.max_delay));
    }
}
