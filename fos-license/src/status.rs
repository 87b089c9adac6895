//! Validation outcomes.

use crate::grant::OfflineLicenseGrant;
use chrono::{DateTime, Utc};
use fos_types::TrustFailure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Where the license currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    /// No validation has run yet.
    Uninitialized,
    /// A validation pass is in progress.
    Validating,
    /// Fully valid.
    Valid,
    /// Past expiry but inside the grace window. Still usable, flagged for UI.
    Grace,
    /// Past expiry and grace.
    Expired,
    /// Signature, key, payload or fingerprint check failed.
    Invalid,
    /// The system clock is behind the last trusted time.
    ClockTamperSuspected,
}

impl LicenseStatus {
    /// True for the states that unlock modules.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Valid | Self::Grace)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Validating => "validating",
            Self::Valid => "valid",
            Self::Grace => "grace",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
            Self::ClockTamperSuspected => "clock_tamper_suspected",
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one validation pass.
///
/// `allowed_modules`, `allowed_features` and `tier` are populated only when
/// the status is usable; every other status carries a `reason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub status: LicenseStatus,
    pub allowed_modules: BTreeSet<String>,
    pub allowed_features: BTreeSet<String>,
    pub tier: Option<String>,
    pub reason: Option<TrustFailure>,
    /// Set while in [`LicenseStatus::Grace`].
    pub grace_ends_at: Option<DateTime<Utc>>,
    /// Whose license produced a usable result. Not serialized.
    #[serde(skip)]
    pub holder: Option<LicenseHolder>,
}

/// The license and licensee behind a usable validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseHolder {
    pub license_id: String,
    pub client_code: String,
}

impl ValidationResult {
    pub(crate) fn licensed(status: LicenseStatus, grant: &OfflineLicenseGrant) -> Self {
        Self {
            status,
            allowed_modules: grant.modules.clone(),
            allowed_features: grant.features.clone(),
            tier: Some(grant.product.edition.clone()),
            reason: None,
            grace_ends_at: (status == LicenseStatus::Grace).then(|| grant.grace_deadline()),
            holder: Some(LicenseHolder {
                license_id: grant.license_id.clone(),
                client_code: grant.client.code.clone(),
            }),
        }
    }

    pub(crate) fn denied(status: LicenseStatus, reason: TrustFailure) -> Self {
        Self {
            status,
            allowed_modules: BTreeSet::new(),
            allowed_features: BTreeSet::new(),
            tier: None,
            reason: Some(reason),
            grace_ends_at: None,
            holder: None,
        }
    }

    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.status.is_usable()
    }
}
