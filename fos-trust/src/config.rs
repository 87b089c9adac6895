//! `fos-trust.toml` configuration.
//!
//! ```toml
//! [license]
//! grant_path = "/opt/fos/license.json"
//! clock_tolerance_secs = 300
//!
//! [audit]
//! directory = "/var/lib/fos/audit"
//! max_file_bytes = 10485760
//! anchor_policy = "fresh_chain"
//!
//! [certificates]
//! signing_key_file = "/etc/fos/certificate.key"
//! signing_key_id = "fos-cert-2024-01"
//! ```
//!
//! A missing file means defaults. A file that exists but does not parse is
//! an error: trust settings are never silently replaced.

use crate::error::{TrustCoreError, TrustCoreResult};
use fos_audit::{AnchorPolicy, AuditConfig};
use fos_license::{RevalidationSchedule, DEFAULT_CLOCK_TOLERANCE_SECS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// File name looked up in the config directory.
pub const CONFIG_FILE_NAME: &str = "fos-trust.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    pub license: LicenseSettings,
    pub audit: AuditSettings,
    pub certificates: CertificateSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseSettings {
    pub grant_path: PathBuf,
    /// Anti-rollback store for the last trusted time.
    pub last_seen_path: PathBuf,
    pub clock_tolerance_secs: i64,
    pub revalidate_interval_secs: u64,
    pub clock_check_interval_secs: u64,
    pub clock_jump_threshold_secs: u64,
}

impl Default for LicenseSettings {
    fn default() -> Self {
        let schedule = RevalidationSchedule::default();
        Self {
            grant_path: data_dir().join("license.json"),
            last_seen_path: data_dir().join("last-seen.json"),
            clock_tolerance_secs: DEFAULT_CLOCK_TOLERANCE_SECS,
            revalidate_interval_secs: schedule.revalidate_interval.as_secs(),
            clock_check_interval_secs: schedule.clock_check_interval.as_secs(),
            clock_jump_threshold_secs: schedule.clock_jump_threshold.as_secs(),
        }
    }
}

impl LicenseSettings {
    #[must_use]
    pub fn clock_tolerance(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.clock_tolerance_secs.max(0))
    }

    #[must_use]
    pub fn schedule(&self) -> RevalidationSchedule {
        RevalidationSchedule {
            revalidate_interval: Duration::from_secs(self.revalidate_interval_secs.max(1)),
            clock_check_interval: Duration::from_secs(self.clock_check_interval_secs.max(1)),
            clock_jump_threshold: Duration::from_secs(self.clock_jump_threshold_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub directory: PathBuf,
    /// Hex-encoded HMAC key, created on first start.
    pub key_file: PathBuf,
    pub max_file_bytes: u64,
    pub max_file_age_days: u32,
    pub anchor_policy: AnchorPolicy,
}

impl Default for AuditSettings {
    fn default() -> Self {
        let defaults = AuditConfig::default();
        Self {
            directory: data_dir().join("audit"),
            key_file: data_dir().join("audit.key"),
            max_file_bytes: defaults.max_file_bytes,
            max_file_age_days: defaults.max_file_age_days,
            anchor_policy: defaults.anchor_policy,
        }
    }
}

impl AuditSettings {
    #[must_use]
    pub fn to_audit_config(&self) -> AuditConfig {
        AuditConfig {
            directory: self.directory.clone(),
            max_file_bytes: self.max_file_bytes,
            max_file_age_days: self.max_file_age_days,
            anchor_policy: self.anchor_policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateSettings {
    pub sequence_store: PathBuf,
    /// Hex-encoded Ed25519 seed. Signing is disabled when unset.
    pub signing_key_file: Option<PathBuf>,
    pub signing_key_id: Option<String>,
}

impl Default for CertificateSettings {
    fn default() -> Self {
        Self {
            sequence_store: data_dir().join("certificate-sequences.json"),
            signing_key_file: None,
            signing_key_id: None,
        }
    }
}

impl TrustConfig {
    /// Loads `fos-trust.toml` from the user's config directory.
    pub fn load() -> TrustCoreResult<Self> {
        Self::load_from(&default_config_path())
    }

    /// Loads configuration from an explicit path.
    ///
    /// # Errors
    ///
    /// `ConfigRead` if the file exists but cannot be read, `ConfigParse` if
    /// it is not valid configuration.
    pub fn load_from(path: &Path) -> TrustCoreResult<Self> {
        if !path.exists() {
            info!("No config file found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| TrustCoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| TrustCoreError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded trust config from {:?}", path);
        Ok(config)
    }

    /// Defaults with every data path under `root`.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            license: LicenseSettings {
                grant_path: root.join("license.json"),
                last_seen_path: root.join("last-seen.json"),
                ..LicenseSettings::default()
            },
            audit: AuditSettings {
                directory: root.join("audit"),
                key_file: root.join("audit.key"),
                ..AuditSettings::default()
            },
            certificates: CertificateSettings {
                sequence_store: root.join("certificate-sequences.json"),
                ..CertificateSettings::default()
            },
        }
    }
}

/// Where `fos-trust.toml` is looked up by default.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("fos"))
        .unwrap_or_else(|| PathBuf::from(".fos"))
        .join(CONFIG_FILE_NAME)
}

/// Root of the trust core's persistent state.
#[must_use]
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("fos"))
        .unwrap_or_else(|| PathBuf::from(".fos"))
}
