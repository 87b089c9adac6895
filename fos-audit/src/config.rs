//! Audit log configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What to do at startup when log files exist but none yields a chain anchor
/// (for example after the tail of the trail was deleted or overwritten).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// Start a new file chained from genesis whose first entry records the break.
    #[default]
    FreshChain,
    /// Refuse to open the log until an operator intervenes.
    Refuse,
}

/// Settings for [`AuditLog`](crate::AuditLog).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Directory holding `audit-*.log` files.
    pub directory: PathBuf,
    /// Rotate once the open file reaches this many bytes.
    pub max_file_bytes: u64,
    /// Rotate once the open file's first entry is this many days old.
    pub max_file_age_days: u32,
    pub anchor_policy: AnchorPolicy,
}

impl AuditConfig {
    /// Default settings rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub(crate) fn max_file_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.max_file_age_days))
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("audit"),
            max_file_bytes: 10 * 1024 * 1024,
            max_file_age_days: 30,
            anchor_policy: AnchorPolicy::FreshChain,
        }
    }
}
