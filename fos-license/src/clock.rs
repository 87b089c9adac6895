//! Forward-only record of the latest trusted time observed.

use crate::error::{LicenseError, LicenseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastSeenFile {
    last_seen: DateTime<Utc>,
}

/// Persists the latest validation time. Never moves backwards, so rolling the
/// system clock back cannot resurrect an expired grant.
#[derive(Debug)]
pub struct LastSeenStore {
    path: Option<PathBuf>,
    last_seen: Option<DateTime<Utc>>,
}

impl LastSeenStore {
    /// Opens the store at `path`. A missing file means nothing seen yet.
    ///
    /// # Errors
    ///
    /// `Storage` if the file exists but cannot be parsed.
    pub fn open(path: impl Into<PathBuf>) -> LicenseResult<Self> {
        let path = path.into();
        let last_seen = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let file: LastSeenFile = serde_json::from_str(&contents).map_err(|e| {
                LicenseError::Storage(format!("unreadable last-seen file {}: {e}", path.display()))
            })?;
            Some(file.last_seen)
        } else {
            info!(path = %path.display(), "No last-seen record, starting fresh");
            None
        };
        Ok(Self {
            path: Some(path),
            last_seen,
        })
    }

    /// A store that is never written to disk.
    #[must_use]
    pub fn in_memory(last_seen: Option<DateTime<Utc>>) -> Self {
        Self {
            path: None,
            last_seen,
        }
    }

    #[must_use]
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Records `now` if it is later than the stored value. Returns whether
    /// the value moved.
    pub fn advance(&mut self, now: DateTime<Utc>) -> LicenseResult<bool> {
        if self.last_seen.is_some_and(|seen| seen >= now) {
            return Ok(false);
        }
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string(&LastSeenFile { last_seen: now })?;
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, json)?;
            fs::rename(&tmp, path)?;
        }
        debug!(last_seen = %now, "Advanced last-seen time");
        self.last_seen = Some(now);
        Ok(true)
    }
}
