//! Persistent per-licensee, per-month certificate sequence numbers.

use crate::error::{CertificateError, CertificateResult};
use chrono::{DateTime, Utc};
use fos_types::{CertificateId, ErrorKind, TrustFailure, MAX_SEQUENCE};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Hands out certificate ids with monotonic sequence numbers.
///
/// The store is a JSON object mapping `"{code}-{YYMM}"` to the last
/// sequence issued. It is written before an id is returned, so a crash never
/// reissues a sequence number.
#[derive(Debug)]
pub struct SequenceAllocator {
    path: Option<PathBuf>,
    issued: Mutex<BTreeMap<String, u16>>,
}

impl SequenceAllocator {
    /// Opens the store at `path`, starting empty if it does not exist.
    ///
    /// # Errors
    ///
    /// `Storage` if the file exists but is not a sequence map.
    pub fn open(path: impl Into<PathBuf>) -> CertificateResult<Self> {
        let path = path.into();
        let issued = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents).map_err(|e| {
                CertificateError::Storage(format!("unreadable sequence store {}: {e}", path.display()))
            })?
        } else {
            info!(path = %path.display(), "No sequence store, starting fresh");
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path),
            issued: Mutex::new(issued),
        })
    }

    /// A store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            issued: Mutex::new(BTreeMap::new()),
        }
    }

    /// Allocates the next id for `licensee_code` in the month of `now`.
    ///
    /// # Errors
    ///
    /// `SequenceOutOfRange` once 9999 ids were issued for the month;
    /// `FormatMismatch` for a malformed licensee code.
    pub fn allocate(&self, licensee_code: &str, now: DateTime<Utc>) -> CertificateResult<CertificateId> {
        let mut issued = self.lock()?;

        // Validates the code and fixes the month key before anything is reserved.
        let normalized = CertificateId::generate_at(licensee_code, 1, now)?;
        let key = store_key(normalized.licensee_code(), normalized.year_month());

        let last = issued.get(&key).copied().unwrap_or(0);
        if last >= MAX_SEQUENCE {
            return Err(TrustFailure::new(
                ErrorKind::SequenceOutOfRange,
                "monthly certificate sequence exhausted",
            )
            .with_detail("licenseeCode", normalized.licensee_code())
            .with_detail("yearMonth", normalized.year_month())
            .into());
        }

        let next = last + 1;
        let id = CertificateId::generate_at(licensee_code, next, now)?;

        let mut updated = issued.clone();
        updated.insert(key, next);
        if let Some(path) = &self.path {
            persist(path, &updated)?;
        }
        *issued = updated;

        debug!(certificate_id = %id, "Allocated certificate id");
        Ok(id)
    }

    /// Last sequence issued for a licensee code and `YYMM`, if any.
    pub fn last_issued(&self, licensee_code: &str, year_month: &str) -> CertificateResult<Option<u16>> {
        let key = store_key(&licensee_code.to_ascii_uppercase(), year_month);
        Ok(self.lock()?.get(&key).copied())
    }

    fn lock(&self) -> CertificateResult<MutexGuard<'_, BTreeMap<String, u16>>> {
        self.issued
            .lock()
            .map_err(|_| CertificateError::Storage("sequence store lock poisoned".into()))
    }
}

fn store_key(code: &str, year_month: &str) -> String {
    format!("{code}-{year_month}")
}

fn persist(path: &Path, issued: &BTreeMap<String, u16>) -> CertificateResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(issued)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
