//! The append-only, hash-chained audit log.

use crate::config::{AnchorPolicy, AuditConfig};
use crate::entry::{events, AuditLogEntry, GENESIS_HASH};
use crate::error::{AuditError, AuditResult};
use crate::key::AuditKey;
use crate::sink::{AuditEvent, AuditSink};
use crate::verify::{
    list_log_files, verify_contents, verify_file_with_key, ChainReport, FileVerification,
    FILE_PREFIX, FILE_SUFFIX,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Hash-chained audit log rooted at one directory.
///
/// All appends are serialized through a single writer lock. Entries are
/// buffered; call [`flush`](Self::flush) before the process exits or the
/// trailing entries are lost (the chain itself stays valid, just shorter).
pub struct AuditLog {
    config: AuditConfig,
    key: AuditKey,
    writer: Mutex<WriterState>,
    last_recorded_at: Option<DateTime<Utc>>,
}

/// Destination of an open log file's bytes.
trait LogFile: Write + Send {
    fn sync_data(&self) -> io::Result<()>;
    fn sync_all(&self) -> io::Result<()>;
}

impl LogFile for File {
    fn sync_data(&self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn sync_all(&self) -> io::Result<()> {
        File::sync_all(self)
    }
}

struct OpenFile {
    path: PathBuf,
    writer: BufWriter<Box<dyn LogFile>>,
    bytes: u64,
    opened_at: DateTime<Utc>,
}

impl OpenFile {
    fn new(path: PathBuf, file: File, bytes: u64, opened_at: DateTime<Utc>) -> Self {
        let sink: Box<dyn LogFile> = Box::new(file);
        Self {
            path,
            writer: BufWriter::new(sink),
            bytes,
            opened_at,
        }
    }
}

struct WriterState {
    /// `None` until the first entry of a new file is written.
    current: Option<OpenFile>,
    next_sequence: u64,
    last_hash: String,
    /// File given up after a failed write; the next append rotates away from it.
    abandoned: Option<PathBuf>,
}

/// Where appending resumes after reading the existing files.
enum Resume {
    Genesis,
    Append {
        path: PathBuf,
        opened_at: DateTime<Utc>,
        next_sequence: u64,
        last_hash: String,
        last_timestamp: DateTime<Utc>,
    },
    Rotate {
        next_sequence: u64,
        last_hash: String,
        last_timestamp: DateTime<Utc>,
        reason: &'static str,
        previous: PathBuf,
    },
    AnchorLost {
        next_sequence: u64,
        newest: PathBuf,
    },
}

impl AuditLog {
    /// Opens the log in `config.directory`, resuming the chain from the
    /// newest file.
    ///
    /// # Errors
    ///
    /// `AnchorMissing` when log files exist, none yields an anchor, and
    /// `config.anchor_policy` is [`AnchorPolicy::Refuse`].
    pub fn open(config: AuditConfig, key: AuditKey) -> AuditResult<Self> {
        fs::create_dir_all(&config.directory)?;
        let resume = Self::find_resume_point(&config.directory)?;
        let last_recorded_at = match &resume {
            Resume::Append { last_timestamp, .. } | Resume::Rotate { last_timestamp, .. } => {
                Some(*last_timestamp)
            }
            Resume::Genesis | Resume::AnchorLost { .. } => None,
        };

        let mut state = WriterState {
            current: None,
            next_sequence: 1,
            last_hash: GENESIS_HASH.to_string(),
            abandoned: None,
        };

        let mut log = match resume {
            Resume::Genesis => {
                info!(dir = %config.directory.display(), "Starting new audit chain");
                Self::assemble(config, key, state)
            }
            Resume::Append {
                path,
                opened_at,
                next_sequence,
                last_hash,
                ..
            } => {
                let file = OpenOptions::new().append(true).open(&path)?;
                let bytes = file.metadata()?.len();
                info!(path = %path.display(), next_sequence, "Resuming audit chain");
                state.current = Some(OpenFile::new(path, file, bytes, opened_at));
                state.next_sequence = next_sequence;
                state.last_hash = last_hash;
                Self::assemble(config, key, state)
            }
            Resume::Rotate {
                next_sequence,
                last_hash,
                reason,
                previous,
                ..
            } => {
                warn!(path = %previous.display(), reason, "Audit file tail unusable, rotating");
                state.next_sequence = next_sequence;
                state.last_hash = last_hash;
                let log = Self::assemble(config, key, state);
                {
                    let mut guard = log.lock()?;
                    log.write_rotation_marker(&mut guard, Some(previous.as_path()), reason)?;
                }
                log
            }
            Resume::AnchorLost {
                next_sequence,
                newest,
            } => match config.anchor_policy {
                AnchorPolicy::Refuse => {
                    error!(dir = %config.directory.display(), "Audit chain anchor missing, refusing to start");
                    return Err(AuditError::AnchorMissing(config.directory.clone()));
                }
                AnchorPolicy::FreshChain => {
                    warn!(dir = %config.directory.display(), "Audit chain anchor missing, starting fresh chain");
                    state.next_sequence = next_sequence;
                    let log = Self::assemble(config, key, state);
                    {
                        let mut guard = log.lock()?;
                        let event = AuditEvent::new(
                            events::CHAIN_BREAK,
                            "no chain anchor recoverable from existing audit files",
                            false,
                        )
                        .with_detail("newestFile", file_name(&newest));
                        log.append_locked(&mut guard, event)?;
                        Self::flush_locked(&mut guard)?;
                    }
                    log
                }
            },
        };

        log.last_recorded_at = last_recorded_at;
        Ok(log)
    }

    fn assemble(config: AuditConfig, key: AuditKey, state: WriterState) -> Self {
        Self {
            config,
            key,
            writer: Mutex::new(state),
            last_recorded_at: None,
        }
    }

    /// Appends one entry and returns it as written.
    pub fn append(
        &self,
        event_type: &str,
        description: &str,
        success: bool,
        details: BTreeMap<String, String>,
    ) -> AuditResult<AuditLogEntry> {
        let event = AuditEvent {
            event_type: event_type.to_string(),
            description: description.to_string(),
            success,
            details,
        };
        self.append_event(event)
    }

    /// Appends a prepared event.
    pub fn append_event(&self, event: AuditEvent) -> AuditResult<AuditLogEntry> {
        let mut guard = self.lock()?;
        if let Some(previous) = guard.abandoned.take() {
            self.write_rotation_marker(&mut guard, Some(previous.as_path()), "write failed")?;
        }
        self.rotate_if_due(&mut guard)?;
        self.append_locked(&mut guard, event)
    }

    /// Closes the current file and starts a new one chained from the last
    /// entry. The new file's first entry is an `audit.rotated` marker.
    pub fn force_rotate(&self) -> AuditResult<()> {
        let mut guard = self.lock()?;
        let previous = guard.current.as_ref().map(|f| f.path.clone());
        Self::close_current(&mut guard)?;
        self.write_rotation_marker(&mut guard, previous.as_deref(), "forced")
    }

    /// Pushes buffered entries to the OS and fsyncs the open file.
    pub fn flush(&self) -> AuditResult<()> {
        let mut guard = self.lock()?;
        Self::flush_locked(&mut guard)
    }

    /// [`flush`](Self::flush) on the blocking pool, for async shutdown paths.
    pub async fn flush_async(self: Arc<Self>) -> AuditResult<()> {
        tokio::task::spawn_blocking(move || self.flush())
            .await
            .map_err(|e| AuditError::Io(std::io::Error::other(e)))?
    }

    /// Verifies one log file; see [`verify_file_report`](Self::verify_file_report).
    pub fn verify_file(&self, path: &Path) -> AuditResult<bool> {
        Ok(self.verify_file_report(path)?.valid)
    }

    /// Replays one file and reports per-entry validity.
    ///
    /// The open file is only read under the writer lock, after a flush, so a
    /// partially written tail is never observed.
    pub fn verify_file_report(&self, path: &Path) -> AuditResult<FileVerification> {
        let mut guard = self.lock()?;
        let is_current = guard
            .current
            .as_ref()
            .is_some_and(|f| same_file(&f.path, path));
        if is_current {
            Self::flush_locked(&mut guard)?;
            let contents = fs::read_to_string(path)?;
            return Ok(verify_contents(path, &contents, &self.key));
        }
        drop(guard);
        verify_file_with_key(path, &self.key)
    }

    /// Runs [`verify_file`](Self::verify_file) over every log file.
    pub fn verify_all(&self) -> AuditResult<BTreeMap<PathBuf, bool>> {
        Ok(self.verify_all_report()?.as_map())
    }

    /// Verifies every file and the anchors between them.
    pub fn verify_all_report(&self) -> AuditResult<ChainReport> {
        let files = list_log_files(&self.config.directory)?
            .iter()
            .map(|path| self.verify_file_report(path))
            .collect::<AuditResult<Vec<_>>>()?;
        let report = ChainReport::from_files(files);
        debug!(
            files = report.files.len(),
            intact = report.chain_intact(),
            "Verified audit directory"
        );
        Ok(report)
    }

    /// Path of the file currently being appended to, if one is open.
    pub fn current_path(&self) -> AuditResult<Option<PathBuf>> {
        Ok(self.lock()?.current.as_ref().map(|f| f.path.clone()))
    }

    /// Timestamp of the newest entry already on disk when the log was opened.
    #[must_use]
    pub fn last_recorded_at(&self) -> Option<DateTime<Utc>> {
        self.last_recorded_at
    }

    /// Sequence number the next entry will receive.
    pub fn next_sequence(&self) -> AuditResult<u64> {
        Ok(self.lock()?.next_sequence)
    }

    #[must_use]
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    fn lock(&self) -> AuditResult<MutexGuard<'_, WriterState>> {
        self.writer.lock().map_err(|_| AuditError::LockPoisoned)
    }

    fn append_locked(&self, state: &mut WriterState, event: AuditEvent) -> AuditResult<AuditLogEntry> {
        let now = Utc::now();
        let entry = AuditLogEntry::seal(
            &self.key,
            state.next_sequence,
            now,
            event,
            state.last_hash.clone(),
        );

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        if state.current.is_none() {
            let path = self.new_file_path(state.next_sequence, now);
            let handle = OpenOptions::new().create(true).append(true).open(&path)?;
            debug!(path = %path.display(), "Opened audit file");
            state.current = Some(OpenFile::new(path, handle, 0, entry.timestamp));
        }
        if let Some(file) = state.current.as_mut() {
            if let Err(e) = file.writer.write_all(line.as_bytes()) {
                Self::abandon_current(state, &e);
                return Err(e.into());
            }
            file.bytes += line.len() as u64;
        }

        state.next_sequence += 1;
        state.last_hash.clone_from(&entry.entry_hmac);
        Ok(entry)
    }

    fn rotate_if_due(&self, state: &mut WriterState) -> AuditResult<()> {
        let Some(file) = state.current.as_ref() else {
            return Ok(());
        };
        let reason = if file.bytes >= self.config.max_file_bytes {
            "size"
        } else if Utc::now() - file.opened_at >= self.config.max_file_age() {
            "age"
        } else {
            return Ok(());
        };

        let previous = file.path.clone();
        Self::close_current(state)?;
        self.write_rotation_marker(state, Some(previous.as_path()), reason)
    }

    fn write_rotation_marker(
        &self,
        state: &mut WriterState,
        previous: Option<&Path>,
        reason: &str,
    ) -> AuditResult<()> {
        let event = AuditEvent::new(events::LOG_ROTATED, "audit log rotated", true)
            .with_detail("previousFile", previous.map_or_else(String::new, file_name))
            .with_detail("reason", reason)
            .with_detail("anchor", state.last_hash.clone());
        let entry = self.append_locked(state, event)?;
        Self::flush_locked(state)?;
        info!(sequence = entry.sequence, reason, "Rotated audit log");
        Ok(())
    }

    fn close_current(state: &mut WriterState) -> AuditResult<()> {
        if let Some(mut file) = state.current.take() {
            let closed = file
                .writer
                .flush()
                .and_then(|()| file.writer.get_ref().sync_all());
            if let Err(e) = closed {
                warn!(path = %file.path.display(), error = %e, "Failed to close audit file");
                state.abandoned = Some(file.path);
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn flush_locked(state: &mut WriterState) -> AuditResult<()> {
        if let Some(file) = state.current.as_mut() {
            let flushed = file
                .writer
                .flush()
                .and_then(|()| file.writer.get_ref().sync_data());
            if let Err(e) = flushed {
                Self::abandon_current(state, &e);
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Stops appending to the open file after an I/O error.
    ///
    /// Its tail may hold a partial line, so later entries go to a new file
    /// chained from the last hash handed to the writer.
    fn abandon_current(state: &mut WriterState, cause: &io::Error) {
        if let Some(mut file) = state.current.take() {
            warn!(path = %file.path.display(), error = %cause, "Audit file write failed, abandoning file");
            // Whole lines still buffered belong before the failure point.
            if let Err(e) = file.writer.flush() {
                debug!(error = %e, "Buffered audit entries could not be written");
            }
            state.abandoned = Some(file.path);
        }
    }

    fn new_file_path(&self, first_sequence: u64, now: DateTime<Utc>) -> PathBuf {
        self.config.directory.join(format!(
            "{FILE_PREFIX}{first_sequence:020}-{}{FILE_SUFFIX}",
            now.format("%Y%m%dT%H%M%S%6f")
        ))
    }

    /// Reads the newest files to find where the chain continues.
    fn find_resume_point(dir: &Path) -> AuditResult<Resume> {
        let files = list_log_files(dir)?;
        let non_empty: Vec<&PathBuf> = files
            .iter()
            .filter(|p| fs::metadata(p).map(|m| m.len() > 0).unwrap_or(false))
            .collect();

        let Some(&newest) = non_empty.last() else {
            return Ok(Resume::Genesis);
        };

        for (age, path) in non_empty.iter().rev().enumerate() {
            let contents = fs::read_to_string(path)?;
            let parsed: Vec<Option<AuditLogEntry>> = contents
                .lines()
                .map(|l| serde_json::from_str::<AuditLogEntry>(l).ok())
                .collect();

            let Some(last_good) = parsed.iter().rev().flatten().next() else {
                continue;
            };
            let next_sequence = last_good.sequence.saturating_add(1);
            let last_hash = last_good.entry_hmac.clone();
            let last_timestamp = last_good.timestamp;

            if age > 0 {
                return Ok(Resume::Rotate {
                    next_sequence,
                    last_hash,
                    last_timestamp,
                    reason: "newest file unreadable",
                    previous: newest.clone(),
                });
            }

            let tail_clean = contents.ends_with('\n') && parsed.iter().all(Option::is_some);
            if !tail_clean {
                return Ok(Resume::Rotate {
                    next_sequence,
                    last_hash,
                    last_timestamp,
                    reason: "unparseable tail",
                    previous: newest.clone(),
                });
            }

            let opened_at = parsed
                .iter()
                .flatten()
                .next()
                .map_or(last_good.timestamp, |first| first.timestamp);
            return Ok(Resume::Append {
                path: newest.clone(),
                opened_at,
                next_sequence,
                last_hash,
                last_timestamp,
            });
        }

        Ok(Resume::AnchorLost {
            next_sequence: next_sequence_from_names(&files),
            newest: newest.clone(),
        })
    }
}

impl AuditSink for AuditLog {
    fn record(&self, event: AuditEvent) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.append_event(event) {
            error!(event_type = %event_type, error = %e, "Failed to append audit entry");
        }
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        if let Ok(state) = self.writer.get_mut() {
            if let Err(e) = Self::flush_locked(state) {
                warn!(error = %e, "Failed to flush audit log on drop");
            }
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One past the highest first-sequence encoded in the file names.
fn next_sequence_from_names(files: &[PathBuf]) -> u64 {
    files
        .iter()
        .filter_map(|p| {
            let name = p.file_name()?.to_str()?;
            let rest = name.strip_prefix(FILE_PREFIX)?;
            rest.split('-').next()?.parse::<u64>().ok()
        })
        .max()
        .map_or(1, |seq| seq.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::{BoundaryStatus, EntryFault};

    /// Accepts `budget` bytes, then fails every write.
    struct FullDisk {
        file: File,
        budget: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::StorageFull, "no space left"));
            }
            let n = buf.len().min(self.budget);
            let written = self.file.write(&buf[..n])?;
            self.budget -= written;
            Ok(written)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl LogFile for FullDisk {
        fn sync_data(&self) -> io::Result<()> {
            self.file.sync_data()
        }

        fn sync_all(&self) -> io::Result<()> {
            self.file.sync_all()
        }
    }

    fn key() -> AuditKey {
        AuditKey::from_bytes(&[9u8; 32]).unwrap()
    }

    fn event(description: &str) -> AuditEvent {
        AuditEvent::new(events::LICENSE_VALIDATION, description, true)
    }

    /// Swaps the open file's writer for one that tears the next line.
    fn fail_after(log: &AuditLog, budget: usize) -> PathBuf {
        let mut state = log.lock().unwrap();
        let old = state.current.take().unwrap();
        let file = OpenOptions::new().append(true).open(&old.path).unwrap();
        let sink: Box<dyn LogFile> = Box::new(FullDisk { file, budget });
        state.current = Some(OpenFile {
            path: old.path.clone(),
            writer: BufWriter::with_capacity(0, sink),
            bytes: old.bytes,
            opened_at: old.opened_at,
        });
        old.path
    }

    #[test]
    fn torn_write_moves_appends_to_a_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(AuditConfig::new(dir.path()), key()).unwrap();
        log.append_event(event("first")).unwrap();
        log.flush().unwrap();
        let torn = fail_after(&log, 20);

        let err = log.append_event(event("second")).unwrap_err();
        assert!(matches!(err, AuditError::Io(_)));
        assert_eq!(log.current_path().unwrap(), None);
        assert_eq!(log.next_sequence().unwrap(), 2);

        log.append_event(event("third")).unwrap();
        log.append_event(event("fourth")).unwrap();
        assert_ne!(log.current_path().unwrap(), Some(torn));

        let report = log.verify_all_report().unwrap();
        assert_eq!(report.files.len(), 2);

        let first = &report.files[0];
        assert_eq!(first.entries.len(), 2);
        assert!(first.entries[0].valid);
        assert!(matches!(first.entries[1].fault, Some(EntryFault::Malformed { .. })));

        let second = &report.files[1];
        assert!(second.valid);
        assert_eq!(second.first_event_type.as_deref(), Some(events::LOG_ROTATED));
        let sequences: Vec<_> = second.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![Some(2), Some(3), Some(4)]);
        assert_eq!(report.boundaries[1], BoundaryStatus::Linked);
    }

    #[test]
    fn refused_write_keeps_chain_intact() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(AuditConfig::new(dir.path()), key()).unwrap();
        log.append_event(event("first")).unwrap();
        log.flush().unwrap();
        let torn = fail_after(&log, 0);

        assert!(log.append_event(event("second")).is_err());
        assert!(log.flush().is_ok());
        log.append_event(event("third")).unwrap();
        assert_ne!(log.current_path().unwrap(), Some(torn));

        let report = log.verify_all_report().unwrap();
        assert!(report.chain_intact());
        assert_eq!(report.files.len(), 2);
    }
}
