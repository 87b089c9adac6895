//! Replay-based verification of audit log files.
//!
//! A file is replayed line by line. Each entry's HMAC is recomputed from its
//! fields and the previously *computed* hash, so editing entry N also breaks
//! N+1 even though N+1's stored `prevHash` still matches N's stored HMAC.
//! The first fault invalidates that entry and everything after it.

use crate::entry::{events, AuditLogEntry, GENESIS_HASH};
use crate::error::AuditResult;
use crate::key::AuditKey;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const FILE_PREFIX: &str = "audit-";
pub(crate) const FILE_SUFFIX: &str = ".log";

/// Why an entry failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum EntryFault {
    /// The line is not a well-formed entry.
    Malformed { error: String },
    /// The sequence number skips or repeats.
    SequenceGap { expected: u64, actual: u64 },
    /// `prevHash` does not equal the previous entry's computed HMAC.
    ChainMismatch,
    /// The stored HMAC does not match the entry's fields.
    HmacMismatch,
    /// An earlier entry in the file is already invalid.
    FollowsBreak,
}

/// Verification outcome of one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryVerification {
    /// 1-based line number.
    pub line: usize,
    pub sequence: Option<u64>,
    pub valid: bool,
    pub fault: Option<EntryFault>,
}

/// Verification outcome of one log file.
#[derive(Debug, Clone, Serialize)]
pub struct FileVerification {
    pub path: PathBuf,
    pub valid: bool,
    pub entries: Vec<EntryVerification>,
    /// `prevHash` of the first entry: what this file chains from.
    pub anchor: Option<String>,
    pub first_event_type: Option<String>,
    pub last_sequence: Option<u64>,
    /// Stored `entryHmac` of the last parseable entry.
    pub last_hash: Option<String>,
}

impl FileVerification {
    /// The first invalid entry, if any.
    #[must_use]
    pub fn first_invalid(&self) -> Option<&EntryVerification> {
        self.entries.iter().find(|e| !e.valid)
    }

    /// Validity of the entry with the given sequence number.
    #[must_use]
    pub fn entry_valid(&self, sequence: u64) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| e.sequence == Some(sequence))
            .map(|e| e.valid)
    }
}

/// How a file's first entry connects to the file before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "boundary", rename_all = "snake_case")]
pub enum BoundaryStatus {
    /// First file, chained from the genesis hash.
    Genesis,
    /// Chained from the last entry of the previous file.
    Linked,
    /// A `audit.chain_break` marker openly restarts the chain from genesis.
    RecordedBreak,
    /// The anchor matches neither the previous file nor genesis.
    Unlinked {
        expected: Option<String>,
        actual: Option<String>,
    },
    /// The file holds no entries.
    Empty,
}

/// Verification outcome of a whole log directory.
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub files: Vec<FileVerification>,
    /// `boundaries[i]` describes how `files[i]` links to `files[i - 1]`.
    pub boundaries: Vec<BoundaryStatus>,
}

impl ChainReport {
    /// Builds a report from per-file results in chain order.
    #[must_use]
    pub fn from_files(files: Vec<FileVerification>) -> Self {
        let mut boundaries = Vec::with_capacity(files.len());
        let mut previous_last: Option<String> = None;

        for file in &files {
            let status = match (&file.anchor, &previous_last) {
                _ if file.entries.is_empty() => BoundaryStatus::Empty,
                (Some(anchor), _)
                    if anchor == GENESIS_HASH
                        && file.first_event_type.as_deref() == Some(events::CHAIN_BREAK) =>
                {
                    BoundaryStatus::RecordedBreak
                }
                (Some(anchor), Some(prev)) if anchor == prev => BoundaryStatus::Linked,
                (Some(anchor), None) if anchor == GENESIS_HASH => BoundaryStatus::Genesis,
                (anchor, prev) => BoundaryStatus::Unlinked {
                    expected: prev.clone(),
                    actual: anchor.clone(),
                },
            };
            boundaries.push(status);

            if file.last_hash.is_some() {
                previous_last.clone_from(&file.last_hash);
            }
        }

        Self { files, boundaries }
    }

    /// True if every file verifies on its own.
    #[must_use]
    pub fn all_files_valid(&self) -> bool {
        self.files.iter().all(|f| f.valid)
    }

    /// True if every file verifies and every boundary links without a break.
    #[must_use]
    pub fn chain_intact(&self) -> bool {
        self.all_files_valid()
            && self.boundaries.iter().all(|b| {
                matches!(
                    b,
                    BoundaryStatus::Genesis | BoundaryStatus::Linked | BoundaryStatus::Empty
                )
            })
    }

    /// Per-file validity keyed by path.
    #[must_use]
    pub fn as_map(&self) -> BTreeMap<PathBuf, bool> {
        self.files
            .iter()
            .map(|f| (f.path.clone(), f.valid))
            .collect()
    }
}

/// Lists `audit-*.log` files in `dir` in chain order.
pub fn list_log_files(dir: &Path) -> AuditResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
        })
        .collect();
    // Names embed the zero-padded first sequence, so lexical order is chain order.
    files.sort();
    Ok(files)
}

/// Replays one log file with the given key.
pub fn verify_file_with_key(path: &Path, key: &AuditKey) -> AuditResult<FileVerification> {
    let contents = fs::read_to_string(path)?;
    Ok(verify_contents(path, &contents, key))
}

pub(crate) fn verify_contents(path: &Path, contents: &str, key: &AuditKey) -> FileVerification {
    let mut entries = Vec::new();
    let mut anchor = None;
    let mut first_event_type = None;
    let mut last_sequence = None;
    let mut last_hash = None;

    let mut chain_hash: Option<String> = None;
    let mut expected_sequence: Option<u64> = None;
    let mut broken = false;

    for (index, raw) in split_lines(contents).enumerate() {
        let line = index + 1;
        let entry = match serde_json::from_str::<AuditLogEntry>(raw) {
            Ok(entry) => entry,
            Err(e) => {
                broken = true;
                entries.push(EntryVerification {
                    line,
                    sequence: None,
                    valid: false,
                    fault: Some(EntryFault::Malformed {
                        error: e.to_string(),
                    }),
                });
                continue;
            }
        };

        if index == 0 {
            anchor = Some(entry.prev_hash.clone());
            first_event_type = Some(entry.event_type.clone());
        }
        last_sequence = Some(entry.sequence);
        last_hash = Some(entry.entry_hmac.clone());

        if broken {
            entries.push(EntryVerification {
                line,
                sequence: Some(entry.sequence),
                valid: false,
                fault: Some(EntryFault::FollowsBreak),
            });
            continue;
        }

        let chained_from = chain_hash
            .clone()
            .unwrap_or_else(|| entry.prev_hash.clone());

        let fault = match expected_sequence {
            Some(expected) if entry.sequence != expected => Some(EntryFault::SequenceGap {
                expected,
                actual: entry.sequence,
            }),
            _ if entry.prev_hash != chained_from => Some(EntryFault::ChainMismatch),
            _ if !entry.hmac_matches(key, &chained_from) => Some(EntryFault::HmacMismatch),
            _ => None,
        };

        chain_hash = Some(entry.compute_hmac(key, &chained_from));
        expected_sequence = entry.sequence.checked_add(1);
        broken = fault.is_some();

        entries.push(EntryVerification {
            line,
            sequence: Some(entry.sequence),
            valid: fault.is_none(),
            fault,
        });
    }

    FileVerification {
        path: path.to_path_buf(),
        valid: entries.iter().all(|e| e.valid),
        entries,
        anchor,
        first_event_type,
        last_sequence,
        last_hash,
    }
}

/// Splits on `\n`, dropping only the empty remainder after a final newline.
fn split_lines(contents: &str) -> impl Iterator<Item = &str> {
    let trimmed = contents.strip_suffix('\n').unwrap_or(contents);
    trimmed
        .split('\n')
        .filter(move |_| !trimmed.is_empty())
}
