//! Tamper-evident audit trail for the FOS trust core.
//!
//! Every license validation, certificate operation and access decision is
//! appended here as one JSON line. Each entry carries an HMAC over its own
//! fields and the previous entry's HMAC, so editing, reordering or removing an
//! entry breaks the chain from that point on.
//!
//! # Design Principles
//!
//! - **Append-only**: files are rotated by size or age, never rewritten
//! - **Single writer**: all appends go through one lock so chain order is total
//! - **Fail-visible**: a broken chain is reported, never repaired; appends
//!   continue forward from the last good anchor
//! - **Cross-file chaining**: the first entry of a rotated file chains from the
//!   last entry of the previous file

mod config;
mod entry;
mod error;
mod key;
mod log;
mod sink;
mod verify;

pub use config::{AnchorPolicy, AuditConfig};
pub use entry::{events, AuditLogEntry, GENESIS_HASH};
pub use error::{AuditError, AuditResult};
pub use key::AuditKey;
pub use log::AuditLog;
pub use sink::{AuditEvent, AuditSink, MemoryAuditSink};
pub use verify::{
    list_log_files, verify_file_with_key, BoundaryStatus, ChainReport, EntryFault,
    EntryVerification, FileVerification,
};
