//! Core value types for the FOS trust core.
//!
//! This crate defines the small, dependency-free building blocks shared by
//! every other trust component:
//! - Processing certificate identifiers (`FOS-ABC-2410-0001-5`)
//! - The typed failure union returned by validation, verification and parsing
//!
//! Nothing in here performs I/O.

mod certificate_id;
mod failure;

pub use certificate_id::{CertificateId, CERTIFICATE_ID_PREFIX, MAX_SEQUENCE, MIN_SEQUENCE};
pub use failure::{ErrorKind, TrustFailure, TrustResult};
