//! Processing certificates for the FOS trust core.
//!
//! A certificate records that a licensed module processed a project, signed
//! so that any later change to its fields is detectable. Ids come from
//! [`SequenceAllocator`]; issuance is gated by the license
//! ([`CertificateIssuer`]); delivery to the tracking server is best-effort
//! ([`spawn_sync`]).

mod certificate;
mod error;
mod issuer;
mod sequence;
mod signer;
mod sync;

pub use certificate::{CertificateDraft, ProcessingCertificate};
pub use error::{CertificateError, CertificateResult};
pub use issuer::{CertificateIssuer, IssueRequest};
pub use sequence::SequenceAllocator;
pub use signer::{check_data_hash, CertificateSigner, CertificateVerifier, VerificationOutcome};
pub use sync::{spawn_sync, RetryPolicy, SyncPayload, SyncStatus, SyncTransport};
