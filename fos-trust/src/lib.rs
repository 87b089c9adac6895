//! # FOS Trust Core
//!
//! Wires the offline trust components into one running unit:
//!
//! - **Audit log** (`fos-audit`): opened first so every later step is recorded
//! - **License validation** (`fos-license`): the grant is checked once at
//!   startup and then periodically, with clock-jump detection
//! - **Certificates** (`fos-certificate`): issued through the license gate
//!   when a signing key is configured
//!
//! Configuration comes from `fos-trust.toml`; see [`config`].

pub mod config;
mod runtime;
mod error;
pub mod keys;

pub use config::TrustConfig;
pub use runtime::TrustCore;
pub use error::{TrustCoreError, TrustCoreResult};
