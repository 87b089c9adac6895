//! Offline licensing for the FOS trust core.
//!
//! This crate handles:
//! - Signed offline license grants verified against the trusted key ring
//! - Hardware fingerprint collection and fuzzy binding
//! - Expiry, grace and clock-rollback rules
//! - The module gate other components query, and the module registry
//! - Background revalidation with clock-jump detection
//!
//! # Design Principles
//!
//! - **Offline-only**: no operation touches the network
//! - **Fail-closed**: nothing is licensed until a validation pass says so
//! - **Forward-only time**: the last trusted time never moves backwards
//! - **Audited**: every validation, load and access decision is recorded

mod clock;
mod device;
mod error;
mod gate;
mod grant;
mod registry;
mod revalidation;
mod status;
mod validator;

pub use clock::LastSeenStore;
pub use device::{
    collect_cancellable, collect_local_fingerprints, fingerprint, matches, FingerprintSource,
    LocalFingerprints,
};
pub use error::{LicenseError, LicenseResult};
pub use gate::{GateLifecycle, LicenseGate};
pub use grant::{
    mask_license_id, ClientInfo, FingerprintBinding, OfflineLicenseGrant, ProductInfo,
    SCHEMA_VERSION,
};
pub use registry::{ModuleDescriptor, ModuleRegistry, ModuleRegistryBuilder};
pub use revalidation::{spawn_revalidation, RevalidationSchedule};
pub use status::{LicenseHolder, LicenseStatus, ValidationResult};
pub use validator::{evaluate, LicenseValidator, DEFAULT_CLOCK_TOLERANCE_SECS};
