//! Key trust, canonical encoding and digests for the FOS trust core.
//!
//! - [`KeyRing`]: the versioned set of trusted Ed25519 public keys, embedded at
//!   build time so several keys can coexist across rotations
//! - [`SigningKey`]: an Ed25519 secret key bound to its key id
//! - [`CanonicalEncoder`]: the one deterministic byte encoding every signed or
//!   MAC'd structure goes through
//! - SHA-256 and HMAC-SHA256 helpers
//!
//! Nothing here touches the network.

mod canonical;
mod digest;
mod error;
mod keys;

pub use canonical::CanonicalEncoder;
pub use digest::{hmac_sha256_hex, sha256_hex, verify_hmac_sha256};
pub use error::{CryptoError, CryptoResult};
pub use keys::{
    decode_signature, encode_signature, KeyRing, SigningKey, TrustedPublicKey, ED25519,
    SIGNATURE_LEN,
};
