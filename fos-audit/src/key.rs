//! The secret key behind entry HMACs.

use crate::error::{AuditError, AuditResult};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fs;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Minimum accepted key length in bytes.
const MIN_KEY_LEN: usize = 16;

/// Generated key length in bytes.
const KEY_LEN: usize = 32;

/// HMAC key for the audit chain. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuditKey(Vec<u8>);

impl AuditKey {
    /// Wraps raw key bytes.
    ///
    /// # Errors
    ///
    /// `InvalidKey` if shorter than 16 bytes.
    pub fn from_bytes(bytes: &[u8]) -> AuditResult<Self> {
        if bytes.len() < MIN_KEY_LEN {
            return Err(AuditError::InvalidKey(format!(
                "expected at least {MIN_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Generates a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Loads a hex-encoded key file, creating it with a fresh key if absent.
    pub fn load_or_create(path: &Path) -> AuditResult<Self> {
        if path.exists() {
            let mut contents = fs::read_to_string(path)?;
            let decoded = hex::decode(contents.trim())
                .map_err(|e| AuditError::InvalidKey(format!("key file is not hex: {e}")));
            contents.zeroize();
            let mut decoded = decoded?;
            let key = Self::from_bytes(&decoded);
            decoded.zeroize();
            return key;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let key = Self::generate();
        let mut encoded = hex::encode(&key.0);
        let written = fs::write(path, &encoded);
        encoded.zeroize();
        written?;
        tracing::info!(path = %path.display(), "Created new audit key");
        Ok(key)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for AuditKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuditKey(..)")
    }
}
