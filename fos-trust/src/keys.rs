//! Key material read from disk or the command line.

use crate::error::{TrustCoreError, TrustCoreResult};
use fos_crypto::{SigningKey, TrustedPublicKey};
use std::path::Path;
use zeroize::Zeroize;

/// Reads a hex-encoded 32-byte Ed25519 seed.
pub fn load_signing_key(path: &Path, key_id: &str) -> TrustCoreResult<SigningKey> {
    let mut contents = std::fs::read_to_string(path)?;
    let decoded = hex::decode(contents.trim());
    contents.zeroize();

    let mut bytes = decoded.map_err(|e| TrustCoreError::SigningKey(format!("not hex: {e}")))?;
    let seed: Result<[u8; 32], _> = bytes.as_slice().try_into();
    bytes.zeroize();
    let mut seed = seed.map_err(|_| TrustCoreError::SigningKey("expected 32 bytes".into()))?;

    let key = SigningKey::from_bytes(key_id, &seed);
    seed.zeroize();
    Ok(key)
}

/// Parses `key-id:hex-public-key`.
pub fn parse_public_key(text: &str) -> TrustCoreResult<TrustedPublicKey> {
    let (key_id, encoded) = text
        .split_once(':')
        .ok_or_else(|| TrustCoreError::SigningKey(format!("expected ID:HEX, got {text:?}")))?;
    if key_id.is_empty() {
        return Err(TrustCoreError::SigningKey("empty key id".into()));
    }
    let bytes = hex::decode(encoded.trim())
        .map_err(|e| TrustCoreError::SigningKey(format!("public key is not hex: {e}")))?;
    let public: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| TrustCoreError::SigningKey("public key must be 32 bytes".into()))?;
    Ok(TrustedPublicKey::ed25519(key_id, public))
}
