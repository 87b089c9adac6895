//! Trusted public keys and Ed25519 signing.
//!
//! The embedded key ring is versioned: each key carries an id, and grants or
//! certificates name the id they were signed with. Retiring a signing key
//! means adding a new one, not removing the old one, so previously issued
//! licenses keep verifying.

use crate::error::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{
    Signature as DalekSignature, Signer as _, SigningKey as DalekSigningKey, Verifier as _,
    VerifyingKey as DalekVerifyingKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Algorithm id for Ed25519 keys.
pub const ED25519: &str = "ed25519";

/// Length of a raw Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Build-time trusted keys: `(key id, public key)`.
const EMBEDDED_KEYS: [(&str, [u8; 32]); 2] = [
    (
        "fos-2024-01",
        [
            157, 103, 20, 110, 116, 167, 100, 36, 17, 248, 19, 197, 212, 122, 158, 39, 227, 113,
            116, 247, 177, 183, 72, 210, 159, 71, 147, 149, 126, 190, 47, 133,
        ],
    ),
    (
        "fos-2026-01",
        [
            108, 119, 156, 164, 153, 175, 215, 12, 116, 60, 11, 52, 219, 55, 214, 115, 169, 147,
            201, 64, 148, 90, 124, 174, 88, 219, 117, 172, 11, 207, 39, 67,
        ],
    ),
];

/// A public key trusted to sign grants and certificates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedPublicKey {
    pub key_id: String,
    pub algorithm_id: String,
    #[serde(with = "hex_bytes")]
    pub public_key_bytes: Vec<u8>,
}

impl TrustedPublicKey {
    /// Creates an Ed25519 trusted key.
    pub fn ed25519(key_id: impl Into<String>, public_key: [u8; 32]) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm_id: ED25519.to_string(),
            public_key_bytes: public_key.to_vec(),
        }
    }

    /// Verifies `signature` over `message` with this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> CryptoResult<()> {
        if self.algorithm_id != ED25519 {
            return Err(CryptoError::UnsupportedAlgorithm(self.algorithm_id.clone()));
        }

        let key_bytes: [u8; 32] = self
            .public_key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey(self.key_id.clone()))?;
        let verifying_key = DalekVerifyingKey::from_bytes(&key_bytes)
            .map_err(|_| CryptoError::InvalidPublicKey(self.key_id.clone()))?;

        let signature = DalekSignature::from_slice(signature).map_err(|_| {
            CryptoError::InvalidSignatureEncoding(format!(
                "expected {SIGNATURE_LEN} bytes, got {}",
                signature.len()
            ))
        })?;

        verifying_key
            .verify(message, &signature)
            .map_err(|_| CryptoError::SignatureInvalid)
    }
}

/// The set of trusted public keys, indexed by key id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRing {
    keys: BTreeMap<String, TrustedPublicKey>,
}

impl KeyRing {
    /// Creates an empty key ring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key ring compiled into this build.
    #[must_use]
    pub fn embedded() -> Self {
        EMBEDDED_KEYS
            .iter()
            .fold(Self::new(), |ring, (id, bytes)| {
                ring.with_key(TrustedPublicKey::ed25519(*id, *bytes))
            })
    }

    /// Adds a key, replacing any key with the same id.
    #[must_use]
    pub fn with_key(mut self, key: TrustedPublicKey) -> Self {
        self.insert(key);
        self
    }

    pub fn insert(&mut self, key: TrustedPublicKey) {
        self.keys.insert(key.key_id.clone(), key);
    }

    /// Looks up a key by id.
    #[must_use]
    pub fn get(&self, key_id: &str) -> Option<&TrustedPublicKey> {
        self.keys.get(key_id)
    }

    /// Iterates key ids in sorted order.
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Verifies `signature` over `message` using the key named `key_id`.
    ///
    /// # Errors
    ///
    /// `UnknownKey` if no such key is trusted; otherwise whatever
    /// [`TrustedPublicKey::verify`] reports.
    pub fn verify(&self, key_id: &str, message: &[u8], signature: &[u8]) -> CryptoResult<()> {
        self.get(key_id)
            .ok_or_else(|| CryptoError::UnknownKey(key_id.to_string()))?
            .verify(message, signature)
    }
}

/// An Ed25519 secret key bound to the id verifiers will look it up by.
pub struct SigningKey {
    key_id: String,
    inner: DalekSigningKey,
}

impl SigningKey {
    /// Creates a signing key from a raw 32-byte secret.
    pub fn from_bytes(key_id: impl Into<String>, secret: &[u8; 32]) -> Self {
        Self {
            key_id: key_id.into(),
            inner: DalekSigningKey::from_bytes(secret),
        }
    }

    /// Generates a new random signing key.
    pub fn generate(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            inner: DalekSigningKey::generate(&mut OsRng),
        }
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the raw 32-byte secret.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Signs a message and returns the raw signature.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.inner.sign(message).to_bytes()
    }

    /// Returns the public half as a trusted key entry.
    #[must_use]
    pub fn trusted_public_key(&self) -> TrustedPublicKey {
        TrustedPublicKey::ed25519(self.key_id.clone(), self.inner.verifying_key().to_bytes())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Encodes a raw signature for JSON documents.
#[must_use]
pub fn encode_signature(signature: &[u8]) -> String {
    BASE64.encode(signature)
}

/// Decodes a base64 signature from a JSON document.
pub fn decode_signature(encoded: &str) -> CryptoResult<Vec<u8>> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidSignatureEncoding(format!("invalid base64: {e}")))?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignatureEncoding(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
