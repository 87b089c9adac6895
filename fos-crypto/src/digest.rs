//! SHA-256 and HMAC-SHA256 helpers with hex output.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn keyed(key: &[u8], parts: &[&[u8]]) -> HmacSha256 {
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    for part in parts {
        mac.update(part);
    }
    mac
}

/// Lowercase hex HMAC-SHA256 over the concatenation of `parts`.
#[must_use]
pub fn hmac_sha256_hex(key: &[u8], parts: &[&[u8]]) -> String {
    hex::encode(keyed(key, parts).finalize().into_bytes())
}

/// Constant-time check of a hex HMAC-SHA256 over `parts`.
#[must_use]
pub fn verify_hmac_sha256(key: &[u8], parts: &[&[u8]], expected_hex: &str) -> bool {
    match hex::decode(expected_hex) {
        Ok(expected) => keyed(key, parts).verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hmac_parts_concatenate() {
        let key = b"key";
        assert_eq!(
            hmac_sha256_hex(key, &[b"ab", b"c"]),
            hmac_sha256_hex(key, &[b"abc"])
        );
    }

    #[test]
    fn hmac_verify() {
        let tag = hmac_sha256_hex(b"k", &[b"message"]);
        assert!(verify_hmac_sha256(b"k", &[b"message"], &tag));
        assert!(!verify_hmac_sha256(b"k", &[b"messagf"], &tag));
        assert!(!verify_hmac_sha256(b"other", &[b"message"], &tag));
        assert!(!verify_hmac_sha256(b"k", &[b"message"], "zz"));
    }
}
