use fos_crypto::{
    decode_signature, encode_signature, CanonicalEncoder, CryptoError, KeyRing, SigningKey,
    TrustedPublicKey, ED25519,
};
use fos_types::ErrorKind;
use proptest::prelude::*;

fn seeded(key_id: &str, seed: u8) -> SigningKey {
    let mut secret = [0u8; 32];
    for (i, b) in secret.iter_mut().enumerate() {
        *b = seed.wrapping_add(i as u8);
    }
    SigningKey::from_bytes(key_id, &secret)
}

// ── KeyRing ──────────────────────────────────────────────────────

#[test]
fn embedded_ring_contains_rotation_keys() {
    let ring = KeyRing::embedded();
    let ids: Vec<&str> = ring.key_ids().collect();
    assert_eq!(ids, vec!["fos-2024-01", "fos-2026-01"]);
    assert!(ring.get("fos-2024-01").is_some());
    assert!(ring.get("fos-1999-01").is_none());
}

#[test]
fn old_and_new_keys_coexist() {
    let old = seeded("k-2024", 1);
    let new = seeded("k-2026", 2);
    let ring = KeyRing::new()
        .with_key(old.trusted_public_key())
        .with_key(new.trusted_public_key());

    let msg = b"grant bytes";
    assert!(ring.verify("k-2024", msg, &old.sign(msg)).is_ok());
    assert!(ring.verify("k-2026", msg, &new.sign(msg)).is_ok());
}

#[test]
fn signature_under_other_key_id_fails() {
    let a = seeded("a", 1);
    let b = seeded("b", 2);
    let ring = KeyRing::new()
        .with_key(a.trusted_public_key())
        .with_key(b.trusted_public_key());
    let sig = a.sign(b"payload");
    assert!(matches!(
        ring.verify("b", b"payload", &sig),
        Err(CryptoError::SignatureInvalid)
    ));
}

#[test]
fn unknown_key_maps_to_unknown_signing_key() {
    let ring = KeyRing::new();
    let err = ring.verify("missing", b"x", &[0u8; 64]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownSigningKey);
    let failure: fos_types::TrustFailure = err.into();
    assert_eq!(failure.details.get("signing_key_id").map(String::as_str), Some("missing"));
}

#[test]
fn tampered_message_fails() {
    let sk = seeded("k", 9);
    let ring = KeyRing::new().with_key(sk.trusted_public_key());
    let sig = sk.sign(b"original");
    let err = ring.verify("k", b"originaL", &sig).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
}

#[test]
fn unsupported_algorithm_rejected() {
    let sk = seeded("k", 3);
    let mut key = sk.trusted_public_key();
    key.algorithm_id = "rsa-pss".into();
    let ring = KeyRing::new().with_key(key);
    let err = ring.verify("k", b"m", &sk.sign(b"m")).unwrap_err();
    assert!(matches!(err, CryptoError::UnsupportedAlgorithm(_)));
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
}

#[test]
fn truncated_public_key_rejected() {
    let key = TrustedPublicKey {
        key_id: "short".into(),
        algorithm_id: ED25519.into(),
        public_key_bytes: vec![1, 2, 3],
    };
    let err = key.verify(b"m", &[0u8; 64]).unwrap_err();
    assert!(matches!(err, CryptoError::InvalidPublicKey(_)));
}

#[test]
fn trusted_key_serde_uses_hex() {
    let key = seeded("k", 5).trusted_public_key();
    let json = serde_json::to_string(&key).unwrap();
    assert!(json.contains("\"keyId\":\"k\""));
    assert!(json.contains("\"algorithmId\":\"ed25519\""));
    let back: TrustedPublicKey = serde_json::from_str(&json).unwrap();
    assert_eq!(back, key);
}

// ── Signature encoding ───────────────────────────────────────────

#[test]
fn signature_encoding_roundtrip() {
    let sk = seeded("k", 4);
    let sig = sk.sign(b"abc");
    let decoded = decode_signature(&encode_signature(&sig)).unwrap();
    assert_eq!(decoded, sig.to_vec());
}

#[test]
fn signature_decoding_rejects_garbage() {
    assert!(decode_signature("not base64!").is_err());
    assert!(decode_signature(&encode_signature(&[1u8; 10])).is_err());
}

#[test]
fn signing_is_deterministic() {
    let sk = seeded("k", 6);
    assert_eq!(sk.sign(b"same"), sk.sign(b"same"));
    let restored = SigningKey::from_bytes("k", &sk.to_bytes());
    assert_eq!(restored.sign(b"same"), sk.sign(b"same"));
}

// ── Canonical encoding ───────────────────────────────────────────

#[test]
fn canonical_sets_ignore_insertion_order() {
    let a: std::collections::BTreeSet<String> =
        ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
    let b: std::collections::BTreeSet<String> =
        ["z", "x", "y"].iter().map(|s| s.to_string()).collect();
    let ea = CanonicalEncoder::new("t").string_set("s", &a).finish();
    let eb = CanonicalEncoder::new("t").string_set("s", &b).finish();
    assert_eq!(ea, eb);
}

#[test]
fn canonical_lists_keep_order() {
    let a = vec!["1".to_string(), "2".to_string()];
    let b = vec!["2".to_string(), "1".to_string()];
    let ea = CanonicalEncoder::new("t").string_list("l", &a).finish();
    let eb = CanonicalEncoder::new("t").string_list("l", &b).finish();
    assert_ne!(ea, eb);
}

// ── Properties ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn two_field_encodings_are_injective(
        a in (".{0,8}", ".{0,8}", ".{0,8}", ".{0,8}"),
        b in (".{0,8}", ".{0,8}", ".{0,8}", ".{0,8}"),
    ) {
        let encode = |(n1, v1, n2, v2): &(String, String, String, String)| {
            CanonicalEncoder::new("t").str(n1, v1).str(n2, v2).finish()
        };
        prop_assert_eq!(encode(&a) == encode(&b), a == b);
    }

    #[test]
    fn moving_bytes_between_name_and_value_changes_encoding(
        text in "[a-z]{2,16}",
        split in 1usize..16,
    ) {
        let split = split.min(text.len() - 1);
        let (name, value) = text.split_at(split);
        let (name2, value2) = text.split_at(split + 1);
        let a = CanonicalEncoder::new("t").str(name, value).finish();
        let b = CanonicalEncoder::new("t").str(name2, value2).finish();
        prop_assert_ne!(a, b);
    }
}
