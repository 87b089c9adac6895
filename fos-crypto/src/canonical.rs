//! Deterministic byte encoding for signed and MAC'd structures.
//!
//! Layout: a length-prefixed domain tag, then one record per field:
//!
//! ```text
//! name_len:u32be | name | kind:u8 | value
//! ```
//!
//! Strings are `len:u32be | utf8`. Integers are fixed-width big-endian.
//! Timestamps are `i64be` microseconds since the Unix epoch. Sets and maps are
//! count-prefixed and written in sorted order; lists keep their stored order.
//! The encoding never depends on locale, whitespace or float formatting, so
//! the signer and every verifier hash byte-identical input.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

const KIND_STR: u8 = 1;
const KIND_U32: u8 = 2;
const KIND_U64: u8 = 3;
const KIND_TIMESTAMP: u8 = 4;
const KIND_BOOL: u8 = 5;
const KIND_SET: u8 = 6;
const KIND_MAP: u8 = 7;
const KIND_LIST: u8 = 8;

/// Builder for canonical byte strings.
#[derive(Debug, Clone)]
pub struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    /// Starts an encoding under a domain tag such as `fos.license.v1`.
    #[must_use]
    pub fn new(domain: &str) -> Self {
        let mut encoder = Self {
            buf: Vec::with_capacity(256),
        };
        encoder.put_bytes(domain.as_bytes());
        encoder
    }

    pub fn str(&mut self, name: &str, value: &str) -> &mut Self {
        self.field(name, KIND_STR);
        self.put_bytes(value.as_bytes());
        self
    }

    pub fn u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.field(name, KIND_U32);
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u64(&mut self, name: &str, value: u64) -> &mut Self {
        self.field(name, KIND_U64);
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.field(name, KIND_BOOL);
        self.buf.push(u8::from(value));
        self
    }

    /// Encodes a UTC instant at microsecond precision.
    pub fn timestamp(&mut self, name: &str, value: &DateTime<Utc>) -> &mut Self {
        self.field(name, KIND_TIMESTAMP);
        self.buf.extend_from_slice(&value.timestamp_micros().to_be_bytes());
        self
    }

    /// Encodes a set of strings in sorted order.
    pub fn string_set(&mut self, name: &str, values: &BTreeSet<String>) -> &mut Self {
        self.field(name, KIND_SET);
        self.put_len(values.len());
        for value in values {
            self.put_bytes(value.as_bytes());
        }
        self
    }

    /// Encodes a string map in key order.
    pub fn string_map(&mut self, name: &str, values: &BTreeMap<String, String>) -> &mut Self {
        self.field(name, KIND_MAP);
        self.put_len(values.len());
        for (key, value) in values {
            self.put_bytes(key.as_bytes());
            self.put_bytes(value.as_bytes());
        }
        self
    }

    /// Encodes a list of strings in stored order.
    pub fn string_list(&mut self, name: &str, values: &[String]) -> &mut Self {
        self.field(name, KIND_LIST);
        self.put_len(values.len());
        for value in values {
            self.put_bytes(value.as_bytes());
        }
        self
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn finish(&self) -> Vec<u8> {
        self.buf.clone()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn field(&mut self, name: &str, kind: u8) {
        self.put_bytes(name.as_bytes());
        self.buf.push(kind);
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_len(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    // In-memory documents never reach u32::MAX bytes.
    fn put_len(&mut self, len: usize) {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        self.buf.extend_from_slice(&len.to_be_bytes());
    }
}
