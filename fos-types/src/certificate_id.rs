//! Processing certificate identifiers.
//!
//! Format: `FOS-{licensee code}-{YYMM}-{sequence}-{check digit}`, for example
//! `FOS-ABC-2410-0001-5`. The string is consumed by the public verification
//! lookup and must stay bit-exact.
//!
//! The check digit is a positional-weighted sum modulo 36 over the
//! concatenated data segments. It catches most transcription errors in
//! human-copied ids; it is not a cryptographic integrity check.

use crate::failure::{ErrorKind, TrustFailure, TrustResult};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Fixed prefix of every certificate id.
pub const CERTIFICATE_ID_PREFIX: &str = "FOS";

/// Smallest sequence number that may be issued.
pub const MIN_SEQUENCE: u16 = 1;

/// Largest sequence number that may be issued.
pub const MAX_SEQUENCE: u16 = 9999;

const CODE_LEN: usize = 3;
const YEAR_MONTH_LEN: usize = 4;
const SEQUENCE_LEN: usize = 4;

/// An immutable, checksummed certificate identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CertificateId {
    licensee_code: String,
    year_month: String,
    sequence: u16,
    check_digit: char,
}

impl CertificateId {
    /// Generates an id for the current UTC year and month.
    ///
    /// # Errors
    ///
    /// `SequenceOutOfRange` if `sequence` is outside `1..=9999`,
    /// `FormatMismatch` if `licensee_code` is not three ASCII letters.
    pub fn generate(licensee_code: &str, sequence: u16) -> TrustResult<Self> {
        Self::generate_at(licensee_code, sequence, Utc::now())
    }

    /// Generates an id for the year and month of `now`.
    pub fn generate_at(licensee_code: &str, sequence: u16, now: DateTime<Utc>) -> TrustResult<Self> {
        if !(MIN_SEQUENCE..=MAX_SEQUENCE).contains(&sequence) {
            return Err(TrustFailure::new(
                ErrorKind::SequenceOutOfRange,
                format!("sequence {sequence} is outside {MIN_SEQUENCE}..={MAX_SEQUENCE}"),
            ));
        }

        let licensee_code = normalize_licensee_code(licensee_code)?;
        let year_month = format!("{:02}{:02}", now.year().rem_euclid(100), now.month());
        let sequence_str = format!("{sequence:04}");
        let check_digit = compute_check_digit(&licensee_code, &year_month, &sequence_str)
            .ok_or_else(|| {
                TrustFailure::new(ErrorKind::FormatMismatch, "data segments are not alphanumeric")
            })?;

        Ok(Self {
            licensee_code,
            year_month,
            sequence,
            check_digit,
        })
    }

    /// Parses and validates a certificate id string.
    ///
    /// Input is trimmed and uppercased first, so ids copied by hand with stray
    /// whitespace or lowercase letters are accepted.
    pub fn parse(text: &str) -> TrustResult<Self> {
        let text = text.trim().to_ascii_uppercase();
        if text.is_empty() {
            return Err(TrustFailure::new(ErrorKind::EmptyInput, "certificate id is empty"));
        }

        let format_mismatch = || {
            TrustFailure::new(
                ErrorKind::FormatMismatch,
                "expected FOS-AAA-YYMM-NNNN-C",
            )
            .with_detail("input", text.clone())
        };

        let parts: Vec<&str> = text.split('-').collect();
        let [prefix, code, year_month, sequence, check] = parts.as_slice() else {
            return Err(format_mismatch());
        };

        let well_formed = *prefix == CERTIFICATE_ID_PREFIX
            && code.len() == CODE_LEN
            && code.bytes().all(|b| b.is_ascii_uppercase())
            && year_month.len() == YEAR_MONTH_LEN
            && year_month.bytes().all(|b| b.is_ascii_digit())
            && sequence.len() == SEQUENCE_LEN
            && sequence.bytes().all(|b| b.is_ascii_digit())
            && check.len() == 1
            && check.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if !well_formed {
            return Err(format_mismatch());
        }

        let parsed_digit = check.chars().next().ok_or_else(format_mismatch)?;
        let expected_digit =
            compute_check_digit(code, year_month, sequence).ok_or_else(format_mismatch)?;
        if parsed_digit != expected_digit {
            return Err(TrustFailure::new(
                ErrorKind::ChecksumMismatch,
                "check digit does not match certificate data",
            )
            .with_detail("expected", expected_digit.to_string())
            .with_detail("actual", parsed_digit.to_string()));
        }

        let sequence_value = sequence.parse::<u16>().map_err(|_| format_mismatch())?;

        Ok(Self {
            licensee_code: (*code).to_string(),
            year_month: (*year_month).to_string(),
            sequence: sequence_value,
            check_digit: parsed_digit,
        })
    }

    /// Three-letter licensee code.
    #[must_use]
    pub fn licensee_code(&self) -> &str {
        &self.licensee_code
    }

    /// Two-digit year followed by two-digit month.
    #[must_use]
    pub fn year_month(&self) -> &str {
        &self.year_month
    }

    /// Sequence number within `(licensee_code, year_month)`.
    #[must_use]
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    #[must_use]
    pub fn check_digit(&self) -> char {
        self.check_digit
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{CERTIFICATE_ID_PREFIX}-{}-{}-{:04}-{}",
            self.licensee_code, self.year_month, self.sequence, self.check_digit
        )
    }
}

impl FromStr for CertificateId {
    type Err = TrustFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CertificateId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CertificateId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Uppercases and validates a licensee code.
fn normalize_licensee_code(code: &str) -> TrustResult<String> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != CODE_LEN || !code.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(TrustFailure::new(
            ErrorKind::FormatMismatch,
            "licensee code must be exactly three letters",
        )
        .with_detail("input", code));
    }
    Ok(code)
}

/// Value of one alphanumeric character: `0-9` map to 0..=9, `A-Z` to 10..=35.
fn char_value(c: char) -> Option<u32> {
    c.to_digit(36)
}

/// Positional-weighted sum modulo 36 over `code ‖ year_month ‖ sequence`.
///
/// Returns `None` if any character is not alphanumeric.
fn compute_check_digit(code: &str, year_month: &str, sequence: &str) -> Option<char> {
    let mut sum: u32 = 0;
    for (i, c) in code.chars().chain(year_month.chars()).chain(sequence.chars()).enumerate() {
        let weight = u32::try_from(i + 1).ok()?;
        sum += char_value(c.to_ascii_uppercase())? * weight;
    }
    std::char::from_digit(sum % 36, 36).map(|c| c.to_ascii_uppercase())
}
