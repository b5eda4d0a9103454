//! Hex-prefix difficulty targets
//!
//! A difficulty of `length` bytes requires the first `length * 2` hex
//! characters of the SHA-256 digest to equal `sub_bytes`. Since `sub_bytes`
//! always has an even number of hex digits, the comparison is done on the
//! raw digest bytes and the hex rendering is only produced for matches.

use serde::{Deserialize, Serialize};

use crate::error::DifficultyError;
use crate::params::{DIGEST_SIZE, MAX_DIFFICULTY_LENGTH};

/// Difficulty as it travels on the wire, before validation.
///
/// `length` is signed so that a negative value still parses and is
/// rejected by validation rather than by the JSON decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultySpec {
    /// Prefix length in bytes
    pub length: i64,
    /// Required hex prefix, `length * 2` characters
    pub sub_bytes: String,
}

/// A validated difficulty target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DifficultySpec", into = "DifficultySpec")]
pub struct Difficulty {
    /// Lowercase hex prefix
    sub_bytes: String,
    /// Decoded prefix, compared against the leading digest bytes
    prefix: Vec<u8>,
}

impl Difficulty {
    /// Validate a `(length, sub_bytes)` pair.
    ///
    /// Upper-case hex digits are accepted and normalized, since digests are
    /// always rendered in lower case.
    pub fn new(length: usize, sub_bytes: &str) -> Result<Self, DifficultyError> {
        if length > MAX_DIFFICULTY_LENGTH {
            return Err(DifficultyError::TooLong(length));
        }

        let expected = length * 2;
        if sub_bytes.len() != expected {
            return Err(DifficultyError::LengthMismatch {
                length,
                expected,
                actual: sub_bytes.len(),
            });
        }

        let prefix =
            hex::decode(sub_bytes).map_err(|_| DifficultyError::InvalidHex(sub_bytes.to_string()))?;

        Ok(Self {
            sub_bytes: sub_bytes.to_ascii_lowercase(),
            prefix,
        })
    }

    /// The empty target, met by every digest.
    pub fn trivial() -> Self {
        Self {
            sub_bytes: String::new(),
            prefix: Vec::new(),
        }
    }

    /// Prefix length in bytes
    pub fn length(&self) -> usize {
        self.prefix.len()
    }

    /// Required hex prefix (lowercase)
    pub fn sub_bytes(&self) -> &str {
        &self.sub_bytes
    }

    /// Check a raw digest against the target.
    #[inline(always)]
    pub fn is_met_by(&self, digest: &[u8; DIGEST_SIZE]) -> bool {
        digest.starts_with(&self.prefix)
    }

    /// Check a hex-rendered hash against the target.
    pub fn matches_hex(&self, hash: &str) -> bool {
        hash.get(..self.sub_bytes.len()) == Some(self.sub_bytes.as_str())
    }
}

impl TryFrom<DifficultySpec> for Difficulty {
    type Error = DifficultyError;

    fn try_from(spec: DifficultySpec) -> Result<Self, Self::Error> {
        if spec.length < 0 {
            return Err(DifficultyError::NegativeLength(spec.length));
        }
        let length = usize::try_from(spec.length).unwrap_or(usize::MAX);
        Self::new(length, &spec.sub_bytes)
    }
}

impl From<Difficulty> for DifficultySpec {
    fn from(difficulty: Difficulty) -> Self {
        Self {
            length: difficulty.prefix.len() as i64,
            sub_bytes: difficulty.sub_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_length() {
        let difficulty = Difficulty::new(2, "00ab").unwrap();
        assert_eq!(difficulty.length(), 2);
        assert_eq!(difficulty.sub_bytes(), "00ab");
    }

    #[test]
    fn normalizes_upper_case() {
        let difficulty = Difficulty::new(1, "AB").unwrap();
        assert_eq!(difficulty.sub_bytes(), "ab");
        assert!(difficulty.matches_hex("ab01"));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Difficulty::new(2, "00").unwrap_err();
        assert_eq!(
            err,
            DifficultyError::LengthMismatch {
                length: 2,
                expected: 4,
                actual: 2
            }
        );
    }

    #[test]
    fn rejects_non_hex() {
        let err = Difficulty::new(1, "zz").unwrap_err();
        assert!(matches!(err, DifficultyError::InvalidHex(_)));
    }

    #[test]
    fn rejects_prefix_longer_than_digest() {
        let sub_bytes = "0".repeat(66);
        let err = Difficulty::new(33, &sub_bytes).unwrap_err();
        assert_eq!(err, DifficultyError::TooLong(33));
    }

    #[test]
    fn trivial_target_matches_everything() {
        let difficulty = Difficulty::new(0, "").unwrap();
        assert_eq!(difficulty, Difficulty::trivial());
        assert!(difficulty.is_met_by(&[0xFF; DIGEST_SIZE]));
        assert!(difficulty.matches_hex(""));
    }

    #[test]
    fn byte_and_hex_checks_agree() {
        let difficulty = Difficulty::new(2, "00ab").unwrap();

        let mut digest = [0xFFu8; DIGEST_SIZE];
        assert!(!difficulty.is_met_by(&digest));
        assert!(!difficulty.matches_hex(&hex::encode(digest)));

        digest[0] = 0x00;
        digest[1] = 0xAB;
        assert!(difficulty.is_met_by(&digest));
        assert!(difficulty.matches_hex(&hex::encode(digest)));
    }

    #[test]
    fn rejects_negative_wire_length() {
        let spec = DifficultySpec {
            length: -1,
            sub_bytes: String::new(),
        };
        assert_eq!(
            Difficulty::try_from(spec).unwrap_err(),
            DifficultyError::NegativeLength(-1)
        );
    }

    #[test]
    fn oversized_wire_length_is_too_long() {
        let spec = DifficultySpec {
            length: i64::MAX,
            sub_bytes: "00".to_string(),
        };
        assert!(matches!(
            Difficulty::try_from(spec).unwrap_err(),
            DifficultyError::TooLong(_)
        ));
    }

    #[test]
    fn deserialization_validates() {
        let ok: Difficulty = serde_json::from_str(r#"{"length":1,"sub_bytes":"00"}"#).unwrap();
        assert_eq!(ok.sub_bytes(), "00");

        let bad = serde_json::from_str::<Difficulty>(r#"{"length":2,"sub_bytes":"00"}"#);
        assert!(bad.is_err());

        let spec: DifficultySpec = serde_json::from_str(r#"{"length":-1,"sub_bytes":""}"#).unwrap();
        assert_eq!(spec.length, -1);
    }
}
