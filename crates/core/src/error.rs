//! Error types for difficulty parsing, encoding and search.

use thiserror::Error;

/// A difficulty that can never be compared against a digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DifficultyError {
    #[error("sub_bytes has {actual} hex characters, expected {expected} for length {length}")]
    LengthMismatch {
        length: usize,
        expected: usize,
        actual: usize,
    },

    #[error("sub_bytes is not a hex string: {0:?}")]
    InvalidHex(String),

    #[error("difficulty length {0} is negative")]
    NegativeLength(i64),

    #[error("difficulty length {0} exceeds the {}-byte digest", crate::params::MAX_DIFFICULTY_LENGTH)]
    TooLong(usize),
}

/// Failure of an [`Encoder`](crate::Encoder) to represent a secret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("secret {0} cannot be represented by this encoding")]
    Unrepresentable(i128),
}

/// Errors that abort a search before it reaches a defined outcome.
///
/// Timeout is not among them: an expired budget is a regular
/// [`SearchResult`](crate::SearchResult) with `success == false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("invalid difficulty: {0}")]
    InvalidDifficulty(#[from] DifficultyError),

    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodeError),

    #[error("nonce space exhausted")]
    NonceExhausted,

    #[error("search cancelled")]
    Cancelled,
}
