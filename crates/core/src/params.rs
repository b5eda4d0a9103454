//! Search parameters shared by the engine and its hosts.

/// Exclusive upper bound of a derived start nonce.
pub const NONCE_RANGE: u64 = 1_000_000_000;

/// Default time budget for one search, in seconds.
pub const DEFAULT_TIME_BUDGET_SECS: u64 = 240;

/// Number of nonces hashed between two clock / stop-flag checks.
pub const DEFAULT_CHECK_INTERVAL: u64 = 1024;

/// Largest accepted check interval. Bounds how far a search can overrun its
/// time budget, or a stop request, to one batch of this many nonces.
pub const MAX_CHECK_INTERVAL: u64 = 1 << 16;

/// SHA-256 output size
pub const DIGEST_SIZE: usize = 32;

/// Longest difficulty, in bytes, that a digest can satisfy.
pub const MAX_DIFFICULTY_LENGTH: usize = DIGEST_SIZE;

/// First byte of every packed Michelson value.
pub const PACK_PREFIX: u8 = 0x05;

/// Node tag of a Michelson `int` literal.
pub const INT_TAG: u8 = 0x00;
