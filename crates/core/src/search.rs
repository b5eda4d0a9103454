//! Nonce search engine
//!
//! For every candidate nonce the engine computes
//! `sha256(encode(level * nonce))` and compares the leading digest bytes
//! with the difficulty prefix. Nonces are tried strictly in order
//! (`start, start + 1, ...`).
//!
//! Searches run in batches of `check_interval` nonces. Between batches the
//! engine checks the stop flag and the time budget, so a budget of `T` is
//! overshot by at most one batch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::difficulty::{Difficulty, DifficultySpec};
use crate::encode::{Encoder, MichelsonInt};
use crate::error::SearchError;
use crate::params::{DEFAULT_CHECK_INTERVAL, DIGEST_SIZE, MAX_CHECK_INTERVAL};

/// One search to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub level: i64,
    pub difficulty: Difficulty,
}

impl SearchRequest {
    pub fn new(level: i64, difficulty: Difficulty) -> Self {
        Self { level, difficulty }
    }

    /// Build a request from an unvalidated wire difficulty.
    pub fn from_spec(level: i64, spec: DifficultySpec) -> Result<Self, SearchError> {
        Ok(Self::new(level, Difficulty::try_from(spec)?))
    }
}

/// Outcome of one search: a match, or an expired budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    /// Nonces hashed by this search
    #[serde(default)]
    pub attempts: u64,
}

impl SearchResult {
    pub fn found(hash: String, nonce: u64, level: i64, attempts: u64) -> Self {
        Self {
            success: true,
            hash: Some(hash),
            nonce: Some(nonce),
            level: Some(level),
            attempts,
        }
    }

    pub fn expired(attempts: u64) -> Self {
        Self {
            success: false,
            hash: None,
            nonce: None,
            level: None,
            attempts,
        }
    }
}

/// Result of scanning a fixed run of nonces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Match found after `tried` nonces
    Found { hash: String, nonce: u64, tried: u64 },
    /// No match; the next batch starts at `next_nonce`
    Exhausted { next_nonce: u64 },
}

/// Stop flag and progress counter shared between a search and its owner.
#[derive(Debug, Default)]
pub struct SearchControl {
    stop: AtomicBool,
    attempts: AtomicU64,
}

impl SearchControl {
    pub const fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
        }
    }

    /// Ask the search to stop at its next batch boundary.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Nonces hashed so far
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    #[inline]
    fn record(&self, tried: u64) {
        self.attempts.fetch_add(tried, Ordering::Relaxed);
    }
}

/// Search engine
///
/// Holds the encoder and the batch size; reusable across searches and safe
/// to share between threads when the encoder is.
#[derive(Debug, Clone)]
pub struct Kneader<E = MichelsonInt> {
    encoder: E,
    check_interval: u64,
}

impl Kneader<MichelsonInt> {
    /// Engine with the Michelson `int` encoder
    pub fn new() -> Self {
        Self::with_encoder(MichelsonInt)
    }
}

impl Default for Kneader<MichelsonInt> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Encoder> Kneader<E> {
    pub fn with_encoder(encoder: E) -> Self {
        Self {
            encoder,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Set the number of nonces hashed between clock checks, clamped to
    /// `1..=MAX_CHECK_INTERVAL`.
    pub fn with_check_interval(mut self, check_interval: u64) -> Self {
        self.check_interval = check_interval.clamp(1, MAX_CHECK_INTERVAL);
        self
    }

    pub fn check_interval(&self) -> u64 {
        self.check_interval
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Raw digest of `level * nonce`, using `buf` as scratch space.
    #[inline]
    pub fn digest(
        &self,
        level: i64,
        nonce: u64,
        buf: &mut Vec<u8>,
    ) -> Result<[u8; DIGEST_SIZE], SearchError> {
        buf.clear();
        let secret = i128::from(level) * i128::from(nonce);
        self.encoder.encode(secret, buf)?;
        Ok(Sha256::digest(buf.as_slice()).into())
    }

    /// Lowercase hex hash of `level * nonce`.
    pub fn hash_hex(&self, level: i64, nonce: u64) -> Result<String, SearchError> {
        let mut buf = Vec::with_capacity(24);
        Ok(hex::encode(self.digest(level, nonce, &mut buf)?))
    }

    /// Recompute the pipeline for a claimed solution.
    ///
    /// Returns the hash when it meets `difficulty`, `None` otherwise.
    pub fn verify(
        &self,
        level: i64,
        nonce: u64,
        difficulty: &Difficulty,
    ) -> Result<Option<String>, SearchError> {
        let hash = self.hash_hex(level, nonce)?;
        Ok(difficulty.matches_hex(&hash).then_some(hash))
    }

    /// Scan exactly `count` consecutive nonces starting at `start_nonce`.
    ///
    /// Consults no clock, so it is usable on hosts without one.
    pub fn search_batch(
        &self,
        request: &SearchRequest,
        start_nonce: u64,
        count: u64,
    ) -> Result<BatchOutcome, SearchError> {
        let mut buf = Vec::with_capacity(24);
        let mut nonce = start_nonce;

        for tried in 1..=count {
            let digest = self.digest(request.level, nonce, &mut buf)?;
            if request.difficulty.is_met_by(&digest) {
                return Ok(BatchOutcome::Found {
                    hash: hex::encode(digest),
                    nonce,
                    tried,
                });
            }
            nonce = nonce.checked_add(1).ok_or(SearchError::NonceExhausted)?;
        }

        Ok(BatchOutcome::Exhausted { next_nonce: nonce })
    }

    /// Run a search until a match, budget expiry, or a stop request.
    ///
    /// A `budget` of `None` or zero searches without a time limit.
    pub fn search(
        &self,
        request: &SearchRequest,
        start_nonce: u64,
        budget: Option<Duration>,
        control: &SearchControl,
    ) -> Result<SearchResult, SearchError> {
        let budget = budget.filter(|budget| !budget.is_zero());
        let start = Instant::now();
        let mut nonce = start_nonce;
        let mut attempts: u64 = 0;

        loop {
            if control.is_stopped() {
                return Err(SearchError::Cancelled);
            }

            match self.search_batch(request, nonce, self.check_interval)? {
                BatchOutcome::Found { hash, nonce, tried } => {
                    control.record(tried);
                    attempts += tried;
                    return Ok(SearchResult::found(hash, nonce, request.level, attempts));
                }
                BatchOutcome::Exhausted { next_nonce } => {
                    control.record(self.check_interval);
                    attempts += self.check_interval;
                    nonce = next_nonce;
                }
            }

            if let Some(budget) = budget {
                if start.elapsed() > budget {
                    return Ok(SearchResult::expired(attempts));
                }
            }
        }
    }
}
