//! # Kneader Core
//!
//! Bounded-time proof-of-work search over Michelson-packed integers.
//!
//! A search looks for a nonce such that
//!
//! ```text
//! hex(sha256(pack(int(level * nonce))))  starts with  difficulty.sub_bytes
//! ```
//!
//! starting from a seeded pseudo-random nonce and walking upwards one nonce
//! at a time until a match is found or the time budget runs out.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use kneader_core::{Difficulty, Kneader, SearchControl, SearchRequest};
//!
//! let kneader = Kneader::new();
//! let request = SearchRequest::new(7, Difficulty::new(1, "00").unwrap());
//! let control = SearchControl::new();
//!
//! let result = kneader
//!     .search(&request, 1000, Some(Duration::from_secs(10)), &control)
//!     .unwrap();
//!
//! assert!(result.success);
//! assert!(result.hash.unwrap().starts_with("00"));
//! ```
//!
//! ## Batches
//!
//! Hosts without a monotonic clock (browsers, via `kneader-web`) drive the
//! search themselves with [`Kneader::search_batch`], which scans a fixed
//! number of nonces and never reads the time.

mod difficulty;
mod encode;
mod error;
mod params;
mod search;
mod seed;

pub use difficulty::{Difficulty, DifficultySpec};
pub use encode::{Encoder, MichelsonInt, pack_int};
pub use error::{DifficultyError, EncodeError, SearchError};
pub use params::*;
pub use search::{BatchOutcome, Kneader, SearchControl, SearchRequest, SearchResult};
pub use seed::{ClockSeed, FixedSeed, SeedStrategy, derive_start_nonce};
