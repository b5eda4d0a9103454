//! Kneader Worker Library
//!
//! A proof-of-work worker that searches for a nonce whose packed
//! `level * nonce` product hashes to a digest with a required hex prefix.
//!
//! # Overview
//!
//! The search itself lives in [`engine`] (the `kneader-core` crate). This
//! crate wraps it in a message-driven worker session:
//!
//! - [`protocol`]: the `init` / `create-hash` / `hash-found` JSON messages
//! - [`session`]: one tokio task per worker context, with queueing and abort
//! - [`serve`]: the JSON-lines transport used by `kneader serve`
//! - [`config`]: TOML configuration
//! - [`logging`]: `tracing` subscriber setup
//!
//! # Example
//!
//! ```rust
//! use kneader::engine::DifficultySpec;
//! use kneader::protocol::Event;
//! use kneader::session::{self, SessionConfig};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let (handle, mut events) = session::spawn(SessionConfig::default());
//!
//! handle.init("KT1abc").await.unwrap();
//! handle
//!     .create_hash(7, DifficultySpec { length: 1, sub_bytes: "00".into() })
//!     .await
//!     .unwrap();
//!
//! let Some(Event::HashFound(outcome)) = events.recv().await else { panic!() };
//! assert!(outcome.success);
//! assert!(outcome.hash.unwrap().starts_with("00"));
//! # });
//! ```

// Re-export the core search engine
pub use kneader_core as engine;

pub mod config;
pub mod logging;
pub mod protocol;
pub mod serve;
pub mod session;

// Convenience re-exports
pub use config::{ConfigError, KneaderConfig};
pub use engine::{Difficulty, DifficultySpec, Kneader, SearchRequest, SearchResult};
pub use protocol::{Command, Event, HashFound};
pub use session::{SessionConfig, SessionError, SessionHandle, SessionState, SessionStatus};
