//! Worker message protocol
//!
//! Commands flow from the host into a session, events flow back. Both are
//! JSON objects tagged by `type`:
//!
//! ```text
//! in   {"type":"init","payload":"KT1abc"}
//! in   {"type":"create-hash","payload":{"level":7,"difficulty":{"length":1,"sub_bytes":"00"}}}
//! out  {"type":"hash-found","success":true,"hash":"00ba...","nonce":1375,"level":7}
//! out  {"type":"hash-found","success":false}
//! ```

use kneader_core::{DifficultySpec, SearchResult};
use serde::{Deserialize, Serialize};

/// Host-to-worker message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Command {
    /// Bind the session to a context identifier (contract address)
    Init(String),
    /// Start a search, or queue it behind the running one
    CreateHash(CreateHash),
}

/// Payload of a `create-hash` command.
///
/// The difficulty is kept in wire form so that an invalid one still gets a
/// `hash-found` answer instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateHash {
    pub level: i64,
    pub difficulty: DifficultySpec,
}

/// Worker-to-host message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    HashFound(HashFound),
}

/// Terminal outcome of one `create-hash` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashFound {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    /// Failure detail (invalid request, encoding error, rejection)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HashFound {
    pub fn failed(level: Option<i64>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            hash: None,
            nonce: None,
            level,
            error: Some(error.into()),
        }
    }
}

impl From<SearchResult> for HashFound {
    fn from(result: SearchResult) -> Self {
        Self {
            success: result.success,
            hash: result.hash,
            nonce: result.nonce,
            level: result.level,
            error: None,
        }
    }
}

impl From<HashFound> for Event {
    fn from(outcome: HashFound) -> Self {
        Event::HashFound(outcome)
    }
}

/// Parse one JSON command.
pub fn parse_command(line: &str) -> serde_json::Result<Command> {
    serde_json::from_str(line)
}

/// The failed outcome owed to a line that is a `create-hash` but does not
/// decode as one (wrong field types, missing fields). `None` for anything
/// else, including lines that are not JSON at all.
pub fn reject_malformed(line: &str, err: &serde_json::Error) -> Option<HashFound> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    if value.get("type")?.as_str()? != "create-hash" {
        return None;
    }
    let level = value
        .get("payload")
        .and_then(|payload| payload.get("level"))
        .and_then(serde_json::Value::as_i64);
    Some(HashFound::failed(level, format!("malformed create-hash: {err}")))
}

/// Render one event as a single JSON line (without the newline).
pub fn render_event(event: &Event) -> serde_json::Result<String> {
    serde_json::to_string(event)
}
