use kneader_core::{
    BatchOutcome, Difficulty, Kneader, SearchError, SearchRequest, derive_start_nonce,
};
use wasm_bindgen::prelude::*;

/// Hash a single `level * nonce` secret. Returns `undefined` when the secret
/// cannot be encoded.
#[wasm_bindgen]
pub fn hash_once(level: f64, nonce: f64) -> Option<String> {
    Kneader::new().hash_hex(level as i64, nonce as u64).ok()
}

/// Search state for Web Worker usage.
///
/// Browsers have no monotonic clock inside WASM, so the worker script owns
/// the time budget: it calls [`KneaderWorker::search_batch`] repeatedly and
/// gives up once its own deadline passes.
#[wasm_bindgen]
pub struct KneaderWorker {
    kneader: Kneader,
    request: SearchRequest,
}

impl KneaderWorker {
    pub fn try_new(level: i64, length: usize, sub_bytes: &str) -> Result<Self, SearchError> {
        let difficulty = Difficulty::new(length, sub_bytes)?;
        Ok(Self {
            kneader: Kneader::new(),
            request: SearchRequest::new(level, difficulty),
        })
    }

    pub fn level(&self) -> i64 {
        self.request.level
    }
}

#[wasm_bindgen]
impl KneaderWorker {
    #[wasm_bindgen(constructor)]
    pub fn new(level: f64, length: u32, sub_bytes: &str) -> Result<KneaderWorker, JsError> {
        Self::try_new(level as i64, length as usize, sub_bytes)
            .map_err(|err| JsError::new(&err.to_string()))
    }

    /// First nonce for a search started at `now_ms` (e.g. `Date.now()`).
    pub fn start_nonce(&self, now_ms: f64) -> f64 {
        derive_start_nonce(self.request.level, now_ms as u64) as f64
    }

    /// Hash a batch of consecutive nonces. Returns JSON string:
    /// `{"found":true,"hash":"...","nonce":N,"level":L,"count":M}`,
    /// `{"found":false,"next_nonce":N,"count":M}` or
    /// `{"found":false,"error":"...","count":0}`
    ///
    /// - `start_nonce`: first nonce to try (as f64, safe up to 2^53)
    /// - `batch_size`: number of nonces to try in this batch
    pub fn search_batch(&self, start_nonce: f64, batch_size: u32) -> String {
        let outcome =
            self.kneader
                .search_batch(&self.request, start_nonce as u64, u64::from(batch_size));

        match outcome {
            Ok(BatchOutcome::Found { hash, nonce, tried }) => format!(
                r#"{{"found":true,"hash":"{}","nonce":{},"level":{},"count":{}}}"#,
                hash, nonce, self.request.level, tried
            ),
            Ok(BatchOutcome::Exhausted { next_nonce }) => format!(
                r#"{{"found":false,"next_nonce":{},"count":{}}}"#,
                next_nonce, batch_size
            ),
            Err(err) => error_json(&err.to_string()),
        }
    }

    /// Hash `level * nonce` for this worker's level.
    pub fn hash_nonce(&self, nonce: f64) -> Option<String> {
        self.kneader.hash_hex(self.request.level, nonce as u64).ok()
    }
}

/// Failure record for a batch; the message is JSON-escaped.
fn error_json(message: &str) -> String {
    serde_json::json!({ "found": false, "error": message, "count": 0 }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_reports_known_nonce() {
        let worker = KneaderWorker::try_new(7, 1, "00").unwrap();
        assert_eq!(
            worker.search_batch(1000.0, 1000),
            r#"{"found":true,"hash":"00baffd9d8ce9cba67da30dfde549361c20e5f459a08371bd37f672174b7e38e","nonce":1375,"level":7,"count":376}"#
        );
    }

    #[test]
    fn batch_reports_next_nonce() {
        let worker = KneaderWorker::try_new(7, 1, "00").unwrap();
        assert_eq!(
            worker.search_batch(1000.0, 100),
            r#"{"found":false,"next_nonce":1100,"count":100}"#
        );
        // the worker script resumes where the last batch stopped
        assert!(worker.search_batch(1100.0, 1000).starts_with(r#"{"found":true"#));
    }

    #[test]
    fn batch_reports_exhaustion() {
        let worker = KneaderWorker::try_new(1, 32, &"ab".repeat(32)).unwrap();
        let outcome: serde_json::Value =
            serde_json::from_str(&worker.search_batch(u64::MAX as f64, 10)).unwrap();
        assert_eq!(outcome["found"], false);
        assert_eq!(outcome["error"], "nonce space exhausted");
        assert_eq!(outcome["count"], 0);
    }

    #[test]
    fn error_messages_are_escaped() {
        let message = r#"sub_bytes is not a hex string: "zz\""#;
        let outcome: serde_json::Value = serde_json::from_str(&error_json(message)).unwrap();
        assert_eq!(outcome["error"], message);
    }

    #[test]
    fn rejects_bad_difficulty() {
        assert!(KneaderWorker::try_new(7, 2, "00").is_err());
        assert!(KneaderWorker::try_new(7, 1, "zz").is_err());
    }

    #[test]
    fn start_nonce_is_in_range() {
        let worker = KneaderWorker::try_new(3, 0, "").unwrap();
        let nonce = worker.start_nonce(1_700_000_000_000.0);
        assert_eq!(nonce, worker.start_nonce(1_700_000_000_000.0));
        assert!((0.0..kneader_core::NONCE_RANGE as f64).contains(&nonce));
        assert_eq!(worker.level(), 3);
    }

    #[test]
    fn hash_helpers_agree() {
        let worker = KneaderWorker::try_new(7, 0, "").unwrap();
        let hash = worker.hash_nonce(1375.0).unwrap();
        assert_eq!(hash_once(7.0, 1375.0), Some(hash));
    }
}
