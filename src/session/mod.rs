//! Session controller
//!
//! A session is one worker context: it binds a context identifier, accepts
//! `create-hash` commands and answers each accepted one with exactly one
//! `hash-found` event.
//!
//! Each session runs as its own tokio task and owns all of its state. The
//! hashing loop runs on a blocking thread, so commands keep flowing while a
//! search is in progress.
//!
//! # Concurrent requests
//!
//! Only one search runs at a time. A `create-hash` that arrives while a
//! search is running is queued (FIFO) up to `max_pending`; beyond that it is
//! rejected at once with a failed `hash-found` carrying an error.
//!
//! # Teardown
//!
//! - Dropping every [`SessionHandle`] drains: running and queued searches
//!   complete and report, then the event channel closes.
//! - [`SessionHandle::abort`] stops the running search, discards the queue
//!   and closes the event channel without reporting them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use kneader_core::{
    ClockSeed, DEFAULT_CHECK_INTERVAL, DEFAULT_TIME_BUDGET_SECS, DifficultySpec, Encoder, Kneader,
    MichelsonInt, SearchControl, SearchError, SearchRequest, SearchResult, SeedStrategy,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::protocol::{Command, CreateHash, Event, HashFound};

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Time budget per search; `None` searches until a match
    pub time_budget: Option<Duration>,
    /// Searches allowed to wait behind the running one
    pub max_pending: usize,
    /// Nonces hashed between clock checks
    pub check_interval: u64,
    /// Capacity of the command channel
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            time_budget: Some(Duration::from_secs(DEFAULT_TIME_BUDGET_SECS)),
            max_pending: 16,
            check_interval: DEFAULT_CHECK_INTERVAL,
            command_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No context identifier bound and no search running
    Uninitialized,
    /// Bound, no search running
    Idle,
    Searching,
}

/// Snapshot published after every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub context_id: Option<String>,
    /// Queued searches, not counting the running one
    pub pending: usize,
    /// `hash-found` events emitted so far, counting searches that finished
    /// as well as requests rejected as invalid, malformed or busy
    pub completed: u64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Uninitialized,
            context_id: None,
            pending: 0,
            completed: 0,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session closed")]
    Closed,
}

/// State bound by `init` commands.
#[derive(Debug, Default)]
pub struct Session {
    context_id: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind (or rebind) the context identifier.
    pub fn bind(&mut self, context_id: String) {
        self.context_id = Some(context_id);
    }

    pub fn context_id(&self) -> Option<&str> {
        self.context_id.as_deref()
    }

    pub fn is_bound(&self) -> bool {
        self.context_id.is_some()
    }
}

enum Request {
    Command(Command),
    Reject(HashFound),
    Abort,
}

/// Host side of a session.
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    /// Deliver a command. Commands are handled in the order sent.
    pub async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.requests
            .send(Request::Command(command))
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn init(&self, context_id: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::Init(context_id.into())).await
    }

    pub async fn create_hash(
        &self,
        level: i64,
        difficulty: DifficultySpec,
    ) -> Result<(), SessionError> {
        self.send(Command::CreateHash(CreateHash { level, difficulty }))
            .await
    }

    /// Answer a request the host could not decode, in order with the
    /// session's other outcomes.
    pub async fn reject(&self, outcome: HashFound) -> Result<(), SessionError> {
        self.requests
            .send(Request::Reject(outcome))
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Stop the running search, drop queued ones and end the session.
    pub async fn abort(&self) -> Result<(), SessionError> {
        self.requests
            .send(Request::Abort)
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}

/// Spawn a session with the production encoder and clock-seeded nonces.
///
/// Must be called from within a tokio runtime.
pub fn spawn(config: SessionConfig) -> (SessionHandle, mpsc::UnboundedReceiver<Event>) {
    spawn_with(config, Kneader::<MichelsonInt>::new(), ClockSeed)
}

/// Spawn a session with an explicit engine and seed strategy.
pub fn spawn_with<E, S>(
    config: SessionConfig,
    kneader: Kneader<E>,
    seed: S,
) -> (SessionHandle, mpsc::UnboundedReceiver<Event>)
where
    E: Encoder + Send + Sync + 'static,
    S: SeedStrategy + Send + 'static,
{
    let (request_tx, request_rx) = mpsc::channel(config.command_buffer.max(1));
    // One event per create-hash command; the host paces them.
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(SessionStatus::default());

    let worker = Worker {
        session: Session::new(),
        kneader: Arc::new(kneader.with_check_interval(config.check_interval)),
        config,
        seed,
        requests: request_rx,
        events: event_tx,
        status: status_tx,
        pending: VecDeque::new(),
        in_flight: None,
        completed: 0,
    };
    tokio::spawn(worker.run().instrument(info_span!("session")));

    let handle = SessionHandle {
        requests: request_tx,
        status: status_rx,
    };
    (handle, event_rx)
}

type SearchOutput = Result<SearchResult, SearchError>;

struct InFlight {
    level: i64,
    control: Arc<SearchControl>,
    task: JoinHandle<SearchOutput>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        // A search nobody waits for must not keep a blocking thread busy.
        self.control.stop();
    }
}

struct Worker<E, S> {
    session: Session,
    config: SessionConfig,
    kneader: Arc<Kneader<E>>,
    seed: S,
    requests: mpsc::Receiver<Request>,
    events: mpsc::UnboundedSender<Event>,
    status: watch::Sender<SessionStatus>,
    pending: VecDeque<SearchRequest>,
    in_flight: Option<InFlight>,
    completed: u64,
}

impl<E, S> Worker<E, S>
where
    E: Encoder + Send + Sync + 'static,
    S: SeedStrategy,
{
    async fn run(mut self) {
        debug!("Session started");

        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    match request {
                        Some(Request::Command(command)) => self.handle_command(command),
                        Some(Request::Reject(outcome)) => {
                            warn!(level = ?outcome.level, error = ?outcome.error, "Rejecting undecodable request");
                            self.emit(outcome);
                        }
                        Some(Request::Abort) => {
                            self.abort().await;
                            return;
                        }
                        None => {
                            debug!("All session handles dropped, draining");
                            break;
                        }
                    }
                }

                joined = wait_for(&mut self.in_flight) => {
                    self.finish(joined);
                }
            }
        }

        while self.in_flight.is_some() {
            let joined = wait_for(&mut self.in_flight).await;
            self.finish(joined);
        }
        debug!(completed = self.completed, "Session closed");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Init(context_id) => {
                info!(context = %context_id, "Session bound");
                self.session.bind(context_id);
            }
            Command::CreateHash(CreateHash { level, difficulty }) => {
                self.accept(level, difficulty);
            }
        }
        self.publish();
    }

    fn accept(&mut self, level: i64, difficulty: DifficultySpec) {
        let request = match SearchRequest::from_spec(level, difficulty) {
            Ok(request) => request,
            Err(err) => {
                warn!(level, error = %err, "Rejecting create-hash");
                self.emit(HashFound::failed(Some(level), err.to_string()));
                return;
            }
        };

        if self.in_flight.is_none() {
            self.start(request);
        } else if self.pending.len() < self.config.max_pending {
            self.pending.push_back(request);
            debug!(level, pending = self.pending.len(), "Search queued");
        } else {
            warn!(level, pending = self.pending.len(), "Session busy, rejecting create-hash");
            self.emit(HashFound::failed(
                Some(level),
                format!("session busy: {} searches pending", self.pending.len()),
            ));
        }
    }

    fn start(&mut self, request: SearchRequest) {
        let level = request.level;
        let start_nonce = self.seed.start_nonce(level);
        let budget = self.config.time_budget;
        let control = Arc::new(SearchControl::new());

        info!(
            level,
            start_nonce,
            sub_bytes = request.difficulty.sub_bytes(),
            context = self.session.context_id().unwrap_or("-"),
            "Starting kneading"
        );

        let kneader = Arc::clone(&self.kneader);
        let task_control = Arc::clone(&control);
        let task = tokio::task::spawn_blocking(move || {
            kneader.search(&request, start_nonce, budget, &task_control)
        });

        self.in_flight = Some(InFlight {
            level,
            control,
            task,
        });
    }

    fn finish(&mut self, joined: Result<SearchOutput, JoinError>) {
        let Some(search) = self.in_flight.take() else {
            return;
        };

        let outcome = match joined {
            Ok(Ok(result)) => {
                info!(
                    level = search.level,
                    success = result.success,
                    nonce = ?result.nonce,
                    attempts = result.attempts,
                    "Kneading over"
                );
                HashFound::from(result)
            }
            Ok(Err(err)) => {
                warn!(level = search.level, error = %err, "Search failed");
                HashFound::failed(Some(search.level), err.to_string())
            }
            Err(err) => {
                warn!(level = search.level, error = %err, "Search task failed");
                HashFound::failed(Some(search.level), format!("search task failed: {err}"))
            }
        };

        if let Some(next) = self.pending.pop_front() {
            self.start(next);
        }
        self.emit(outcome);
    }

    async fn abort(&mut self) {
        let dropped = self.pending.len();
        self.pending.clear();

        if let Some(mut search) = self.in_flight.take() {
            search.control.stop();
            let _ = (&mut search.task).await;
        }

        self.publish();
        info!(dropped, "Session aborted");
    }

    fn emit(&mut self, outcome: HashFound) {
        self.completed += 1;
        self.publish();
        if self.events.send(Event::from(outcome)).is_err() {
            debug!("Event receiver dropped");
        }
    }

    fn publish(&self) {
        let state = if self.in_flight.is_some() {
            SessionState::Searching
        } else if self.session.is_bound() {
            SessionState::Idle
        } else {
            SessionState::Uninitialized
        };

        self.status.send_replace(SessionStatus {
            state,
            context_id: self.session.context_id().map(str::to_owned),
            pending: self.pending.len(),
            completed: self.completed,
        });
    }
}

/// Completes with the running search's output; pends forever when idle.
async fn wait_for(in_flight: &mut Option<InFlight>) -> Result<SearchOutput, JoinError> {
    match in_flight {
        Some(search) => (&mut search.task).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kneader_core::{EncodeError, FixedSeed};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(20);

    fn spec(length: i64, sub_bytes: &str) -> DifficultySpec {
        DifficultySpec {
            length,
            sub_bytes: sub_bytes.to_string(),
        }
    }

    /// Practically unsatisfiable: the full 32-byte digest must match.
    fn unreachable() -> DifficultySpec {
        spec(32, &"ab".repeat(32))
    }

    fn config(time_budget: Option<Duration>, max_pending: usize) -> SessionConfig {
        SessionConfig {
            time_budget,
            max_pending,
            ..SessionConfig::default()
        }
    }

    fn fixed_session(
        config: SessionConfig,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<Event>) {
        spawn_with(config, Kneader::new(), FixedSeed(1000))
    }

    async fn next_outcome(events: &mut mpsc::UnboundedReceiver<Event>) -> HashFound {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for hash-found")
            .expect("session closed");
        let Event::HashFound(outcome) = event;
        outcome
    }

    async fn wait_until(
        handle: &SessionHandle,
        condition: impl FnMut(&SessionStatus) -> bool,
    ) -> SessionStatus {
        let mut status = handle.watch_status();
        let seen = timeout(WAIT, status.wait_for(condition))
            .await
            .expect("timed out waiting for status")
            .expect("status channel closed");
        seen.clone()
    }

    #[tokio::test]
    async fn init_then_create_hash_round_trip() {
        let (handle, mut events) = fixed_session(SessionConfig::default());

        handle.init("KT1abc").await.unwrap();
        handle.create_hash(7, spec(1, "00")).await.unwrap();

        let outcome = next_outcome(&mut events).await;
        assert!(outcome.success);
        assert_eq!(outcome.level, Some(7));
        assert_eq!(outcome.error, None);

        let nonce = outcome.nonce.unwrap();
        let hash = outcome.hash.unwrap();
        assert_eq!(nonce, 1375);
        assert!(hash.starts_with("00"));
        assert_eq!(Kneader::new().hash_hex(7, nonce).unwrap(), hash);

        let status = wait_until(&handle, |s| s.completed == 1).await;
        assert_eq!(status.state, SessionState::Idle);
        assert_eq!(status.context_id.as_deref(), Some("KT1abc"));
    }

    #[tokio::test]
    async fn create_hash_without_init() {
        let (handle, mut events) = fixed_session(SessionConfig::default());
        assert_eq!(handle.status().state, SessionState::Uninitialized);

        handle.create_hash(7, spec(0, "")).await.unwrap();

        let outcome = next_outcome(&mut events).await;
        assert!(outcome.success);
        assert_eq!(outcome.nonce, Some(1000));

        let status = wait_until(&handle, |s| s.completed == 1).await;
        assert_eq!(status.state, SessionState::Uninitialized);
        assert_eq!(status.context_id, None);
    }

    #[tokio::test]
    async fn invalid_difficulty_gets_an_answer() {
        let (handle, mut events) = fixed_session(SessionConfig::default());

        handle.create_hash(4, spec(2, "00")).await.unwrap();

        let outcome = next_outcome(&mut events).await;
        assert!(!outcome.success);
        assert_eq!(outcome.level, Some(4));
        assert!(outcome.error.unwrap().contains("invalid difficulty"));
    }

    #[tokio::test]
    async fn negative_difficulty_length_gets_an_answer() {
        let (handle, mut events) = fixed_session(SessionConfig::default());

        handle.create_hash(7, spec(-1, "")).await.unwrap();

        let outcome = next_outcome(&mut events).await;
        assert!(!outcome.success);
        assert_eq!(outcome.level, Some(7));
        assert!(outcome.error.unwrap().contains("negative"));
    }

    #[tokio::test]
    async fn host_rejections_share_the_event_stream() {
        let (handle, mut events) = fixed_session(SessionConfig::default());

        handle.reject(HashFound::failed(Some(2), "malformed")).await.unwrap();

        let outcome = next_outcome(&mut events).await;
        assert_eq!(outcome, HashFound::failed(Some(2), "malformed"));
        let status = wait_until(&handle, |s| s.completed == 1).await;
        assert_eq!(status.state, SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn expired_budget_reports_failure() {
        let (handle, mut events) = fixed_session(config(Some(Duration::from_millis(100)), 4));

        handle.create_hash(3, unreachable()).await.unwrap();

        let outcome = next_outcome(&mut events).await;
        assert!(!outcome.success);
        assert_eq!(outcome.hash, None);
        assert_eq!(outcome.nonce, None);
        assert_eq!(outcome.error, None);
    }

    #[tokio::test]
    async fn busy_session_queues_then_rejects() {
        let (handle, mut events) = fixed_session(config(Some(Duration::from_millis(300)), 1));

        handle.create_hash(1, unreachable()).await.unwrap();
        handle.create_hash(2, spec(0, "")).await.unwrap();
        handle.create_hash(3, spec(0, "")).await.unwrap();

        // Third request overflows the queue and is answered immediately.
        let rejected = next_outcome(&mut events).await;
        assert!(!rejected.success);
        assert_eq!(rejected.level, Some(3));
        assert!(rejected.error.unwrap().contains("busy"));

        let first = next_outcome(&mut events).await;
        assert!(!first.success);
        assert_eq!(first.error, None);

        let second = next_outcome(&mut events).await;
        assert!(second.success);
        assert_eq!(second.level, Some(2));

        let status = wait_until(&handle, |s| s.completed == 3).await;
        assert_eq!(status.pending, 0);
    }

    #[tokio::test]
    async fn init_while_searching_keeps_search() {
        let (handle, mut events) = fixed_session(config(Some(Duration::from_millis(500)), 4));

        handle.init("KT1old").await.unwrap();
        handle.create_hash(5, unreachable()).await.unwrap();
        wait_until(&handle, |s| s.state == SessionState::Searching).await;

        handle.init("KT1new").await.unwrap();
        let status = wait_until(&handle, |s| s.context_id.as_deref() == Some("KT1new")).await;
        assert_eq!(status.state, SessionState::Searching);

        let outcome = next_outcome(&mut events).await;
        assert!(!outcome.success);
        assert_eq!(handle.status().context_id.as_deref(), Some("KT1new"));
    }

    #[tokio::test]
    async fn abort_stops_without_reporting() {
        let (handle, mut events) = fixed_session(config(None, 4));

        handle.create_hash(1, unreachable()).await.unwrap();
        handle.create_hash(2, spec(0, "")).await.unwrap();
        wait_until(&handle, |s| s.state == SessionState::Searching && s.pending == 1).await;

        handle.abort().await.unwrap();

        let closed = timeout(WAIT, events.recv()).await.expect("abort did not stop the search");
        assert!(closed.is_none());
        assert_eq!(handle.init("KT1late").await, Err(SessionError::Closed));
    }

    #[tokio::test]
    async fn dropping_handles_drains_queue() {
        let (handle, mut events) = fixed_session(config(Some(Duration::from_secs(30)), 4));

        handle.create_hash(7, spec(1, "00")).await.unwrap();
        handle.create_hash(8, spec(0, "")).await.unwrap();
        drop(handle);

        let first = next_outcome(&mut events).await;
        assert_eq!(first.level, Some(7));
        let second = next_outcome(&mut events).await;
        assert_eq!(second.level, Some(8));

        let closed = timeout(WAIT, events.recv()).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn encoding_failure_is_reported() {
        let failing = |secret: i128, _out: &mut Vec<u8>| -> Result<(), EncodeError> {
            Err(EncodeError::Unrepresentable(secret))
        };
        let (handle, mut events) =
            spawn_with(SessionConfig::default(), Kneader::with_encoder(failing), FixedSeed(2));

        handle.create_hash(3, spec(1, "00")).await.unwrap();

        let outcome = next_outcome(&mut events).await;
        assert!(!outcome.success);
        assert_eq!(outcome.level, Some(3));
        assert!(outcome.error.unwrap().contains("encoding failed"));
    }

    #[tokio::test]
    async fn panicking_search_is_reported() {
        let exploding = |_secret: i128, _out: &mut Vec<u8>| -> Result<(), EncodeError> {
            panic!("encoder exploded")
        };
        let (handle, mut events) =
            spawn_with(SessionConfig::default(), Kneader::with_encoder(exploding), FixedSeed(0));

        handle.create_hash(9, spec(1, "00")).await.unwrap();

        let outcome = next_outcome(&mut events).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("search task failed"));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let (first, _first_events) = fixed_session(SessionConfig::default());
        let (second, _second_events) = fixed_session(SessionConfig::default());

        first.init("KT1first").await.unwrap();
        second.init("KT1second").await.unwrap();

        let a = wait_until(&first, |s| s.context_id.is_some()).await;
        let b = wait_until(&second, |s| s.context_id.is_some()).await;
        assert_eq!(a.context_id.as_deref(), Some("KT1first"));
        assert_eq!(b.context_id.as_deref(), Some("KT1second"));
    }
}
