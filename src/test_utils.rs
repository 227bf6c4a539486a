//! Test utilities for keyprobe.
//!
//! Provides scripted collaborators, test data factories, and filesystem
//! helpers for use across unit and integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use keyprobe::test_utils::*;
//!
//! let checker = ScriptedChecker::new().with_delay(Duration::from_millis(5));
//! let keys = make_key_list(1200);
//! let dir = TestDir::new();
//! dir.create_file("config.toml", &make_test_config_toml());
//! ```

use std::fs;
use std::future::Future;
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::models::{Credential, ProviderConfig, ValidationResult};
use crate::core::orchestrator::{RunPhase, RunReport};
use crate::core::protocol::{ClientCommand, Frame, ServerMessage};
use crate::core::provider::ProviderMeta;
use crate::core::store::ResultStore;
use crate::core::transport::{Connector, SessionLink};
use crate::core::validator::CheckCredential;
use crate::error::{KeyprobeError, Result};

/// Serializes tests that touch process environment variables.
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Close code injected by [`FlakyConnector`] (abnormal closure).
pub const CLOSE_ABNORMAL: u16 = 1006;

// =============================================================================
// Shared counters
// =============================================================================

/// A shared counter readable after the owner moved elsewhere.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    #[must_use]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Increment and return the new value.
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// A shared append-only list of values.
#[derive(Debug, Clone, Default)]
pub struct Recorder<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> Recorder<T> {
    pub fn push(&self, value: T) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

// =============================================================================
// Scripted checker
// =============================================================================

/// A [`CheckCredential`] whose outcome is picked by key prefix.
///
/// - `bad-` → invalid, HTTP 401
/// - `rl-` → rate limited, HTTP 429
/// - `zero-` → valid with a zero USD balance
/// - `err-` → network error
/// - anything else → valid
#[derive(Debug, Default)]
pub struct ScriptedChecker {
    delay: Option<Duration>,
    calls: Counter,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedChecker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every check.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Checks started so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Shared handle on the call count.
    #[must_use]
    pub fn call_counter(&self) -> Counter {
        self.calls.clone()
    }

    /// Most checks ever running at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// The result a key maps to.
    #[must_use]
    pub fn outcome(credential: &Credential) -> ValidationResult {
        let token = credential.token.as_str();
        if token.starts_with("bad-") {
            ValidationResult::invalid(credential, "authentication failed").with_status(401)
        } else if token.starts_with("rl-") {
            ValidationResult::invalid(credential, "rate limited").with_status(429)
        } else if token.starts_with("zero-") {
            let mut result = ValidationResult::valid(credential, None);
            result.balance = Some(0.0);
            result.currency = Some("USD".to_string());
            result
        } else if token.starts_with("err-") {
            ValidationResult::network_error(credential, "connection reset")
        } else {
            ValidationResult::valid(credential, None)
        }
    }
}

impl CheckCredential for ScriptedChecker {
    fn check(
        &self,
        credential: &Credential,
        _meta: &ProviderMeta,
        _config: &ProviderConfig,
    ) -> impl Future<Output = ValidationResult> + Send {
        async move {
            self.calls.bump();
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            match self.delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => tokio::task::yield_now().await,
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Self::outcome(credential)
        }
    }
}

// =============================================================================
// Flaky connector
// =============================================================================

const WRAP_BUFFER: usize = 256;

/// Wraps a [`Connector`] to inject connection failures.
///
/// It also records the size of every `start` sent through it.
pub struct FlakyConnector<K> {
    inner: K,
    refuse_first: usize,
    drop_sessions: usize,
    drop_after: usize,
    connects: Counter,
    starts: Recorder<usize>,
}

impl<K: Connector> FlakyConnector<K> {
    #[must_use]
    pub fn new(inner: K) -> Self {
        Self {
            inner,
            refuse_first: 0,
            drop_sessions: 0,
            drop_after: 0,
            connects: Counter::default(),
            starts: Recorder::default(),
        }
    }

    /// Fail the first `n` connection attempts.
    #[must_use]
    pub const fn refuse_first(mut self, n: usize) -> Self {
        self.refuse_first = n;
        self
    }

    /// For the first `sessions` sessions, close abnormally after `results` results.
    ///
    /// With `results == 0` the close follows the session's first frame, so
    /// the batch is cut before any result arrives.
    #[must_use]
    pub const fn drop_after_results(mut self, sessions: usize, results: usize) -> Self {
        self.drop_sessions = sessions;
        self.drop_after = results;
        self
    }

    /// For the first `sessions` sessions, accept `start` and then close abnormally.
    #[must_use]
    pub const fn close_after_start(self, sessions: usize) -> Self {
        self.drop_after_results(sessions, 0)
    }

    /// Connection attempts made, refused ones included.
    #[must_use]
    pub fn connect_counter(&self) -> Counter {
        self.connects.clone()
    }

    /// Token counts of every `start` command, in order.
    #[must_use]
    pub fn start_sizes(&self) -> Recorder<usize> {
        self.starts.clone()
    }
}

impl<K: Connector> Connector for FlakyConnector<K> {
    fn connect(&self) -> impl Future<Output = Result<SessionLink>> + Send {
        async move {
            let attempt = self.connects.bump();
            if attempt <= self.refuse_first {
                return Err(KeyprobeError::Connect(format!(
                    "connection refused (attempt {attempt})"
                )));
            }
            let link = self.inner.connect().await?;
            let drop_after = (attempt <= self.drop_sessions).then_some(self.drop_after);
            Ok(wrap_link(link, drop_after, self.starts.clone()))
        }
    }
}

fn wrap_link(link: SessionLink, drop_after: Option<usize>, starts: Recorder<usize>) -> SessionLink {
    let SessionLink {
        commands: inner_commands,
        frames: mut inner_frames,
    } = link;
    let (commands, mut command_rx) = mpsc::channel::<String>(WRAP_BUFFER);
    let (frame_tx, frames) = mpsc::channel::<Frame>(WRAP_BUFFER);

    tokio::spawn(async move {
        while let Some(text) = command_rx.recv().await {
            if let Ok(ClientCommand::Start { data }) = ClientCommand::decode(&text) {
                starts.push(data.tokens.len());
            }
            if inner_commands.send(text).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut results = 0;
        while let Some(frame) = inner_frames.recv().await {
            let is_result = matches!(
                &frame,
                Frame::Text(text) if matches!(ServerMessage::parse(text), Ok(ServerMessage::Result { .. }))
            );
            if frame_tx.send(frame).await.is_err() {
                return;
            }
            results += usize::from(is_result);
            if Some(results) == drop_after {
                let _ = frame_tx
                    .send(Frame::close(CLOSE_ABNORMAL, "connection reset"))
                    .await;
                return;
            }
        }
    });

    SessionLink { commands, frames }
}

// =============================================================================
// Test Data Factories
// =============================================================================

/// `n` distinct credentials with orders `0..n`.
#[must_use]
pub fn make_credentials(n: usize) -> Vec<Credential> {
    (0u64..)
        .zip(0..n)
        .map(|(order, i)| Credential::new(format!("sk-test-{i:05}"), order))
        .collect()
}

/// `n` distinct keys, one per line.
#[must_use]
pub fn make_key_list(n: usize) -> String {
    make_credentials(n)
        .into_iter()
        .map(|c| c.token)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A small finished run: one valid key with a USD balance and one invalid
/// key, out of three parsed.
#[must_use]
pub fn make_run_report(phase: RunPhase) -> RunReport {
    let mut results = ResultStore::new();
    let mut valid = ValidationResult::valid(&Credential::new("sk-proj-1234567890abcdef", 0), None);
    valid.balance = Some(7.5);
    valid.currency = Some("USD".to_string());
    results.insert(valid);
    results.insert(
        ValidationResult::invalid(&Credential::new("sk-bad-000000000000", 1), "invalid key")
            .with_status(401),
    );
    RunReport {
        phase,
        results,
        total: 3,
        error: None,
        elapsed: Duration::from_millis(1500),
    }
}

/// Sample config file content.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[general]
timeout_seconds = 10
concurrency = 4
batch_size = 200

[security]
allow_private_targets = true
randomize_headers = false

[regions]
eu = "http://proxy.eu.example:8080"

[[providers]]
key = "local"
display_name = "Local Mirror"
api_style = "openai"
default_base_url = "http://127.0.0.1:8000/v1"
default_model = "tiny"
fetch_models = "openai"
"#
    .to_string()
}

// =============================================================================
// Filesystem
// =============================================================================

/// Isolated temporary directory, removed on drop.
///
/// ```rust,ignore
/// let dir = TestDir::new();
/// dir.create_file("config.toml", "[general]\ntimeout_seconds = 30");
/// assert!(dir.file_exists("config.toml"));
/// ```
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file, creating parent directories as needed.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    #[must_use]
    pub fn file_exists(&self, name: &str) -> bool {
        self.inner.path().join(name).exists()
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Test Helpers
// =============================================================================

/// Strip ANSI escape codes from a string.
#[must_use]
pub fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}
