//! Run orchestration: batching, session lifecycle, pause/resume/stop, and
//! bounded reconnects.
//!
//! A run lives in one spawned task that owns all mutable run state (queue,
//! in-flight batch, write buffer, result store). The caller talks to it
//! through a [`RunHandle`]: control commands go in, [`RunEvent`]s come out.
//!
//! Batches are strictly sequential. The in-flight batch is tracked by
//! `order`; a result removes its credential, so whatever is left when a
//! session dies is exactly what must be re-submitted.

use std::collections::{BTreeMap, VecDeque};
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::input::parse_credentials;
use super::models::{Credential, ProviderConfig, ValidationResult};
use super::protocol::{ClientCommand, Frame, ServerMessage, is_abnormal_close};
use super::store::{CategoryCounts, ResultStore};
use super::transport::{Connector, SessionLink};
use crate::error::{KeyprobeError, Result};
use crate::storage::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_CREDENTIALS, MAX_CONCURRENCY, MIN_CONCURRENCY,
};

// =============================================================================
// Settings
// =============================================================================

/// Tunables for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Credentials per session.
    pub batch_size: usize,
    /// Parsed keys accepted per run, repeats included.
    pub max_credentials: usize,
    /// Reconnects per batch before the run is aborted.
    pub max_reconnects: u32,
    /// Reconnect `n` waits `n * reconnect_step`.
    pub reconnect_step: Duration,
    /// Write buffer flush period.
    pub flush_interval: Duration,
    /// Write buffer flush size.
    pub flush_threshold: usize,
    /// Pause between a finished batch and the next one.
    pub batch_spacing: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_credentials: DEFAULT_MAX_CREDENTIALS,
            max_reconnects: 3,
            reconnect_step: Duration::from_secs(1),
            flush_interval: Duration::from_millis(100),
            flush_threshold: 50,
            batch_spacing: Duration::from_millis(100),
        }
    }
}

// =============================================================================
// Public run types
// =============================================================================

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Running,
    Paused,
    Completed,
    Stopped,
    Failed,
}

impl RunPhase {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

/// Progress notifications from a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Newly stored results, in arrival order.
    Results(Vec<ValidationResult>),
    /// Human-readable progress or warning.
    Status(String),
    /// Phase change.
    Phase(RunPhase),
}

/// Final state of a run.
#[derive(Debug)]
pub struct RunReport {
    pub phase: RunPhase,
    pub results: ResultStore,
    /// Keys parsed from the input, repeats included.
    pub total: usize,
    /// Why the run failed, when `phase` is `Failed`.
    pub error: Option<KeyprobeError>,
    pub elapsed: Duration,
}

impl RunReport {
    #[must_use]
    pub fn counts(&self) -> CategoryCounts {
        self.results.counts()
    }
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Pause,
    Resume,
    Stop,
}

/// Caller side of a running run.
#[derive(Debug)]
pub struct RunHandle {
    control: mpsc::UnboundedSender<Control>,
    events: Option<mpsc::UnboundedReceiver<RunEvent>>,
    task: JoinHandle<RunReport>,
    total: usize,
}

impl RunHandle {
    /// Keys parsed from the input, repeats included.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Pause after flushing; the in-flight remainder goes back to the queue.
    pub fn pause(&self) {
        let _ = self.control.send(Control::Pause);
    }

    pub fn resume(&self) {
        let _ = self.control.send(Control::Resume);
    }

    /// Stop for good. Queued and in-flight keys are discarded.
    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    /// Take the event stream. Returns `None` after the first call.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<RunEvent>> {
        self.events.take()
    }

    /// Wait for the run to reach a terminal phase.
    ///
    /// # Errors
    ///
    /// Returns error if the run task panicked or was cancelled.
    pub async fn finish(self) -> Result<RunReport> {
        self.task
            .await
            .map_err(|e| KeyprobeError::Other(anyhow::anyhow!("run task failed: {e}")))
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Starts runs against a session [`Connector`].
pub struct TaskOrchestrator<K> {
    connector: Arc<K>,
    settings: OrchestratorSettings,
}

impl<K: Connector> TaskOrchestrator<K> {
    #[must_use]
    pub const fn new(connector: Arc<K>, settings: OrchestratorSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// Parse `raw_input` and start a run in the background.
    ///
    /// Nothing touches the network before this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `EmptyInput`, `TooManyCredentials`, or `InvalidConcurrency`.
    pub fn start(
        &self,
        raw_input: &str,
        provider_config: ProviderConfig,
        concurrency: usize,
    ) -> Result<RunHandle> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(KeyprobeError::InvalidConcurrency {
                value: concurrency,
                min: MIN_CONCURRENCY,
                max: MAX_CONCURRENCY,
            });
        }
        let parsed = parse_credentials(raw_input, self.settings.max_credentials)?;
        let total = parsed.total();

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tracing::info!(
            provider = %provider_config.provider,
            total,
            unique = parsed.unique.len(),
            concurrency,
            batch_size = self.settings.batch_size,
            "Starting run"
        );

        let run = Run {
            connector: Arc::clone(&self.connector),
            settings: self.settings.clone(),
            config: provider_config,
            concurrency,
            queue: parsed.unique.into(),
            in_flight: BTreeMap::new(),
            link: None,
            buffer: parsed.duplicates,
            store: ResultStore::new(),
            events: event_tx,
            phase: RunPhase::Running,
            failures: 0,
            wake: None,
            batches: 0,
            total,
            error: None,
        };
        let task = tokio::spawn(run.drive(control_rx));

        Ok(RunHandle {
            control: control_tx,
            events: Some(event_rx),
            task,
            total,
        })
    }
}

// =============================================================================
// Run task
// =============================================================================

enum Step {
    Control(Option<Control>),
    Frame(Option<Frame>),
    Flush,
    Wake,
}

struct Run<K> {
    connector: Arc<K>,
    settings: OrchestratorSettings,
    config: ProviderConfig,
    concurrency: usize,
    queue: VecDeque<Credential>,
    /// Unresolved members of the current batch, keyed by `order`.
    in_flight: BTreeMap<u64, Credential>,
    link: Option<SessionLink>,
    buffer: Vec<ValidationResult>,
    store: ResultStore,
    events: mpsc::UnboundedSender<RunEvent>,
    phase: RunPhase,
    /// Consecutive session failures for the current batch.
    failures: u32,
    /// When to open the next session (after batch spacing or reconnect backoff).
    wake: Option<Instant>,
    batches: usize,
    total: usize,
    error: Option<KeyprobeError>,
}

async fn next_frame(link: &mut Option<SessionLink>) -> Option<Frame> {
    match link {
        Some(link) => link.frames.recv().await,
        None => std::future::pending().await,
    }
}

impl<K: Connector> Run<K> {
    async fn drive(mut self, mut control: mpsc::UnboundedReceiver<Control>) -> RunReport {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.settings.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut control_open = true;

        self.emit(RunEvent::Phase(RunPhase::Running));
        self.flush();
        self.open_batch().await;

        while !self.phase.is_terminal() {
            let wake_at = self.wake.unwrap_or_else(Instant::now);
            let step = tokio::select! {
                command = control.recv(), if control_open => Step::Control(command),
                frame = next_frame(&mut self.link) => Step::Frame(frame),
                _ = ticker.tick() => Step::Flush,
                () = tokio::time::sleep_until(wake_at), if self.wake.is_some() => Step::Wake,
            };

            match step {
                Step::Control(Some(Control::Pause)) => self.pause().await,
                Step::Control(Some(Control::Resume)) => self.resume().await,
                Step::Control(Some(Control::Stop)) => self.stop().await,
                Step::Control(None) => control_open = false,
                Step::Frame(frame) => self.on_frame(frame).await,
                Step::Flush => self.flush(),
                Step::Wake => {
                    self.wake = None;
                    self.open_batch().await;
                }
            }
        }

        tracing::info!(
            phase = ?self.phase,
            stored = self.store.len(),
            total = self.total,
            "Run finished"
        );
        RunReport {
            phase: self.phase,
            results: self.store,
            total: self.total,
            error: self.error,
            elapsed: started.elapsed(),
        }
    }

    fn emit(&self, event: RunEvent) {
        // Nobody listening is fine; the report still has everything.
        let _ = self.events.send(event);
    }

    fn set_phase(&mut self, phase: RunPhase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "Run phase change");
        }
        self.phase = phase;
        self.emit(RunEvent::Phase(phase));
    }

    fn status(&self, message: String) {
        tracing::info!(%message, "Run status");
        self.emit(RunEvent::Status(message));
    }

    /// Move buffered results into the store and announce them.
    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let fresh: Vec<ValidationResult> = mem::take(&mut self.buffer)
            .into_iter()
            .filter(|result| self.store.insert(result.clone()))
            .collect();
        if !fresh.is_empty() {
            self.emit(RunEvent::Results(fresh));
        }
    }

    /// Fill the in-flight batch if needed and open a session for it.
    async fn open_batch(&mut self) {
        if self.phase != RunPhase::Running || self.link.is_some() {
            return;
        }

        if self.in_flight.is_empty() {
            let take = self.settings.batch_size.max(1).min(self.queue.len());
            for credential in self.queue.drain(..take) {
                self.in_flight.insert(credential.order, credential);
            }
            if self.in_flight.is_empty() {
                self.complete();
                return;
            }
            self.failures = 0;
            self.batches += 1;
            self.status(format!(
                "batch {}: {} keys ({} queued)",
                self.batches,
                self.in_flight.len(),
                self.queue.len()
            ));
        }

        let link = match self.connector.connect().await {
            Ok(link) => link,
            Err(e) => {
                self.on_disruption(&e.to_string());
                return;
            }
        };

        let start = ClientCommand::start(
            self.in_flight.values().cloned().collect(),
            self.config.clone(),
            self.concurrency,
        );
        if link.commands.send(start.to_text()).await.is_err() {
            self.on_disruption("session closed before start");
            return;
        }
        tracing::debug!(
            batch = self.batches,
            keys = self.in_flight.len(),
            attempt = self.failures,
            "Session opened"
        );
        self.link = Some(link);
    }

    async fn on_frame(&mut self, frame: Option<Frame>) {
        match frame {
            None => self.on_disruption("session ended without closing"),
            Some(Frame::Close { code, reason }) => {
                self.link = None;
                if is_abnormal_close(code) {
                    self.on_disruption(&format!("session closed ({code} {reason})"));
                } else {
                    self.batch_done();
                }
            }
            Some(Frame::Text(text)) => match ServerMessage::parse(&text) {
                Ok(ServerMessage::Result { data }) => self.on_result(data),
                Ok(ServerMessage::Status { message }) => {
                    tracing::debug!(%message, "Session status");
                }
                Ok(ServerMessage::Done { .. }) => {
                    self.link = None;
                    self.batch_done();
                }
                Ok(ServerMessage::Error { message }) => {
                    self.fail(KeyprobeError::Session(message)).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring unreadable session frame");
                }
            },
        }
    }

    fn on_result(&mut self, result: ValidationResult) {
        if self.in_flight.remove(&result.order).is_none() {
            tracing::debug!(order = result.order, "Ignoring result outside the batch");
            return;
        }
        self.failures = 0;
        self.buffer.push(result);
        if self.buffer.len() >= self.settings.flush_threshold {
            self.flush();
        }
    }

    /// The current batch finished; schedule the next one.
    fn batch_done(&mut self) {
        self.failures = 0;
        if !self.in_flight.is_empty() {
            // Completed without reporting everything; retry the rest.
            tracing::warn!(missing = self.in_flight.len(), "Batch closed with keys unresolved");
            self.requeue_in_flight();
        }
        self.flush();
        self.wake = Some(Instant::now() + self.settings.batch_spacing);
    }

    fn on_disruption(&mut self, reason: &str) {
        self.link = None;
        if self.phase != RunPhase::Running {
            return;
        }

        self.failures += 1;
        if self.failures > self.settings.max_reconnects {
            tracing::error!(reason, attempts = self.settings.max_reconnects, "Reconnects exhausted");
            self.abort(KeyprobeError::ReconnectExhausted {
                attempts: self.settings.max_reconnects,
            });
            return;
        }

        let delay = self.settings.reconnect_step * self.failures;
        self.status(format!(
            "connection lost: {reason}; reconnecting in {}s (attempt {}/{})",
            delay.as_secs_f64(),
            self.failures,
            self.settings.max_reconnects
        ));
        self.wake = Some(Instant::now() + delay);
    }

    /// Put unresolved in-flight keys back at the front of the queue.
    fn requeue_in_flight(&mut self) {
        let remainder = mem::take(&mut self.in_flight);
        for (_, credential) in remainder.into_iter().rev() {
            self.queue.push_front(credential);
        }
    }

    /// Ask the session to stop and forget it.
    async fn close_session(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.commands.send(ClientCommand::Stop.to_text()).await;
        }
    }

    async fn pause(&mut self) {
        if self.phase != RunPhase::Running {
            return;
        }
        self.flush();
        self.close_session().await;
        self.requeue_in_flight();
        self.wake = None;
        self.status(format!(
            "paused: {} of {} done, {} queued",
            self.store.len(),
            self.total,
            self.queue.len()
        ));
        self.set_phase(RunPhase::Paused);
    }

    async fn resume(&mut self) {
        if self.phase != RunPhase::Paused {
            return;
        }
        self.failures = 0;
        self.set_phase(RunPhase::Running);
        self.open_batch().await;
    }

    async fn stop(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.flush();
        self.close_session().await;
        self.queue.clear();
        self.in_flight.clear();
        self.wake = None;
        self.status(format!("stopped: {} of {} done", self.store.len(), self.total));
        self.set_phase(RunPhase::Stopped);
    }

    async fn fail(&mut self, error: KeyprobeError) {
        self.close_session().await;
        self.abort(error);
    }

    fn abort(&mut self, error: KeyprobeError) {
        self.flush();
        self.link = None;
        self.queue.clear();
        self.in_flight.clear();
        self.wake = None;
        self.status(format!("run failed: {error}"));
        self.error = Some(error);
        self.set_phase(RunPhase::Failed);
    }

    fn complete(&mut self) {
        self.flush();
        let counts = self.store.counts();
        self.status(format!(
            "completed: {} valid, {} zero balance, {} rate limited, {} invalid, {} errors, {} duplicates",
            counts.valid,
            counts.zero_balance,
            counts.rate_limited,
            counts.invalid,
            counts.error,
            counts.duplicate
        ));
        self.set_phase(RunPhase::Completed);
    }
}
