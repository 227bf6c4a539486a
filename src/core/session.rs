//! One batch session: the server side of the batch protocol.
//!
//! A session accepts exactly one `start`, runs the batch through a
//! [`WorkerPool`], forwards results as they complete, and closes the
//! transport on every terminal state.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use super::models::{Credential, ProviderConfig};
use super::protocol::{
    CLOSE_COMPLETE, CLOSE_SERVER_ERROR, CLOSE_STOPPED, ClientCommand, CommandError, Frame,
    REASON_COMPLETE,
    REASON_SERVER_ERROR, REASON_STOPPED, ServerMessage, StartPayload,
};
use super::provider::{ProviderMeta, ProviderRegistry};
use super::validator::CheckCredential;
use super::worker_pool::{PoolOutcome, StopSignal, WorkerPool};
use crate::storage::config::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Capacity of the pool-to-session result channel.
const RESULT_BUFFER: usize = 64;

// =============================================================================
// State Machine
// =============================================================================

/// Lifecycle of a batch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingStart,
    Running,
    Completed,
    Stopped,
    Errored,
}

/// Inputs that move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A well-formed `start`.
    Start,
    /// A `start` that cannot run: undecodable payload, no tokens, no config,
    /// or an unknown provider.
    RejectStart,
    /// A `stop`, or the client going away.
    Stop,
    /// The worker pool drained the batch.
    PoolFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no session transition from {from:?} on {event:?}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub event: SessionEvent,
}

impl SessionState {
    /// Apply an event.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] for events that make no sense in the
    /// current state (a second `start`, anything after a terminal state).
    pub const fn on(self, event: SessionEvent) -> Result<Self, InvalidTransition> {
        match (self, event) {
            (Self::AwaitingStart, SessionEvent::Start) => Ok(Self::Running),
            (Self::AwaitingStart, SessionEvent::RejectStart) => Ok(Self::Errored),
            (Self::AwaitingStart | Self::Running, SessionEvent::Stop) => Ok(Self::Stopped),
            (Self::Running, SessionEvent::PoolFinished) => Ok(Self::Completed),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Errored)
    }

    /// Close frame sent when entering a terminal state.
    #[must_use]
    pub fn close_frame(self) -> Option<Frame> {
        match self {
            Self::Completed => Some(Frame::close(CLOSE_COMPLETE, REASON_COMPLETE)),
            Self::Stopped => Some(Frame::close(CLOSE_STOPPED, REASON_STOPPED)),
            Self::Errored => Some(Frame::close(CLOSE_SERVER_ERROR, REASON_SERVER_ERROR)),
            Self::AwaitingStart | Self::Running => None,
        }
    }
}

// =============================================================================
// Batch Session
// =============================================================================

/// A validated `start`.
struct Job {
    tokens: Vec<Credential>,
    meta: ProviderMeta,
    config: ProviderConfig,
    concurrency: usize,
}

/// Serves one batch over a frame channel.
pub struct BatchSession<C> {
    checker: Arc<C>,
    registry: Arc<ProviderRegistry>,
    state: SessionState,
}

impl<C: CheckCredential> BatchSession<C> {
    #[must_use]
    pub const fn new(checker: Arc<C>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            checker,
            registry,
            state: SessionState::AwaitingStart,
        }
    }

    /// Drive the session until it reaches a terminal state.
    ///
    /// `commands` carries raw client text frames; dropping its sender counts
    /// as a stop. Returns the terminal state.
    pub async fn serve(
        mut self,
        mut commands: mpsc::Receiver<String>,
        frames: mpsc::Sender<Frame>,
    ) -> SessionState {
        let job = loop {
            let Some(text) = commands.recv().await else {
                return self.finish(SessionEvent::Stop, &frames).await;
            };
            let rejection = match ClientCommand::decode(&text) {
                Ok(ClientCommand::Start { data }) => match self.accept(data) {
                    Ok(job) => break job,
                    Err(message) => message,
                },
                Ok(ClientCommand::Stop) => {
                    return self.finish(SessionEvent::Stop, &frames).await;
                }
                Err(e @ CommandError::InvalidStart(_)) => e.to_string(),
                Err(e @ CommandError::Malformed(_)) => {
                    send(&frames, &ServerMessage::error(e.to_string())).await;
                    continue;
                }
            };
            tracing::warn!(message = %rejection, "Rejected batch start");
            send(&frames, &ServerMessage::error(rejection)).await;
            return self.finish(SessionEvent::RejectStart, &frames).await;
        };

        self.advance(SessionEvent::Start);
        let event = self.run(job, &mut commands, &frames).await;
        self.finish(event, &frames).await
    }

    fn accept(&self, data: StartPayload) -> Result<Job, String> {
        if data.tokens.is_empty() {
            return Err("start requires a non-empty tokens list".to_string());
        }
        let config = data
            .provider_config
            .ok_or_else(|| "start requires providerConfig".to_string())?;
        let meta = self
            .registry
            .lookup(&config.provider)
            .ok_or_else(|| format!("unknown provider: {}", config.provider))?
            .clone();
        let concurrency = data
            .concurrency
            .unwrap_or(DEFAULT_CONCURRENCY)
            .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);

        Ok(Job {
            tokens: data.tokens,
            meta,
            config,
            concurrency,
        })
    }

    async fn run(
        &self,
        job: Job,
        commands: &mut mpsc::Receiver<String>,
        frames: &mpsc::Sender<Frame>,
    ) -> SessionEvent {
        let total = job.tokens.len();
        let batch: Arc<[Credential]> = job.tokens.into();
        let pool = WorkerPool::new(Arc::clone(&self.checker), job.concurrency);
        let stop = StopSignal::new();
        let (results_tx, mut results_rx) = mpsc::channel(RESULT_BUFFER);

        tracing::info!(
            provider = %job.meta.key,
            total,
            concurrency = job.concurrency,
            "Batch session running"
        );
        send(
            frames,
            &ServerMessage::status(format!("validating {total} keys")),
        )
        .await;

        let run = pool.run(batch, &job.meta, &job.config, &results_tx, &stop);
        tokio::pin!(run);

        let outcome = loop {
            tokio::select! {
                command = commands.recv() => match command.as_deref().map(ClientCommand::decode) {
                    None | Some(Ok(ClientCommand::Stop)) => {
                        stop.raise();
                        return SessionEvent::Stop;
                    }
                    Some(Ok(ClientCommand::Start { .. }) | Err(CommandError::InvalidStart(_))) => {
                        send(frames, &ServerMessage::error("session already started")).await;
                    }
                    Some(Err(e @ CommandError::Malformed(_))) => {
                        send(frames, &ServerMessage::error(e.to_string())).await;
                    }
                },
                Some(result) = results_rx.recv() => {
                    if !send(frames, &ServerMessage::Result { data: result }).await {
                        stop.raise();
                        return SessionEvent::Stop;
                    }
                }
                outcome = &mut run => break outcome,
            }
        };

        // Results sent before the pool returned are already queued.
        while let Ok(result) = results_rx.try_recv() {
            if !send(frames, &ServerMessage::Result { data: result }).await {
                return SessionEvent::Stop;
            }
        }

        match outcome {
            PoolOutcome::Completed => {
                send(
                    frames,
                    &ServerMessage::Done {
                        message: REASON_COMPLETE.to_string(),
                    },
                )
                .await;
                SessionEvent::PoolFinished
            }
            PoolOutcome::Stopped => SessionEvent::Stop,
        }
    }

    fn advance(&mut self, event: SessionEvent) {
        match self.state.on(event) {
            Ok(next) => self.state = next,
            Err(e) => tracing::error!(error = %e, "Ignoring session event"),
        }
    }

    async fn finish(mut self, event: SessionEvent, frames: &mpsc::Sender<Frame>) -> SessionState {
        self.advance(event);
        if let Some(close) = self.state.close_frame() {
            let _ = frames.send(close).await;
        }
        tracing::debug!(state = ?self.state, "Batch session closed");
        self.state
    }
}

/// Send one message; `false` means the client is gone.
async fn send(frames: &mpsc::Sender<Frame>, message: &ServerMessage) -> bool {
    frames.send(Frame::message(message)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedChecker, make_credentials};
    use std::time::Duration;

    struct Harness {
        commands: mpsc::Sender<String>,
        frames: mpsc::Receiver<Frame>,
        task: tokio::task::JoinHandle<SessionState>,
    }

    fn spawn(checker: ScriptedChecker) -> Harness {
        let (commands, command_rx) = mpsc::channel(8);
        let (frame_tx, frames) = mpsc::channel(256);
        let session = BatchSession::new(Arc::new(checker), Arc::new(ProviderRegistry::builtin()));
        let task = tokio::spawn(session.serve(command_rx, frame_tx));
        Harness {
            commands,
            frames,
            task,
        }
    }

    fn start_text(n: usize, provider: &str) -> String {
        ClientCommand::start(make_credentials(n), ProviderConfig::for_provider(provider), 3).to_text()
    }

    async fn collect(frames: &mut mpsc::Receiver<Frame>) -> (Vec<ServerMessage>, Option<Frame>) {
        let mut messages = Vec::new();
        while let Some(frame) = frames.recv().await {
            match frame {
                Frame::Text(text) => messages.push(ServerMessage::parse(&text).unwrap()),
                close @ Frame::Close { .. } => return (messages, Some(close)),
            }
        }
        (messages, None)
    }

    #[test]
    fn transitions_follow_the_lifecycle() {
        use SessionEvent::*;
        use SessionState::*;
        assert_eq!(AwaitingStart.on(Start), Ok(Running));
        assert_eq!(AwaitingStart.on(RejectStart), Ok(Errored));
        assert_eq!(Running.on(Stop), Ok(Stopped));
        assert_eq!(Running.on(PoolFinished), Ok(Completed));
        assert!(Running.on(Start).is_err());
        assert!(Completed.on(Stop).is_err());
        assert!(AwaitingStart.on(PoolFinished).is_err());
        assert!(Stopped.is_terminal() && !Running.is_terminal());
    }

    #[tokio::test]
    async fn completed_batch_sends_results_then_done() {
        let mut h = spawn(ScriptedChecker::new());
        h.commands.send(start_text(12, "openai")).await.unwrap();

        let (messages, close) = collect(&mut h.frames).await;
        let results = messages
            .iter()
            .filter(|m| matches!(m, ServerMessage::Result { .. }))
            .count();
        assert_eq!(results, 12);
        assert!(matches!(messages.last(), Some(ServerMessage::Done { .. })));
        assert_eq!(close, Some(Frame::close(CLOSE_COMPLETE, REASON_COMPLETE)));
        assert_eq!(h.task.await.unwrap(), SessionState::Completed);
    }

    #[tokio::test]
    async fn malformed_json_keeps_session_open() {
        let mut h = spawn(ScriptedChecker::new());
        h.commands.send("{not json".to_string()).await.unwrap();
        h.commands.send(r#"{"command":"pause"}"#.to_string()).await.unwrap();

        for _ in 0..2 {
            let Some(Frame::Text(text)) = h.frames.recv().await else {
                panic!("expected an error frame");
            };
            assert!(matches!(ServerMessage::parse(&text).unwrap(), ServerMessage::Error { .. }));
        }

        h.commands.send(start_text(2, "openai")).await.unwrap();
        let (_, close) = collect(&mut h.frames).await;
        assert_eq!(close, Some(Frame::close(CLOSE_COMPLETE, REASON_COMPLETE)));
    }

    #[tokio::test]
    async fn unknown_provider_errors_and_closes() {
        let mut h = spawn(ScriptedChecker::new());
        h.commands.send(start_text(2, "nope")).await.unwrap();

        let (messages, close) = collect(&mut h.frames).await;
        let [ServerMessage::Error { message }] = messages.as_slice() else {
            panic!("expected one error, got {messages:?}");
        };
        assert!(message.contains("unknown provider"));
        assert_eq!(close, Some(Frame::close(CLOSE_SERVER_ERROR, REASON_SERVER_ERROR)));
        assert_eq!(h.task.await.unwrap(), SessionState::Errored);
    }

    #[tokio::test]
    async fn empty_tokens_and_missing_config_are_rejected() {
        let mut h = spawn(ScriptedChecker::new());
        h.commands.send(start_text(0, "openai")).await.unwrap();
        let (messages, _) = collect(&mut h.frames).await;
        assert!(matches!(&messages[0], ServerMessage::Error { message } if message.contains("tokens")));

        let mut h = spawn(ScriptedChecker::new());
        h.commands
            .send(r#"{"command":"start","data":{"tokens":[{"token":"k","order":0}]}}"#.to_string())
            .await
            .unwrap();
        let (messages, _) = collect(&mut h.frames).await;
        assert!(
            matches!(&messages[0], ServerMessage::Error { message } if message.contains("providerConfig"))
        );
    }

    #[tokio::test]
    async fn undecodable_start_payload_errors_and_closes() {
        for text in [
            r#"{"command":"start","data":{"tokens":"not-a-list","providerConfig":{"provider":"openai"}}}"#,
            r#"{"command":"start"}"#,
        ] {
            let mut h = spawn(ScriptedChecker::new());
            h.commands.send(text.to_string()).await.unwrap();

            let (messages, close) = collect(&mut h.frames).await;
            let [ServerMessage::Error { message }] = messages.as_slice() else {
                panic!("expected one error for {text}, got {messages:?}");
            };
            assert!(message.contains("invalid start payload"), "{message}");
            assert_eq!(close, Some(Frame::close(CLOSE_SERVER_ERROR, REASON_SERVER_ERROR)));
            let state = tokio::time::timeout(Duration::from_millis(300), h.task)
                .await
                .expect("session ends")
                .unwrap();
            assert_eq!(state, SessionState::Errored);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_closes_without_done() {
        let mut h = spawn(ScriptedChecker::new().with_delay(Duration::from_millis(50)));
        h.commands.send(start_text(100, "openai")).await.unwrap();

        // Wait for the status frame and at least one result.
        let mut seen_result = false;
        while !seen_result {
            if let Some(Frame::Text(text)) = h.frames.recv().await {
                seen_result = matches!(ServerMessage::parse(&text).unwrap(), ServerMessage::Result { .. });
            }
        }
        h.commands.send(ClientCommand::Stop.to_text()).await.unwrap();

        let (messages, close) = collect(&mut h.frames).await;
        assert!(!messages.iter().any(|m| matches!(m, ServerMessage::Done { .. })));
        assert_eq!(close, Some(Frame::close(CLOSE_STOPPED, REASON_STOPPED)));
        assert_eq!(h.task.await.unwrap(), SessionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_client_counts_as_stop() {
        let h = spawn(ScriptedChecker::new().with_delay(Duration::from_millis(50)));
        h.commands.send(start_text(100, "openai")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        drop(h.commands);
        assert_eq!(h.task.await.unwrap(), SessionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_while_running() {
        let mut h = spawn(ScriptedChecker::new().with_delay(Duration::from_millis(20)));
        h.commands.send(start_text(10, "openai")).await.unwrap();
        h.commands.send(start_text(10, "openai")).await.unwrap();

        let (messages, close) = collect(&mut h.frames).await;
        assert!(messages.iter().any(
            |m| matches!(m, ServerMessage::Error { message } if message.contains("already started"))
        ));
        assert_eq!(close, Some(Frame::close(CLOSE_COMPLETE, REASON_COMPLETE)));
    }
}
