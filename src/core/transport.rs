//! Session transports.
//!
//! The orchestrator only sees a [`SessionLink`]: a sender for client text
//! frames and a receiver for server frames. [`InProcessConnector`] backs that
//! with a spawned [`BatchSession`]; [`serve_lines`] exposes one session over
//! a newline-delimited byte stream (used by `keyprobe session`).

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::protocol::{ClientCommand, Frame};
use super::provider::ProviderRegistry;
use super::session::{BatchSession, SessionState};
use super::validator::CheckCredential;
use crate::error::{KeyprobeError, Result};

/// Frame buffer per direction.
const LINK_BUFFER: usize = 256;

/// Client half of an open session.
#[derive(Debug)]
pub struct SessionLink {
    pub commands: mpsc::Sender<String>,
    pub frames: mpsc::Receiver<Frame>,
}

/// Opens batch sessions.
pub trait Connector: Send + Sync + 'static {
    /// Open a new session.
    ///
    /// # Errors
    ///
    /// Returns a connect error if no session could be opened.
    fn connect(&self) -> impl Future<Output = Result<SessionLink>> + Send;
}

// =============================================================================
// In-process
// =============================================================================

/// Runs each session as a task in the current runtime.
pub struct InProcessConnector<C> {
    checker: Arc<C>,
    registry: Arc<ProviderRegistry>,
}

impl<C> InProcessConnector<C> {
    #[must_use]
    pub const fn new(checker: Arc<C>, registry: Arc<ProviderRegistry>) -> Self {
        Self { checker, registry }
    }
}

impl<C: CheckCredential> Connector for InProcessConnector<C> {
    fn connect(&self) -> impl Future<Output = Result<SessionLink>> + Send {
        let session = BatchSession::new(Arc::clone(&self.checker), Arc::clone(&self.registry));
        async move {
            let (commands, command_rx) = mpsc::channel(LINK_BUFFER);
            let (frame_tx, frames) = mpsc::channel(LINK_BUFFER);
            tokio::spawn(session.serve(command_rx, frame_tx));
            Ok(SessionLink { commands, frames })
        }
    }
}

// =============================================================================
// Line-delimited streams
// =============================================================================

const CLOSE_TYPE: &str = "close";

/// Close frames on a line stream.
#[derive(Debug, Serialize, Deserialize)]
struct CloseLine {
    #[serde(rename = "type")]
    kind: String,
    code: u16,
    reason: String,
}

/// Encode a frame as one line (without the newline).
#[must_use]
pub fn encode_frame(frame: &Frame) -> String {
    match frame {
        Frame::Text(text) => text.clone(),
        Frame::Close { code, reason } => serde_json::to_string(&CloseLine {
            kind: CLOSE_TYPE.to_string(),
            code: *code,
            reason: reason.clone(),
        })
        .unwrap_or_default(),
    }
}

/// Decode one line into a frame.
#[must_use]
pub fn decode_frame(line: &str) -> Frame {
    match serde_json::from_str::<CloseLine>(line) {
        Ok(close) if close.kind == CLOSE_TYPE => Frame::Close {
            code: close.code,
            reason: close.reason,
        },
        _ => Frame::Text(line.to_string()),
    }
}

/// Serve one session over a line-delimited reader/writer pair.
///
/// Each non-empty input line is one client frame. End of input before any
/// `start` counts as a stop; once a batch is started it runs until it
/// completes or a `stop` line arrives. Each server frame is written as one
/// line, ending with the close.
///
/// # Errors
///
/// Returns an I/O error if writing to `writer` fails.
pub async fn serve_lines<C, R, W>(
    session: BatchSession<C>,
    reader: R,
    mut writer: W,
) -> Result<SessionState>
where
    C: CheckCredential,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (command_tx, command_rx) = mpsc::channel(LINK_BUFFER);
    let (frame_tx, mut frame_rx) = mpsc::channel(LINK_BUFFER);

    let forward = async move {
        let mut started = false;
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            started |= matches!(ClientCommand::decode(line), Ok(ClientCommand::Start { .. }));
            if command_tx.send(line.to_string()).await.is_err() {
                return;
            }
        }
        // A started batch runs to its own end after input closes.
        if started {
            std::future::pending::<()>().await;
        }
    };

    let write = async {
        while let Some(frame) = frame_rx.recv().await {
            writer.write_all(encode_frame(&frame).as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    };

    let main = async { tokio::join!(session.serve(command_rx, frame_tx), write) };
    tokio::pin!(forward);
    tokio::pin!(main);

    let mut forward_done = false;
    loop {
        tokio::select! {
            (state, written) = &mut main => {
                written.map_err(KeyprobeError::Io)?;
                return Ok(state);
            }
            () = &mut forward, if !forward_done => forward_done = true,
        }
    }
}

/// Serve one session on this process's stdin/stdout.
///
/// # Errors
///
/// Returns an I/O error if stdout cannot be written.
pub async fn serve_stdio<C: CheckCredential>(session: BatchSession<C>) -> Result<SessionState> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve_lines(session, stdin, tokio::io::stdout()).await
}
