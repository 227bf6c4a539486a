//! Session command: one batch session over stdin/stdout.
//!
//! Each input line is a client frame (`{"command":"start",...}` or
//! `{"command":"stop"}`); each output line is a server message, ending with
//! a `{"type":"close","code":...,"reason":...}` line. Logs go to stderr.

use std::sync::Arc;

use super::build_fetcher;
use crate::cli::args::{Cli, SessionArgs};
use crate::core::session::{BatchSession, SessionState};
use crate::core::transport::serve_stdio;
use crate::core::validator::CredentialValidator;
use crate::error::Result;
use crate::storage::config::{ResolvedConfig, RunOverrides};

/// Execute the session command.
///
/// A session that ends in `Errored` still exits successfully: the error was
/// already reported to the client as frames.
///
/// # Errors
///
/// Returns configuration errors or an I/O error writing to stdout.
pub async fn execute(cli: &Cli, args: &SessionArgs) -> Result<()> {
    let resolved = ResolvedConfig::resolve(
        cli,
        RunOverrides {
            timeout: args.timeout,
            ..RunOverrides::default()
        },
    )?;
    let validator = Arc::new(CredentialValidator::new(build_fetcher(&resolved)?));
    let session = BatchSession::new(validator, Arc::new(resolved.registry()));

    let state = serve_stdio(session).await?;
    if state == SessionState::Errored {
        tracing::warn!("Session ended with an error");
    } else {
        tracing::info!(?state, "Session ended");
    }
    Ok(())
}
