//! Check command implementation.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncReadExt;

use super::{ProviderTarget, build_fetcher, no_color};
use crate::cli::args::{CheckArgs, Cli, OutputFormat};
use crate::core::models::ProviderConfig;
use crate::core::orchestrator::{RunEvent, RunPhase, RunReport, TaskOrchestrator};
use crate::core::transport::{Connector, InProcessConnector};
use crate::core::validator::CredentialValidator;
use crate::error::{KeyprobeError, Result};
use crate::render::{self, ReportView};
use crate::storage::config::{ResolvedConfig, RunOverrides};
use crate::util::env::{stderr_is_tty, stdin_is_tty};
use crate::util::format::format_count;

/// Execute the check command.
///
/// # Errors
///
/// Returns input and configuration errors before the run starts, and the
/// run's error if it fails after starting.
pub async fn execute(cli: &Cli, args: &CheckArgs) -> Result<()> {
    let resolved = ResolvedConfig::resolve(
        cli,
        RunOverrides {
            timeout: args.timeout,
            concurrency: args.concurrency,
            batch_size: args.batch_size,
        },
    )?;
    let target = ProviderTarget::resolve(&resolved, &args.provider)?;
    let raw = read_keys(args).await?;

    let validator = Arc::new(CredentialValidator::new(build_fetcher(&resolved)?));
    let connector = Arc::new(InProcessConnector::new(
        validator,
        Arc::clone(&target.registry),
    ));
    let orchestrator = TaskOrchestrator::new(connector, resolved.orchestrator_settings());

    let show_progress = resolved.format == OutputFormat::Human && stderr_is_tty();
    let mut report = run_to_end(
        &orchestrator,
        &raw,
        target.config.clone(),
        resolved.concurrency,
        show_progress,
    )
    .await?;

    let view = ReportView {
        provider: &target.meta,
        report: &report,
        only: args.only.iter().copied().map(Into::into).collect(),
        show_keys: args.show_keys,
    };
    let output = render::render_report(&view, resolved.format, resolved.pretty, no_color(&resolved))?;
    println!("{output}");

    if report.phase == RunPhase::Failed {
        return Err(report
            .error
            .take()
            .unwrap_or_else(|| KeyprobeError::Session("run failed".to_string())));
    }
    Ok(())
}

/// Start a run and wait for it to end; Ctrl-C stops it.
///
/// # Errors
///
/// Returns input errors from starting the run, or an error if the run task died.
pub async fn run_to_end<K: Connector>(
    orchestrator: &TaskOrchestrator<K>,
    raw: &str,
    provider_config: ProviderConfig,
    concurrency: usize,
    show_progress: bool,
) -> Result<RunReport> {
    let mut handle = orchestrator.start(raw, provider_config, concurrency)?;
    let total = handle.total();

    if let Some(mut events) = handle.events() {
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);
        let mut interrupted = false;
        let mut checked = 0usize;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(RunEvent::Results(results)) => {
                        checked += results.len();
                        if show_progress {
                            eprint!("\r{} / {} checked", format_count(checked), format_count(total));
                            let _ = std::io::stderr().flush();
                        }
                    }
                    Some(RunEvent::Status(message)) => tracing::info!(%message, "Run status"),
                    Some(RunEvent::Phase(phase)) => tracing::debug!(?phase, "Run phase"),
                    None => break,
                },
                _ = &mut interrupt, if !interrupted => {
                    tracing::warn!("Interrupted, stopping run");
                    interrupted = true;
                    handle.stop();
                }
            }
        }
        if show_progress {
            eprintln!();
        }
    }

    handle.finish().await
}

/// Read the raw key list from `--keys`, `--keys-file`, or piped stdin.
async fn read_keys(args: &CheckArgs) -> Result<String> {
    if let Some(keys) = &args.keys {
        return Ok(keys.clone());
    }
    match args.keys_file.as_deref() {
        Some(path) if path != Path::new("-") => {
            tracing::debug!(?path, "Reading keys from file");
            Ok(tokio::fs::read_to_string(path).await?)
        }
        Some(_) => read_stdin().await,
        None if !stdin_is_tty() => read_stdin().await,
        None => Err(KeyprobeError::EmptyInput),
    }
}

async fn read_stdin() -> Result<String> {
    let mut raw = String::new();
    tokio::io::stdin().read_to_string(&mut raw).await?;
    Ok(raw)
}
