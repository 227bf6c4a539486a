//! keyprobe - batch validator for LLM provider API keys
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::process::ExitCode;

use clap::Parser;

use keyprobe::cli::{Cli, Commands};
use keyprobe::core::logging::{self, LogLevel, LogSettings};
use keyprobe::render::error::render_error;
use keyprobe::util::env::should_use_color;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cli_level = cli.log_level.as_deref().and_then(LogLevel::from_arg);
    logging::init(&LogSettings::resolve(cli_level, cli.json_output, cli.verbose));
    if let Some(level) = cli.log_level.as_deref().filter(|_| cli_level.is_none()) {
        tracing::warn!(%level, "Unknown log level, using default");
    }

    let format = cli.effective_format();
    let no_color = !should_use_color(cli.no_color);
    let pretty = cli.pretty;

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("{}", render_error(&e, format, no_color, pretty));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: &Cli) -> keyprobe::Result<()> {
    match &cli.command {
        Commands::Check(args) => keyprobe::cli::check::execute(cli, args).await,
        Commands::Models(args) => keyprobe::cli::models::execute(cli, args).await,
        Commands::Providers => keyprobe::cli::providers::execute(cli),
        Commands::Session(args) => keyprobe::cli::session::execute(cli, args).await,
    }
}
