//! Providers command implementation.

use super::no_color;
use crate::cli::args::Cli;
use crate::error::Result;
use crate::render;
use crate::storage::config::{ResolvedConfig, RunOverrides};

/// Execute the providers command: built-ins plus config-file entries.
///
/// # Errors
///
/// Returns an error if the config file is invalid.
pub fn execute(cli: &Cli) -> Result<()> {
    let resolved = ResolvedConfig::resolve(cli, RunOverrides::default())?;
    let registry = resolved.registry();
    let output = render::render_providers(
        &registry,
        resolved.format,
        resolved.pretty,
        no_color(&resolved),
    )?;
    print!("{output}");
    Ok(())
}
