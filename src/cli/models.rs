//! Models command implementation.

use super::{ProviderTarget, build_fetcher, no_color};
use crate::cli::args::{Cli, ModelsArgs};
use crate::core::model_list::fetch_models;
use crate::error::Result;
use crate::render;
use crate::storage::config::{ResolvedConfig, RunOverrides};

/// Execute the models command.
///
/// # Errors
///
/// Returns configuration errors, `Unsupported` for providers without a
/// model-list adapter, or the upstream failure.
pub async fn execute(cli: &Cli, args: &ModelsArgs) -> Result<()> {
    let resolved = ResolvedConfig::resolve(
        cli,
        RunOverrides {
            timeout: args.timeout,
            ..RunOverrides::default()
        },
    )?;
    let target = ProviderTarget::resolve(&resolved, &args.provider)?;
    let fetcher = build_fetcher(&resolved)?;

    let models = fetch_models(&fetcher, &target.meta, args.key.trim(), &target.config).await?;
    tracing::debug!(provider = %target.meta.key, count = models.len(), "Fetched models");

    let output = render::render_models(
        &target.meta,
        &models,
        resolved.format,
        resolved.pretty,
        no_color(&resolved),
    )?;
    println!("{output}");
    Ok(())
}
