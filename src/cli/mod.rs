//! CLI argument parsing and command dispatch.

pub mod args;
pub mod check;
pub mod models;
pub mod providers;
pub mod session;

use std::sync::Arc;

pub use args::{Cli, Commands, OutputFormat};

use crate::core::http::{SecureFetcher, check_target};
use crate::core::models::ProviderConfig;
use crate::core::provider::{ProviderMeta, ProviderRegistry};
use crate::error::{KeyprobeError, Result};
use crate::storage::config::ResolvedConfig;
use crate::util::env::should_use_color;

/// Provider selection resolved against the registry.
pub(crate) struct ProviderTarget {
    pub registry: Arc<ProviderRegistry>,
    pub meta: ProviderMeta,
    pub config: ProviderConfig,
}

impl ProviderTarget {
    /// Look up the provider and reject unroutable regions and blocked base URLs
    /// before any request is made.
    pub(crate) fn resolve(resolved: &ResolvedConfig, args: &args::ProviderArgs) -> Result<Self> {
        let registry = Arc::new(resolved.registry());
        let config = args.to_provider_config();
        let meta = registry.get(&config.provider)?.clone();
        resolved.check_region(config.region())?;

        let base_url = meta.base_url(&config);
        check_target(&base_url, resolved.allow_private_targets).map_err(|reason| {
            KeyprobeError::BlockedTarget {
                url: base_url.clone(),
                reason,
            }
        })?;

        Ok(Self {
            registry,
            meta,
            config,
        })
    }
}

/// Shared outbound boundary for one command.
pub(crate) fn build_fetcher(resolved: &ResolvedConfig) -> Result<Arc<SecureFetcher>> {
    SecureFetcher::new(&resolved.fetch_options()).map(Arc::new)
}

/// Whether human output should be uncolored.
pub(crate) fn no_color(resolved: &ResolvedConfig) -> bool {
    !should_use_color(resolved.no_color)
}
