//! Configuration storage and application paths.

pub mod config;
pub mod paths;

pub use config::{
    Config, ConfigSource, ConfigSources, ENV_BATCH_SIZE, ENV_CONCURRENCY, ENV_CONFIG,
    ENV_NO_COLOR, ENV_NO_COLOR_STD, ENV_PRETTY, ENV_TIMEOUT, ResolvedConfig, RunOverrides,
};
pub use paths::AppPaths;
