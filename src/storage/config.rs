//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/keyprobe/config.toml`
//! - macOS: `~/Library/Application Support/dev.keyprobe.keyprobe/config.toml`
//! - Windows: `%APPDATA%/keyprobe/keyprobe/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `KEYPROBE_CONFIG`: Override config file path
//! - `KEYPROBE_CONCURRENCY`: Keys validated at once
//! - `KEYPROBE_TIMEOUT`: Per-request timeout in seconds
//! - `KEYPROBE_BATCH_SIZE`: Keys per batch session
//! - `KEYPROBE_NO_COLOR` or `NO_COLOR`: Disable colors
//! - `KEYPROBE_PRETTY`: Pretty-print JSON output (1, true, yes)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::{Cli, OutputFormat};
use crate::core::http::FetchOptions;
use crate::core::orchestrator::OrchestratorSettings;
use crate::core::provider::{ProviderMeta, ProviderRegistry};
use crate::error::{KeyprobeError, Result};
use crate::util::env::env_truthy;

// =============================================================================
// Limits and Defaults
// =============================================================================

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 20;
pub const DEFAULT_CONCURRENCY: usize = 5;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const MAX_BATCH_SIZE: usize = 5_000;

/// Parsed keys accepted per run, repeats included.
pub const DEFAULT_MAX_CREDENTIALS: usize = 50_000;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MAX_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "KEYPROBE_CONFIG";
/// Environment variable for worker concurrency.
pub const ENV_CONCURRENCY: &str = "KEYPROBE_CONCURRENCY";
/// Environment variable for timeout in seconds.
pub const ENV_TIMEOUT: &str = "KEYPROBE_TIMEOUT";
/// Environment variable for batch size.
pub const ENV_BATCH_SIZE: &str = "KEYPROBE_BATCH_SIZE";
/// Environment variable to disable colors.
pub const ENV_NO_COLOR: &str = "KEYPROBE_NO_COLOR";
/// Standard environment variable to disable colors.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";
/// Environment variable for pretty JSON output.
pub const ENV_PRETTY: &str = "KEYPROBE_PRETTY";

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Per-command flags that override config values.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOverrides {
    pub timeout: Option<u64>,
    pub concurrency: Option<usize>,
    pub batch_size: Option<usize>,
}

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub format: OutputFormat,
    pub no_color: bool,
    pub pretty: bool,
    /// Per-request timeout.
    pub timeout: Duration,
    pub concurrency: usize,
    pub batch_size: usize,
    pub max_credentials: usize,
    pub allow_private_targets: bool,
    pub randomize_headers: bool,
    /// Region id -> proxy URL.
    pub regions: BTreeMap<String, String>,
    /// `[[providers]]` entries from the config file.
    pub custom_providers: Vec<ProviderMeta>,
    /// Config file that was consulted (it may not exist).
    pub config_path: PathBuf,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub timeout: ConfigSource,
    pub concurrency: ConfigSource,
    pub batch_size: ConfigSource,
    pub no_color: ConfigSource,
    pub pretty: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, environment variables, and config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - Any resolved value is out of range
    pub fn resolve(cli: &Cli, overrides: RunOverrides) -> Result<Self> {
        let config_path = Self::config_path(cli.config.as_deref());
        let config = Config::load_from(&config_path)?;
        config.validate()?;

        let mut sources = ConfigSources::default();

        let timeout_secs = resolve_number(
            overrides.timeout,
            ENV_TIMEOUT,
            config.general.timeout_seconds,
            DEFAULT_TIMEOUT_SECS,
            &mut sources.timeout,
        );
        check_timeout(timeout_secs)?;

        let concurrency = resolve_number(
            overrides.concurrency,
            ENV_CONCURRENCY,
            config.general.concurrency,
            DEFAULT_CONCURRENCY,
            &mut sources.concurrency,
        );
        check_concurrency(concurrency)?;

        let batch_size = resolve_number(
            overrides.batch_size,
            ENV_BATCH_SIZE,
            config.general.batch_size,
            DEFAULT_BATCH_SIZE,
            &mut sources.batch_size,
        );
        check_batch_size(batch_size)?;

        let no_color = Self::resolve_no_color(cli, &mut sources.no_color);
        let pretty = Self::resolve_pretty(cli, &mut sources.pretty);

        let resolved = Self {
            format: cli.effective_format(),
            no_color,
            pretty,
            timeout: Duration::from_secs(timeout_secs),
            concurrency,
            batch_size,
            max_credentials: config.general.max_credentials,
            allow_private_targets: config.security.allow_private_targets,
            randomize_headers: config.security.randomize_headers,
            regions: config.regions,
            custom_providers: config.providers,
            config_path,
            sources,
        };
        tracing::debug!(
            timeout_secs,
            timeout_source = %resolved.sources.timeout,
            concurrency,
            concurrency_source = %resolved.sources.concurrency,
            batch_size,
            batch_size_source = %resolved.sources.batch_size,
            "Resolved configuration"
        );
        Ok(resolved)
    }

    /// Config file path: `--config`, then `KEYPROBE_CONFIG`, then the default location.
    fn config_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_path {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            return PathBuf::from(path);
        }
        AppPaths::new().config_file()
    }

    fn resolve_no_color(cli: &Cli, source: &mut ConfigSource) -> bool {
        if cli.no_color {
            *source = ConfigSource::Cli;
            return true;
        }
        if env_truthy(ENV_NO_COLOR) || std::env::var_os(ENV_NO_COLOR_STD).is_some() {
            *source = ConfigSource::Env;
            return true;
        }
        *source = ConfigSource::Default;
        false
    }

    fn resolve_pretty(cli: &Cli, source: &mut ConfigSource) -> bool {
        if cli.pretty {
            *source = ConfigSource::Cli;
            return true;
        }
        if env_truthy(ENV_PRETTY) {
            *source = ConfigSource::Env;
            return true;
        }
        *source = ConfigSource::Default;
        false
    }

    /// Provider registry: built-ins plus `[[providers]]`.
    #[must_use]
    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::builtin().with_custom(self.custom_providers.iter().cloned())
    }

    /// Options for the outbound request boundary.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: self.timeout,
            allow_private_targets: self.allow_private_targets,
            randomize_headers: self.randomize_headers,
            regions: self.regions.clone(),
        }
    }

    /// Orchestrator tunables derived from this config.
    #[must_use]
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            batch_size: self.batch_size,
            max_credentials: self.max_credentials,
            ..OrchestratorSettings::default()
        }
    }

    /// Reject a region id that is not in `[regions]`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` for an unknown, non-empty id.
    pub fn check_region(&self, region: Option<&str>) -> Result<()> {
        match region {
            Some(id) if !self.regions.contains_key(id) => {
                Err(KeyprobeError::UnknownRegion(id.to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// CLI value, then env var, then config file, then default.
///
/// The file value counts as set when it differs from the default. An env
/// value that does not parse is ignored with a warning.
fn resolve_number<T>(
    cli: Option<T>,
    env_var: &str,
    file: T,
    default: T,
    source: &mut ConfigSource,
) -> T
where
    T: std::str::FromStr + PartialEq + Copy,
{
    if let Some(value) = cli {
        *source = ConfigSource::Cli;
        return value;
    }

    if let Ok(raw) = std::env::var(env_var) {
        if let Ok(value) = raw.trim().parse::<T>() {
            *source = ConfigSource::Env;
            return value;
        }
        tracing::warn!(var = env_var, value = %raw, "Ignoring unparseable environment value");
    }

    if file == default {
        *source = ConfigSource::Default;
    } else {
        *source = ConfigSource::ConfigFile;
    }
    file
}

fn check_timeout(seconds: u64) -> Result<()> {
    if seconds == 0 || seconds > MAX_TIMEOUT_SECS {
        return Err(KeyprobeError::Config(format!(
            "timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds, got {seconds}"
        )));
    }
    Ok(())
}

fn check_concurrency(value: usize) -> Result<()> {
    if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&value) {
        return Err(KeyprobeError::InvalidConcurrency {
            value,
            min: MIN_CONCURRENCY,
            max: MAX_CONCURRENCY,
        });
    }
    Ok(())
}

fn check_batch_size(value: usize) -> Result<()> {
    if value == 0 || value > MAX_BATCH_SIZE {
        return Err(KeyprobeError::Config(format!(
            "batch size must be between 1 and {MAX_BATCH_SIZE}, got {value}"
        )));
    }
    Ok(())
}

// =============================================================================
// File Configuration
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub security: SecurityConfig,
    /// Region id -> egress proxy URL.
    pub regions: BTreeMap<String, String>,
    /// Extra or overriding provider descriptors.
    pub providers: Vec<ProviderMeta>,
}

/// Run sizing and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    pub concurrency: usize,
    pub batch_size: usize,
    /// Parsed keys accepted per run, repeats included.
    pub max_credentials: usize,
}

/// Outbound request guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Allow loopback and private-network base URLs.
    pub allow_private_targets: bool,
    /// Vary User-Agent and Accept-Language per request.
    pub randomize_headers: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            max_credentials: DEFAULT_MAX_CREDENTIALS,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_private_targets: false,
            randomize_headers: true,
        }
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().config_file())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` if the file is not valid TOML for this schema.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| KeyprobeError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| KeyprobeError::Config(format!("failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error for out-of-range limits, malformed proxy URLs, or
    /// incomplete provider entries.
    pub fn validate(&self) -> Result<()> {
        check_timeout(self.general.timeout_seconds)?;
        check_concurrency(self.general.concurrency)?;
        check_batch_size(self.general.batch_size)?;
        if self.general.max_credentials == 0 {
            return Err(KeyprobeError::Config(
                "max_credentials must be at least 1".to_string(),
            ));
        }

        for (region, proxy) in &self.regions {
            url::Url::parse(proxy).map_err(|e| {
                KeyprobeError::Config(format!("invalid proxy URL for region \"{region}\": {e}"))
            })?;
        }

        for provider in &self.providers {
            if provider.key.trim().is_empty() {
                return Err(KeyprobeError::Config(
                    "provider entry is missing a key".to_string(),
                ));
            }
            if provider.default_base_url.trim().is_empty() {
                return Err(KeyprobeError::Config(format!(
                    "provider \"{}\" is missing default_base_url",
                    provider.key
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ApiStyle;
    use crate::test_utils::ENV_LOCK;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["keyprobe"];
        argv.extend_from_slice(args);
        argv.push("providers");
        Cli::parse_from(argv)
    }

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{body}").unwrap();
        file
    }

    #[allow(unsafe_code)]
    fn clear_env() {
        for var in [ENV_CONFIG, ENV_CONCURRENCY, ENV_TIMEOUT, ENV_BATCH_SIZE, ENV_PRETTY] {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.general.timeout_seconds, 30);
        assert_eq!(config.general.max_credentials, 50_000);
        assert!(config.security.randomize_headers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_missing_file_returns_default() {
        let config = Config::load_from(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config.general.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn load_valid_toml() {
        let file = write_config(
            r#"
[general]
timeout_seconds = 60
concurrency = 8

[security]
allow_private_targets = true

[regions]
eu = "http://proxy.eu.example:8080"

[[providers]]
key = "local"
api_style = "openai"
default_base_url = "http://127.0.0.1:8000/v1"
default_model = "tiny"
"#,
        );

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.general.timeout_seconds, 60);
        assert_eq!(config.general.concurrency, 8);
        assert_eq!(config.general.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.security.allow_private_targets);
        assert_eq!(config.regions["eu"], "http://proxy.eu.example:8080");
        assert_eq!(config.providers[0].api_style, ApiStyle::Openai);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_invalid_toml_returns_parse_error() {
        let file = write_config("this is not valid toml {{");
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, KeyprobeError::ConfigParse { .. }));
    }

    #[test]
    fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.general.batch_size = 250;
        config
            .regions
            .insert("us".to_string(), "socks5://10.0.0.1:1080".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.general.batch_size, 250);
        assert_eq!(loaded.regions.len(), 1);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.general.timeout_seconds = 301;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.general.concurrency = 21;
        assert!(matches!(
            config.validate(),
            Err(KeyprobeError::InvalidConcurrency { value: 21, .. })
        ));

        let mut config = Config::default();
        config.general.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config
            .regions
            .insert("bad".to_string(), "not a url".to_string());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("bad"));
    }

    #[test]
    #[allow(unsafe_code)]
    fn cli_beats_env_beats_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        clear_env();
        let file = write_config("[general]\nconcurrency = 7\ntimeout_seconds = 45\nbatch_size = 100\n");
        unsafe {
            std::env::set_var(ENV_CONFIG, file.path());
            std::env::set_var(ENV_TIMEOUT, "12");
        }

        let resolved = ResolvedConfig::resolve(
            &cli(&[]),
            RunOverrides {
                concurrency: Some(3),
                ..RunOverrides::default()
            },
        )
        .unwrap();
        clear_env();

        assert_eq!(resolved.concurrency, 3);
        assert_eq!(resolved.sources.concurrency, ConfigSource::Cli);
        assert_eq!(resolved.timeout, Duration::from_secs(12));
        assert_eq!(resolved.sources.timeout, ConfigSource::Env);
        assert_eq!(resolved.batch_size, 100);
        assert_eq!(resolved.sources.batch_size, ConfigSource::ConfigFile);
        assert_eq!(resolved.config_path, file.path());
    }

    #[test]
    #[allow(unsafe_code)]
    fn config_flag_beats_env_path() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        clear_env();
        let env_file = write_config("[general]\nconcurrency = 2\n");
        let flag_file = write_config("[general]\nconcurrency = 9\n");
        unsafe { std::env::set_var(ENV_CONFIG, env_file.path()) };

        let path = flag_file.path().to_string_lossy().to_string();
        let resolved =
            ResolvedConfig::resolve(&cli(&["--config", &path]), RunOverrides::default()).unwrap();
        clear_env();

        assert_eq!(resolved.concurrency, 9);
    }

    #[test]
    #[allow(unsafe_code)]
    fn out_of_range_override_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        clear_env();
        unsafe { std::env::set_var(ENV_CONFIG, "/nonexistent/keyprobe.toml") };

        let err = ResolvedConfig::resolve(
            &cli(&[]),
            RunOverrides {
                concurrency: Some(0),
                ..RunOverrides::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, KeyprobeError::InvalidConcurrency { value: 0, .. }));

        let err = ResolvedConfig::resolve(
            &cli(&[]),
            RunOverrides {
                timeout: Some(0),
                ..RunOverrides::default()
            },
        )
        .unwrap_err();
        clear_env();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    #[allow(unsafe_code)]
    fn custom_providers_reach_the_registry() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        clear_env();
        let file = write_config(
            r#"
[regions]
eu = "http://proxy.eu.example:8080"

[[providers]]
key = "Local"
api_style = "anthropic"
default_base_url = "http://127.0.0.1:9000/v1"
"#,
        );
        unsafe { std::env::set_var(ENV_CONFIG, file.path()) };
        let resolved = ResolvedConfig::resolve(&cli(&[]), RunOverrides::default()).unwrap();
        clear_env();

        let registry = resolved.registry();
        assert_eq!(registry.get("local").unwrap().api_style, ApiStyle::Anthropic);
        assert!(registry.get("openai").is_ok());
        assert!(resolved.check_region(Some("eu")).is_ok());
        assert!(resolved.check_region(None).is_ok());
        assert!(matches!(
            resolved.check_region(Some("mars")),
            Err(KeyprobeError::UnknownRegion(_))
        ));
        assert_eq!(resolved.fetch_options().regions.len(), 1);
        assert_eq!(resolved.orchestrator_settings().batch_size, DEFAULT_BATCH_SIZE);
    }
}
