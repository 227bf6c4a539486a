//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::core::models::ProviderConfig;
use crate::core::store::ResultCategory;

/// Batch validator for LLM provider API keys.
#[derive(Parser, Debug)]
#[command(name = "keyprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file (overrides KEYPROBE_CONFIG and the default location)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a list of API keys
    Check(CheckArgs),

    /// List the models a key can see
    Models(ModelsArgs),

    /// List known providers
    Providers,

    /// Serve one batch session on stdin/stdout (newline-delimited JSON frames)
    Session(SessionArgs),
}

/// Provider selection and validation request shape.
#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    /// Provider key (see `keyprobe providers`)
    #[arg(short, long, value_name = "PROVIDER", default_value = "openai")]
    pub provider: String,

    /// API base URL (defaults to the provider's)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Model used for the validation request
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Region id from the config's [regions] table
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// Confirm liveness from the first streamed chunk
    #[arg(long)]
    pub stream: bool,

    /// Prompt sent with each validation request
    #[arg(long, value_name = "TEXT")]
    pub prompt: Option<String>,

    /// Token limit for chat-style requests
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// Token limit for responses-style and Gemini requests
    #[arg(long, value_name = "N")]
    pub max_output_tokens: Option<u32>,
}

impl ProviderArgs {
    /// Build the per-run provider config.
    #[must_use]
    pub fn to_provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::for_provider(self.provider.trim().to_lowercase());
        config.base_url = self.base_url.clone().unwrap_or_default();
        config.model = self.model.clone().unwrap_or_default();
        config.region = self.region.clone().unwrap_or_default();
        config.enable_stream = self.stream;
        if let Some(prompt) = &self.prompt {
            config.validation_prompt.clone_from(prompt);
        }
        if let Some(limit) = self.max_tokens {
            config.validation_max_tokens = limit;
        }
        if let Some(limit) = self.max_output_tokens {
            config.validation_max_output_tokens = limit;
        }
        config
    }
}

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Keys separated by commas, whitespace, or newlines
    #[arg(long, value_name = "KEYS", conflicts_with = "keys_file")]
    pub keys: Option<String>,

    /// File with keys (use `-` for stdin); stdin is read when no keys are given
    #[arg(long, value_name = "PATH")]
    pub keys_file: Option<PathBuf>,

    /// Keys validated at once (1-20)
    #[arg(short, long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Keys per batch session
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Per-request timeout in seconds (1-300)
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Only show these categories in the report
    #[arg(long, value_enum, value_delimiter = ',', value_name = "CATEGORY")]
    pub only: Vec<CategoryArg>,

    /// Print full keys instead of masked ones
    #[arg(long)]
    pub show_keys: bool,
}

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Key used to list models
    #[arg(long, value_name = "KEY", env = "KEYPROBE_KEY", hide_env_values = true)]
    pub key: String,

    /// Request timeout in seconds (1-300)
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

/// Arguments for the `session` command.
#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Per-request timeout in seconds (1-300)
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
    /// Markdown output
    Md,
}

/// Report categories selectable with `--only`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CategoryArg {
    Valid,
    ZeroBalance,
    RateLimited,
    Invalid,
    Error,
    Duplicate,
}

impl From<CategoryArg> for ResultCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Valid => Self::Valid,
            CategoryArg::ZeroBalance => Self::ZeroBalance,
            CategoryArg::RateLimited => Self::RateLimited,
            CategoryArg::Invalid => Self::Invalid,
            CategoryArg::Error => Self::Error,
            CategoryArg::Duplicate => Self::Duplicate,
        }
    }
}
