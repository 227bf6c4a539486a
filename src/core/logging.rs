//! Diagnostic logging to stderr (or a file).
//!
//! Stdout is reserved for reports and, under `keyprobe session`, for protocol
//! frames, so every subscriber here writes elsewhere.

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const LOG_LEVEL_ENV: &str = "KEYPROBE_LOG";
pub const LOG_FORMAT_ENV: &str = "KEYPROBE_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "KEYPROBE_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs (one event per line).
    Json,
    /// Compact logs (single line, terse).
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" => Some(Self::Human),
            "json" | "jsonl" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from CLI argument or env value.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "verbose" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "critical" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Log level from `KEYPROBE_LOG`.
#[must_use]
pub fn level_from_env() -> Option<LogLevel> {
    env_value(LOG_LEVEL_ENV).and_then(|v| LogLevel::from_arg(&v))
}

/// Log format from `KEYPROBE_LOG_FORMAT`.
#[must_use]
pub fn format_from_env() -> Option<LogFormat> {
    env_value(LOG_FORMAT_ENV).and_then(|v| LogFormat::from_arg(&v))
}

/// Log file from `KEYPROBE_LOG_FILE`.
#[must_use]
pub fn file_from_env() -> Option<PathBuf> {
    env_value(LOG_FILE_ENV).map(PathBuf::from)
}

/// Resolved logging settings.
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Merge CLI flags over environment variables over defaults.
    ///
    /// `--verbose` only raises the level when nothing else chose one.
    #[must_use]
    pub fn resolve(
        cli_level: Option<LogLevel>,
        json_output: bool,
        verbose: bool,
    ) -> Self {
        let level = cli_level
            .or_else(level_from_env)
            .unwrap_or(if verbose { LogLevel::Debug } else { LogLevel::Warn });
        let format = if json_output {
            LogFormat::Json
        } else {
            format_from_env().unwrap_or_default()
        };
        Self {
            level,
            format,
            file: file_from_env(),
        }
    }

    /// The filter directive applied when `RUST_LOG` is unset.
    #[must_use]
    pub fn directive(&self) -> String {
        format!("keyprobe={}", self.level.as_filter())
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(settings: &LogSettings) {
    let file = settings.file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    let writer = match file {
        Some(file) => BoxMakeWriter::new(file),
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.directive()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);

    let installed = match settings.format {
        LogFormat::Json => builder
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .try_init(),
        LogFormat::Compact => builder.compact().with_target(true).try_init(),
        LogFormat::Human => builder.with_target(false).without_time().try_init(),
    };
    if installed.is_ok() {
        tracing::debug!(level = settings.level.as_filter(), "Logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::ENV_LOCK;

    #[allow(unsafe_code)]
    fn with_env_var(key: &str, value: &str, f: impl FnOnce()) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let prior = std::env::var(key).ok();
        unsafe {
            std::env::set_var(key, value);
        }
        f();
        match prior {
            Some(val) => unsafe {
                std::env::set_var(key, val);
            },
            None => unsafe {
                std::env::remove_var(key);
            },
        }
    }

    #[test]
    fn level_parsing_accepts_aliases() {
        assert_eq!(LogLevel::from_arg("VERBOSE"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_arg("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_arg("critical"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_arg("loud"), None);
    }

    #[test]
    fn env_level_is_read() {
        with_env_var(LOG_LEVEL_ENV, "trace", || {
            assert_eq!(level_from_env(), Some(LogLevel::Trace));
        });
        with_env_var(LOG_LEVEL_ENV, "  ", || {
            assert_eq!(level_from_env(), None);
        });
    }

    #[test]
    fn cli_level_beats_env_and_verbose() {
        with_env_var(LOG_LEVEL_ENV, "error", || {
            let settings = LogSettings::resolve(Some(LogLevel::Info), false, true);
            assert_eq!(settings.level, LogLevel::Info);
            let settings = LogSettings::resolve(None, false, true);
            assert_eq!(settings.level, LogLevel::Error);
        });
    }

    #[test]
    fn json_output_forces_json_format() {
        with_env_var(LOG_FORMAT_ENV, "compact", || {
            assert_eq!(LogSettings::resolve(None, true, false).format, LogFormat::Json);
            assert_eq!(
                LogSettings::resolve(None, false, false).format,
                LogFormat::Compact
            );
        });
    }

    #[test]
    fn directive_targets_this_crate() {
        let settings = LogSettings {
            level: LogLevel::Debug,
            ..LogSettings::default()
        };
        assert_eq!(settings.directive(), "keyprobe=debug");
    }
}
