//! Error types for keyprobe.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Only structural failures surface as [`KeyprobeError`]. Anything that goes
//! wrong while checking a single credential is folded into a
//! [`ValidationResult`](crate::core::models::ValidationResult) instead and
//! never reaches this type.
//!
//! - **Input**: empty key list, too many keys, bad concurrency
//! - **Network**: transport failures outside per-key validation (model lists, client setup)
//! - **Configuration**: config file parsing, validation, unknown providers
//! - **Provider**: upstream answered, but not with something usable
//! - **Session**: batch session protocol and reconnect failures
//! - **Internal**: I/O, JSON, and unclassified errors
//!
//! Each error has a stable error code (e.g., `KP-I001`) for programmatic handling.

pub mod suggestions;

use thiserror::Error;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Rejected input (empty, over the ceiling, out of range).
    Input,
    /// Network issues (timeout, DNS, connection refused).
    Network,
    /// Configuration issues (parse errors, invalid values, unknown providers).
    Configuration,
    /// Provider answered with an error or an unusable payload.
    Provider,
    /// Batch session failures (protocol errors, reconnect exhaustion).
    Session,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Input => "Input error",
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Provider => "Provider error",
            Self::Session => "Session error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Input => "I",
            Self::Network => "N",
            Self::Configuration => "C",
            Self::Provider => "P",
            Self::Session => "S",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Input or configuration rejected before any work started
    InvalidInput = 2,
    /// Run aborted after it started (session error, reconnects exhausted)
    RunAborted = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for keyprobe operations.
#[derive(Error, Debug)]
pub enum KeyprobeError {
    // ==========================================================================
    // Input errors (Category: Input)
    // ==========================================================================
    /// No credentials were supplied.
    #[error("no API keys supplied")]
    EmptyInput,

    /// More credentials than the configured ceiling.
    #[error("too many API keys: {count} supplied, limit is {limit}")]
    TooManyCredentials { count: usize, limit: usize },

    /// Concurrency outside the accepted range.
    #[error("concurrency must be between {min} and {max}, got {value}")]
    InvalidConcurrency { value: usize, min: usize, max: usize },

    // ==========================================================================
    // Network errors (Category: Network)
    // ==========================================================================
    /// Request timed out.
    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    /// Generic network error.
    #[error("network error: {0}")]
    Network(String),

    /// Target URL rejected by the outbound request guard.
    #[error("blocked request target {url}: {reason}")]
    BlockedTarget { url: String, reason: String },

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Provider key not present in the registry.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Region id not present in the region table.
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    // ==========================================================================
    // Provider errors (Category: Provider)
    // ==========================================================================
    /// Provider API returned an error.
    #[error("provider {provider} API error: {message}")]
    ProviderApiError {
        provider: String,
        status_code: Option<u16>,
        message: String,
    },

    /// Provider has no adapter for the requested capability.
    #[error("provider {provider} does not support {capability}")]
    Unsupported { provider: String, capability: String },

    /// Failed to parse provider response.
    #[error("failed to parse response: {0}")]
    ParseResponse(String),

    // ==========================================================================
    // Session errors (Category: Session)
    // ==========================================================================
    /// The batch session reported a fatal error.
    #[error("session error: {0}")]
    Session(String),

    /// Reconnect attempts for a batch were exhausted.
    #[error("connection lost; gave up after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },

    /// Could not open a session.
    #[error("failed to open session: {0}")]
    Connect(String),

    // ==========================================================================
    // Internal errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KeyprobeError {
    /// Map error to process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::EmptyInput
            | Self::TooManyCredentials { .. }
            | Self::InvalidConcurrency { .. }
            | Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::UnknownProvider(_)
            | Self::UnknownRegion(_)
            | Self::BlockedTarget { .. } => ExitCode::InvalidInput,

            Self::Session(_) | Self::ReconnectExhausted { .. } | Self::Connect(_) => {
                ExitCode::RunAborted
            }

            Self::Timeout(_) => ExitCode::Timeout,

            Self::Network(_)
            | Self::ProviderApiError { .. }
            | Self::Unsupported { .. }
            | Self::ParseResponse(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyInput | Self::TooManyCredentials { .. } | Self::InvalidConcurrency { .. } => {
                ErrorCategory::Input
            }

            Self::Timeout(_) | Self::Network(_) | Self::BlockedTarget { .. } => {
                ErrorCategory::Network
            }

            Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::UnknownProvider(_)
            | Self::UnknownRegion(_) => ErrorCategory::Configuration,

            Self::ProviderApiError { .. } | Self::Unsupported { .. } | Self::ParseResponse(_) => {
                ErrorCategory::Provider
            }

            Self::Session(_) | Self::ReconnectExhausted { .. } | Self::Connect(_) => {
                ErrorCategory::Session
            }

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `KP-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "KP-I001",
            Self::TooManyCredentials { .. } => "KP-I002",
            Self::InvalidConcurrency { .. } => "KP-I003",

            Self::Timeout(_) => "KP-N001",
            Self::BlockedTarget { .. } => "KP-N002",
            Self::Network(_) => "KP-N099",

            Self::Config(_) => "KP-C001",
            Self::ConfigParse { .. } => "KP-C002",
            Self::UnknownProvider(_) => "KP-C010",
            Self::UnknownRegion(_) => "KP-C011",

            Self::ProviderApiError { .. } => "KP-P001",
            Self::Unsupported { .. } => "KP-P002",
            Self::ParseResponse(_) => "KP-P020",

            Self::Session(_) => "KP-S001",
            Self::ReconnectExhausted { .. } => "KP-S002",
            Self::Connect(_) => "KP-S003",

            Self::Io(_) => "KP-X001",
            Self::Json(_) => "KP-X002",
            Self::Other(_) => "KP-X099",
        }
    }

    /// Returns whether retrying the same operation could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Network(_) | Self::Connect(_)
        )
    }

    /// Convert a reqwest error, keeping timeouts distinct.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result type alias using `KeyprobeError`.
pub type Result<T> = std::result::Result<T, KeyprobeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample_errors() -> Vec<KeyprobeError> {
        vec![
            KeyprobeError::EmptyInput,
            KeyprobeError::TooManyCredentials {
                count: 50_001,
                limit: 50_000,
            },
            KeyprobeError::InvalidConcurrency {
                value: 0,
                min: 1,
                max: 20,
            },
            KeyprobeError::Timeout(30),
            KeyprobeError::Network("reset".to_string()),
            KeyprobeError::BlockedTarget {
                url: "http://127.0.0.1".to_string(),
                reason: "loopback".to_string(),
            },
            KeyprobeError::Config("bad".to_string()),
            KeyprobeError::ConfigParse {
                path: "/tmp/c.toml".to_string(),
                message: "eof".to_string(),
            },
            KeyprobeError::UnknownProvider("nope".to_string()),
            KeyprobeError::UnknownRegion("mars".to_string()),
            KeyprobeError::ProviderApiError {
                provider: "openai".to_string(),
                status_code: Some(500),
                message: "boom".to_string(),
            },
            KeyprobeError::Unsupported {
                provider: "groq".to_string(),
                capability: "balance".to_string(),
            },
            KeyprobeError::ParseResponse("eof".to_string()),
            KeyprobeError::Session("bad start".to_string()),
            KeyprobeError::ReconnectExhausted { attempts: 3 },
            KeyprobeError::Connect("refused".to_string()),
            KeyprobeError::Io(std::io::Error::other("io")),
            KeyprobeError::Other(anyhow::anyhow!("other")),
        ]
    }

    #[test]
    fn error_category_code_prefix() {
        assert_eq!(ErrorCategory::Input.code_prefix(), "I");
        assert_eq!(ErrorCategory::Session.code_prefix(), "S");
        assert_eq!(ErrorCategory::Internal.code_prefix(), "X");
    }

    #[test]
    fn error_codes_follow_format() {
        for err in sample_errors() {
            let code = err.error_code();
            let expected_prefix = format!("KP-{}", err.category().code_prefix());
            assert!(
                code.starts_with(&expected_prefix),
                "{code} should start with {expected_prefix}"
            );
        }
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = sample_errors();
        let codes: HashSet<_> = errors.iter().map(KeyprobeError::error_code).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn input_errors_reject_before_run() {
        assert_eq!(KeyprobeError::EmptyInput.exit_code(), ExitCode::InvalidInput);
        assert_eq!(
            KeyprobeError::TooManyCredentials {
                count: 2,
                limit: 1
            }
            .exit_code(),
            ExitCode::InvalidInput
        );
    }

    #[test]
    fn session_errors_abort_run() {
        let err = KeyprobeError::ReconnectExhausted { attempts: 3 };
        assert_eq!(err.exit_code(), ExitCode::RunAborted);
        assert_eq!(err.category(), ErrorCategory::Session);
        assert!(err.to_string().contains("3 reconnect attempts"));
    }

    #[test]
    fn retryable_errors() {
        assert!(KeyprobeError::Timeout(5).is_retryable());
        assert!(KeyprobeError::Network("x".into()).is_retryable());
        assert!(!KeyprobeError::EmptyInput.is_retryable());
        assert!(!KeyprobeError::Session("x".into()).is_retryable());
    }
}
