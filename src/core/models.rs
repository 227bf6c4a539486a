//! Core data models shared by the validator, sessions, and the orchestrator.
//!
//! Wire-facing types serialize camelCase to match the batch session protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message attached to transport failures.
pub const MSG_NETWORK_ERROR: &str = "network or unknown error";

/// Message for a stream that closed before yielding any data.
pub const MSG_STREAM_ENDED: &str = "validation failed (stream ended prematurely)";

/// Message for a valid key whose balance lookup failed.
pub const MSG_BALANCE_UNAVAILABLE: &str = "valid but balance unavailable";

/// Message attached to repeated keys.
pub const MSG_DUPLICATE: &str = "duplicate key";

/// Sentinel balance meaning "lookup failed".
pub const BALANCE_UNKNOWN: f64 = -1.0;

// =============================================================================
// Credential
// =============================================================================

/// An API key plus its position in the original input.
///
/// `order` is assigned once at parse time and identifies the credential for
/// the rest of the run, even if the same token text shows up twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub order: u64,
}

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>, order: u64) -> Self {
        Self {
            token: token.into(),
            order,
        }
    }
}

// =============================================================================
// API Style
// =============================================================================

/// Upstream wire format a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    /// `/chat/completions` with `max_tokens`.
    Openai,
    /// `/responses` with `max_output_tokens`.
    OpenaiResponses,
    /// `/messages` with `x-api-key` and `anthropic-version`.
    Anthropic,
    /// `models/{model}:generateContent`.
    Gemini,
    /// Anything the registry named that we have no strategy for.
    #[serde(other)]
    Unsupported,
}

impl ApiStyle {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::OpenaiResponses => "openai_responses",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for ApiStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Provider Config
// =============================================================================

/// Per-run provider settings, cloned into every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// Registry key of the provider (e.g. `openai`).
    pub provider: String,
    /// API base URL; empty means the provider's default.
    pub base_url: String,
    /// Model used for the validation request; empty means the provider's default.
    pub model: String,
    /// Region id used to pick an egress proxy; empty means direct.
    pub region: String,
    /// Confirm liveness from the first streamed chunk instead of a full body.
    pub enable_stream: bool,
    pub validation_prompt: String,
    pub validation_max_tokens: u32,
    pub validation_max_output_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            base_url: String::new(),
            model: String::new(),
            region: String::new(),
            enable_stream: false,
            validation_prompt: "Hi".to_string(),
            validation_max_tokens: 1,
            // The responses API rejects values below 16.
            validation_max_output_tokens: 16,
        }
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn for_provider(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    /// Region id, or `None` when unset.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        let region = self.region.trim();
        (!region.is_empty()).then_some(region)
    }
}

// =============================================================================
// Validation Result
// =============================================================================

/// Outcome of validating one credential.
///
/// Created exactly once per credential per run and never mutated after it
/// leaves the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub token: String,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set when the outcome is inconclusive (transport failure, bad provider style).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_error: Option<Value>,
    /// Upstream HTTP status of the final validation request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_granted: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// Set on repeats of a token seen earlier in the input; never checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    pub order: u64,
}

impl ValidationResult {
    fn base(credential: &Credential, is_valid: bool) -> Self {
        Self {
            token: credential.token.clone(),
            is_valid,
            message: None,
            error: None,
            raw_response: None,
            raw_error: None,
            status_code: None,
            balance: None,
            currency: None,
            total_granted: None,
            expires_at: None,
            duplicate: None,
            order: credential.order,
        }
    }

    /// A key the upstream accepted.
    #[must_use]
    pub fn valid(credential: &Credential, raw_response: Option<Value>) -> Self {
        Self {
            raw_response,
            ..Self::base(credential, true)
        }
    }

    /// A key the upstream rejected.
    #[must_use]
    pub fn invalid(credential: &Credential, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::base(credential, false)
        }
    }

    /// An inconclusive outcome; the key could not be checked.
    #[must_use]
    pub fn failed(credential: &Credential, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            error: Some(true),
            ..Self::base(credential, false)
        }
    }

    /// A transport failure, with the underlying error kept in `raw_error`.
    #[must_use]
    pub fn network_error(credential: &Credential, detail: impl Into<String>) -> Self {
        Self {
            raw_error: Some(Value::String(detail.into())),
            ..Self::failed(credential, MSG_NETWORK_ERROR)
        }
    }

    /// A repeat of a token seen earlier in the same input.
    #[must_use]
    pub fn duplicate(credential: &Credential) -> Self {
        Self {
            duplicate: Some(true),
            ..Self::invalid(credential, MSG_DUPLICATE)
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    #[must_use]
    pub fn with_raw_error(mut self, raw: Value) -> Self {
        self.raw_error = Some(raw);
        self
    }

    /// Whether the result is inconclusive rather than a definite verdict.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.unwrap_or(false)
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.duplicate.unwrap_or(false)
    }
}
