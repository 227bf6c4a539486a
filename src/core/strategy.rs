//! Request builders for the supported upstream wire styles.
//!
//! A strategy turns `(token, config)` into an [`UpstreamRequest`] and may
//! offer one corrective retry when the upstream rejects a request. Strategies
//! hold no state; all I/O happens in the validator.

use serde_json::{Value, json};

use super::http::UpstreamRequest;
use super::models::{ApiStyle, ProviderConfig};
use super::provider::ProviderMeta;

/// Version header sent to Anthropic-style endpoints.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A failed upstream response, as seen by [`ProviderStrategy::on_fail`].
#[derive(Debug, Clone, Copy)]
pub struct UpstreamFailure<'a> {
    pub status: u16,
    /// Parsed JSON body, or the raw text wrapped in `Value::String`.
    pub body: &'a Value,
}

/// Per-style request building and failure recovery.
pub trait ProviderStrategy: Send + Sync {
    /// The wire style this strategy speaks.
    fn style(&self) -> ApiStyle;

    /// Build the validation request.
    fn build_request(
        &self,
        token: &str,
        meta: &ProviderMeta,
        config: &ProviderConfig,
    ) -> UpstreamRequest;

    /// Optionally rewrite a failed request for a single retry.
    fn on_fail(
        &self,
        _request: &UpstreamRequest,
        _failure: &UpstreamFailure<'_>,
    ) -> Option<UpstreamRequest> {
        None
    }
}

/// Look up the strategy for a wire style.
#[must_use]
pub fn strategy_for(style: ApiStyle) -> Option<&'static dyn ProviderStrategy> {
    match style {
        ApiStyle::Openai => Some(&OpenAiChat),
        ApiStyle::OpenaiResponses => Some(&OpenAiResponses),
        ApiStyle::Anthropic => Some(&Anthropic),
        ApiStyle::Gemini => Some(&Gemini),
        ApiStyle::Unsupported => None,
    }
}

// =============================================================================
// OpenAI chat completions
// =============================================================================

/// `POST {base}/chat/completions`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiChat;

impl OpenAiChat {
    fn wants_completion_tokens(failure: &UpstreamFailure<'_>) -> bool {
        let error = &failure.body["error"];
        error["code"].as_str() == Some("unsupported_parameter")
            && error["param"].as_str() == Some("max_tokens")
    }
}

impl ProviderStrategy for OpenAiChat {
    fn style(&self) -> ApiStyle {
        ApiStyle::Openai
    }

    fn build_request(
        &self,
        token: &str,
        meta: &ProviderMeta,
        config: &ProviderConfig,
    ) -> UpstreamRequest {
        let mut body = json!({
            "model": meta.model(config),
            "messages": [{ "role": "user", "content": config.validation_prompt }],
            "max_tokens": config.validation_max_tokens,
        });
        if config.enable_stream {
            body["stream"] = Value::Bool(true);
        }
        UpstreamRequest::post_json(format!("{}/chat/completions", meta.base_url(config)), body)
            .bearer(token)
    }

    /// Newer models reject `max_tokens`; resend with `max_completion_tokens`.
    /// A request that already carries `max_completion_tokens` is never retried.
    fn on_fail(
        &self,
        request: &UpstreamRequest,
        failure: &UpstreamFailure<'_>,
    ) -> Option<UpstreamRequest> {
        if !Self::wants_completion_tokens(failure) {
            return None;
        }
        let body = request.body.as_ref()?.as_object()?;
        if body.contains_key("max_completion_tokens") {
            return None;
        }

        let mut body = body.clone();
        let limit = body.remove("max_tokens")?;
        body.insert("max_completion_tokens".to_string(), limit);

        Some(UpstreamRequest {
            body: Some(Value::Object(body)),
            ..request.clone()
        })
    }
}

// =============================================================================
// OpenAI responses
// =============================================================================

/// `POST {base}/responses`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiResponses;

impl ProviderStrategy for OpenAiResponses {
    fn style(&self) -> ApiStyle {
        ApiStyle::OpenaiResponses
    }

    fn build_request(
        &self,
        token: &str,
        meta: &ProviderMeta,
        config: &ProviderConfig,
    ) -> UpstreamRequest {
        let mut body = json!({
            "model": meta.model(config),
            "input": config.validation_prompt,
            "max_output_tokens": config.validation_max_output_tokens,
        });
        if config.enable_stream {
            body["stream"] = Value::Bool(true);
        }
        UpstreamRequest::post_json(format!("{}/responses", meta.base_url(config)), body)
            .bearer(token)
    }
}

// =============================================================================
// Anthropic messages
// =============================================================================

/// `POST {base}/messages` with vendor auth and version headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anthropic;

impl ProviderStrategy for Anthropic {
    fn style(&self) -> ApiStyle {
        ApiStyle::Anthropic
    }

    fn build_request(
        &self,
        token: &str,
        meta: &ProviderMeta,
        config: &ProviderConfig,
    ) -> UpstreamRequest {
        let mut body = json!({
            "model": meta.model(config),
            "max_tokens": config.validation_max_tokens,
            "messages": [{ "role": "user", "content": config.validation_prompt }],
        });
        if config.enable_stream {
            body["stream"] = Value::Bool(true);
        }
        UpstreamRequest::post_json(format!("{}/messages", meta.base_url(config)), body)
            .header("x-api-key", token)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }
}

// =============================================================================
// Gemini generateContent
// =============================================================================

/// `POST {base}/models/{model}:generateContent` (or the SSE stream variant).
#[derive(Debug, Clone, Copy, Default)]
pub struct Gemini;

impl ProviderStrategy for Gemini {
    fn style(&self) -> ApiStyle {
        ApiStyle::Gemini
    }

    fn build_request(
        &self,
        token: &str,
        meta: &ProviderMeta,
        config: &ProviderConfig,
    ) -> UpstreamRequest {
        let model = meta.model(config);
        let model = model.strip_prefix("models/").unwrap_or(model);
        let action = if config.enable_stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": config.validation_prompt }] }],
            "generationConfig": { "maxOutputTokens": config.validation_max_output_tokens },
        });
        UpstreamRequest::post_json(
            format!("{}/models/{model}:{action}", meta.base_url(config)),
            body,
        )
        .header("x-goog-api-key", token)
    }
}
