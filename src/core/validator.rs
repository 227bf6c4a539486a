//! Single-credential validation.
//!
//! [`CredentialValidator`] runs one strategy against one key and always
//! produces a [`ValidationResult`]; no per-key failure escapes as an error.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Value, json};

use super::balance::check_balance;
use super::http::{FetchResponse, SecureFetcher, UpstreamRequest};
use super::models::{
    BALANCE_UNKNOWN, Credential, MSG_BALANCE_UNAVAILABLE, MSG_STREAM_ENDED, ProviderConfig,
    ValidationResult,
};
use super::provider::ProviderMeta;
use super::strategy::{ProviderStrategy, UpstreamFailure, strategy_for};
use crate::util::mask::fingerprint;

/// Anything that can turn a credential into a result.
///
/// Implemented by [`CredentialValidator`]; tests substitute scripted checkers.
pub trait CheckCredential: Send + Sync + 'static {
    fn check(
        &self,
        credential: &Credential,
        meta: &ProviderMeta,
        config: &ProviderConfig,
    ) -> impl Future<Output = ValidationResult> + Send;
}

/// Validates credentials against live upstream APIs.
#[derive(Debug, Clone)]
pub struct CredentialValidator {
    fetcher: Arc<SecureFetcher>,
}

impl CheckCredential for CredentialValidator {
    fn check(
        &self,
        credential: &Credential,
        meta: &ProviderMeta,
        config: &ProviderConfig,
    ) -> impl Future<Output = ValidationResult> + Send {
        self.validate(credential, meta, config)
    }
}

impl CredentialValidator {
    #[must_use]
    pub const fn new(fetcher: Arc<SecureFetcher>) -> Self {
        Self { fetcher }
    }

    /// Validate one credential.
    pub async fn validate(
        &self,
        credential: &Credential,
        meta: &ProviderMeta,
        config: &ProviderConfig,
    ) -> ValidationResult {
        let Some(strategy) = strategy_for(meta.api_style) else {
            tracing::warn!(
                provider = %meta.key,
                style = %meta.api_style,
                "No strategy for provider API style"
            );
            return ValidationResult::failed(
                credential,
                format!("unsupported API style for provider {}", meta.key),
            );
        };

        let request = strategy.build_request(&credential.token, meta, config);
        let mut result = self
            .execute(strategy, request, credential, config)
            .await;

        if result.is_valid
            && let Some(adapter) = meta.balance_check.as_deref()
        {
            self.augment_balance(&mut result, adapter, credential, meta, config)
                .await;
        }

        tracing::debug!(
            key = %fingerprint(&credential.token),
            order = credential.order,
            valid = result.is_valid,
            "Credential checked"
        );
        result
    }

    async fn execute(
        &self,
        strategy: &dyn ProviderStrategy,
        mut request: UpstreamRequest,
        credential: &Credential,
        config: &ProviderConfig,
    ) -> ValidationResult {
        let mut retried = false;

        loop {
            let response = match self.fetcher.fetch(&request, config.region()).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(
                        key = %fingerprint(&credential.token),
                        error = %e,
                        "Validation request failed"
                    );
                    return ValidationResult::network_error(credential, e.to_string());
                }
            };

            let status = response.status().as_u16();
            if !response.status().is_success() {
                let body = parse_body(response.text().await.unwrap_or_default());

                if !retried
                    && let Some(next) = strategy.on_fail(
                        &request,
                        &UpstreamFailure {
                            status,
                            body: &body,
                        },
                    )
                {
                    tracing::debug!(
                        key = %fingerprint(&credential.token),
                        status,
                        "Retrying with corrected request"
                    );
                    retried = true;
                    request = next;
                    continue;
                }

                return ValidationResult::invalid(credential, error_message(&body, status))
                    .with_status(status)
                    .with_raw_error(body);
            }

            if config.enable_stream {
                return read_first_chunk(response, credential).await.with_status(status);
            }

            let raw = match response.text().await {
                Ok(text) => serde_json::from_str(&text)
                    .unwrap_or_else(|_| json!({ "note": "response body was not valid JSON" })),
                Err(_) => json!({ "note": "response body could not be read" }),
            };
            return ValidationResult::valid(credential, Some(raw)).with_status(status);
        }
    }

    async fn augment_balance(
        &self,
        result: &mut ValidationResult,
        adapter: &str,
        credential: &Credential,
        meta: &ProviderMeta,
        config: &ProviderConfig,
    ) {
        let base_url = meta.base_url(config);
        match check_balance(
            &self.fetcher,
            adapter,
            &credential.token,
            &base_url,
            config.region(),
        )
        .await
        {
            Ok(info) => {
                result.balance = Some(info.balance);
                result.currency = info.currency;
                result.total_granted = info.total_granted;
                result.expires_at = info.expires_at;
                if info.message.is_some() {
                    result.message = info.message;
                }
            }
            Err(e) => {
                tracing::warn!(
                    key = %fingerprint(&credential.token),
                    adapter,
                    error = %e,
                    "Balance lookup failed"
                );
                result.balance = Some(BALANCE_UNKNOWN);
                result.message = Some(MSG_BALANCE_UNAVAILABLE.to_string());
            }
        }
    }
}

/// Confirm liveness from the first streamed chunk, then release the stream.
async fn read_first_chunk(mut response: FetchResponse, credential: &Credential) -> ValidationResult {
    let outcome = response.first_chunk_len().await;
    drop(response);

    match outcome {
        Ok(Some(len)) => {
            ValidationResult::valid(credential, Some(json!({ "stream": "first chunk received", "bytes": len })))
        }
        Ok(None) => ValidationResult::invalid(credential, MSG_STREAM_ENDED),
        Err(e) => ValidationResult::network_error(credential, e.to_string()),
    }
}

fn parse_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Derive a readable message from an upstream error body.
///
/// Tries, in order: the first `error.details[].reason`, a non-numeric
/// `error.code`, `error.message`, top-level `message`, `errors.message`,
/// `detail` (objects are stringified), then a fixed message
/// for 401/429, else `HTTP {status}`.
#[must_use]
pub fn error_message(body: &Value, status: u16) -> String {
    let error = &body["error"];

    let detail_reason = error["details"]
        .as_array()
        .and_then(|details| details.iter().find_map(|d| non_empty(&d["reason"])));
    if let Some(reason) = detail_reason {
        return reason;
    }

    if let Some(code) = non_empty(&error["code"]).filter(|c| c.parse::<f64>().is_err()) {
        return code;
    }

    let candidates = [
        &error["message"],
        &body["message"],
        &body["errors"]["message"],
    ];
    if let Some(message) = candidates.into_iter().find_map(non_empty) {
        return message;
    }

    match &body["detail"] {
        Value::Null => {}
        Value::String(s) if !s.trim().is_empty() => return s.trim().to_string(),
        Value::String(_) => {}
        other => return other.to_string(),
    }

    match status {
        401 => "authentication failed".to_string(),
        429 => "rate limited".to_string(),
        _ => format!("HTTP {status}"),
    }
}
