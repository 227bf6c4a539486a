//! Mock upstream providers.
//!
//! Each fixture points a [`ProviderMeta`] at a wiremock server so the real
//! validator, balance, and model-list code paths run end to end over HTTP.

use std::sync::Arc;
use std::time::Duration;

use keyprobe::core::http::{FetchOptions, SecureFetcher};
use keyprobe::core::models::{ApiStyle, ProviderConfig};
use keyprobe::core::provider::ProviderMeta;
use keyprobe::core::validator::CredentialValidator;
use wiremock::MockServer;

/// Fetcher that may reach the loopback mock server.
#[must_use]
pub fn local_fetcher() -> Arc<SecureFetcher> {
    let options = FetchOptions {
        timeout: Duration::from_secs(5),
        allow_private_targets: true,
        randomize_headers: false,
        ..FetchOptions::default()
    };
    Arc::new(SecureFetcher::new(&options).expect("build fetcher"))
}

#[must_use]
pub fn local_validator() -> CredentialValidator {
    CredentialValidator::new(local_fetcher())
}

/// Provider served at `{server}/v1`.
#[must_use]
pub fn mock_provider(server: &MockServer, api_style: ApiStyle) -> ProviderMeta {
    ProviderMeta {
        key: "mock".to_string(),
        display_name: "Mock".to_string(),
        api_style,
        default_base_url: format!("{}/v1", server.uri()),
        default_model: "mock-model".to_string(),
        balance_check: None,
        fetch_models: None,
        has_balance: false,
    }
}

/// Provider with a balance adapter.
#[must_use]
pub fn mock_provider_with_balance(server: &MockServer, adapter: &str) -> ProviderMeta {
    ProviderMeta {
        balance_check: Some(adapter.to_string()),
        has_balance: true,
        ..mock_provider(server, ApiStyle::Openai)
    }
}

/// Provider with a model-list adapter.
#[must_use]
pub fn mock_provider_with_models(server: &MockServer, api_style: ApiStyle, adapter: &str) -> ProviderMeta {
    ProviderMeta {
        fetch_models: Some(adapter.to_string()),
        ..mock_provider(server, api_style)
    }
}

#[must_use]
pub fn mock_config() -> ProviderConfig {
    ProviderConfig::for_provider("mock")
}

#[must_use]
pub fn streaming_config() -> ProviderConfig {
    ProviderConfig {
        enable_stream: true,
        ..mock_config()
    }
}
