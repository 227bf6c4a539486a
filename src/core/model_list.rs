//! Model-list adapters.
//!
//! Each adapter lists the models a key can see. Results are sorted and
//! de-duplicated so the same key always yields the same list.

use serde::Deserialize;

use super::http::{SecureFetcher, UpstreamRequest};
use super::models::ProviderConfig;
use super::provider::ProviderMeta;
use super::strategy::ANTHROPIC_VERSION;
use crate::error::{KeyprobeError, Result};
use crate::util::mask::fingerprint;

/// Names of the adapters this build knows.
pub const ADAPTERS: &[&str] = &["openai", "anthropic", "gemini", "siliconflow"];

#[derive(Debug, Deserialize)]
struct IdList {
    #[serde(default)]
    data: Vec<IdEntry>,
}

#[derive(Debug, Deserialize)]
struct IdEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GeminiList {
    #[serde(default)]
    models: Vec<GeminiEntry>,
}

#[derive(Debug, Deserialize)]
struct GeminiEntry {
    name: String,
}

/// List the models `token` can access on the provider.
///
/// # Errors
///
/// Returns `Unsupported` if the provider has no model-list adapter, or a
/// network/provider error if the listing request fails.
pub async fn fetch_models(
    fetcher: &SecureFetcher,
    meta: &ProviderMeta,
    token: &str,
    config: &ProviderConfig,
) -> Result<Vec<String>> {
    let adapter = meta
        .fetch_models
        .as_deref()
        .ok_or_else(|| unsupported(&meta.key))?;
    let base = meta.base_url(config);
    let region = config.region();

    tracing::debug!(
        provider = %meta.key,
        adapter,
        key = %fingerprint(token),
        "Listing models"
    );

    let models = match adapter {
        "openai" => list_ids(fetcher, &format!("{base}/models"), token, region).await?,
        "anthropic" => {
            let request = UpstreamRequest::get(format!("{base}/models"))
                .header("x-api-key", token)
                .header("anthropic-version", ANTHROPIC_VERSION);
            let list: IdList = fetcher.fetch_json(&request, region).await?;
            list.data.into_iter().map(|m| m.id).collect()
        }
        "gemini" => {
            let request =
                UpstreamRequest::get(format!("{base}/models")).header("x-goog-api-key", token);
            let list: GeminiList = fetcher.fetch_json(&request, region).await?;
            list.models
                .into_iter()
                .map(|m| match m.name.strip_prefix("models/") {
                    Some(name) => name.to_string(),
                    None => m.name,
                })
                .collect()
        }
        "siliconflow" => {
            let chat =
                list_ids(fetcher, &format!("{base}/models?sub_type=chat"), token, region).await?;
            if chat.is_empty() {
                tracing::debug!(provider = %meta.key, "Chat model list empty, using full list");
                list_ids(fetcher, &format!("{base}/models"), token, region).await?
            } else {
                chat
            }
        }
        _ => return Err(unsupported(&meta.key)),
    };

    Ok(normalize(models))
}

async fn list_ids(
    fetcher: &SecureFetcher,
    url: &str,
    token: &str,
    region: Option<&str>,
) -> Result<Vec<String>> {
    let request = UpstreamRequest::get(url).bearer(token);
    let list: IdList = fetcher.fetch_json(&request, region).await?;
    Ok(list.data.into_iter().map(|m| m.id).collect())
}

fn unsupported(provider: &str) -> KeyprobeError {
    KeyprobeError::Unsupported {
        provider: provider.to_string(),
        capability: "model listing".to_string(),
    }
}

fn normalize(mut models: Vec<String>) -> Vec<String> {
    models.retain(|m| !m.trim().is_empty());
    models.sort();
    models.dedup();
    models
}
