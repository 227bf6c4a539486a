//! Provider descriptors and registry.
//!
//! The registry is a read-only lookup table keyed by provider id. It starts
//! from the built-in table below and can be extended (or overridden) by
//! `[[providers]]` entries in the config file. It is loaded once at startup.

use serde::{Deserialize, Serialize};

use super::models::{ApiStyle, ProviderConfig};
use crate::error::{KeyprobeError, Result};

// =============================================================================
// Provider Meta
// =============================================================================

/// Static description of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMeta {
    /// Registry key (CLI name).
    pub key: String,
    #[serde(default)]
    pub display_name: String,
    pub api_style: ApiStyle,
    pub default_base_url: String,
    #[serde(default)]
    pub default_model: String,
    /// Balance adapter name (see `core::balance`).
    #[serde(default)]
    pub balance_check: Option<String>,
    /// Model-list adapter name (see `core::model_list`).
    #[serde(default)]
    pub fetch_models: Option<String>,
    #[serde(default)]
    pub has_balance: bool,
}

impl ProviderMeta {
    fn builtin(
        key: &str,
        display_name: &str,
        api_style: ApiStyle,
        default_base_url: &str,
        default_model: &str,
    ) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            api_style,
            default_base_url: default_base_url.to_string(),
            default_model: default_model.to_string(),
            balance_check: None,
            fetch_models: None,
            has_balance: false,
        }
    }

    fn with_balance(mut self, adapter: &str) -> Self {
        self.balance_check = Some(adapter.to_string());
        self.has_balance = true;
        self
    }

    fn with_models(mut self, adapter: &str) -> Self {
        self.fetch_models = Some(adapter.to_string());
        self
    }

    /// Base URL for a run: the configured one, else the provider default.
    /// Never ends with `/`.
    #[must_use]
    pub fn base_url(&self, config: &ProviderConfig) -> String {
        let configured = config.base_url.trim();
        let base = if configured.is_empty() {
            self.default_base_url.as_str()
        } else {
            configured
        };
        base.trim_end_matches('/').to_string()
    }

    /// Model for a run: the configured one, else the provider default.
    #[must_use]
    pub fn model<'a>(&'a self, config: &'a ProviderConfig) -> &'a str {
        let configured = config.model.trim();
        if configured.is_empty() {
            &self.default_model
        } else {
            configured
        }
    }

    /// Display name, falling back to the key.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.key
        } else {
            &self.display_name
        }
    }
}

// =============================================================================
// Provider Registry
// =============================================================================

/// Lookup table of known providers, in display order.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<ProviderMeta>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProviderRegistry {
    /// The built-in provider table.
    #[must_use]
    pub fn builtin() -> Self {
        let providers = vec![
            ProviderMeta::builtin(
                "openai",
                "OpenAI",
                ApiStyle::Openai,
                "https://api.openai.com/v1",
                "gpt-4o-mini",
            )
            .with_models("openai"),
            ProviderMeta::builtin(
                "openai-responses",
                "OpenAI (Responses API)",
                ApiStyle::OpenaiResponses,
                "https://api.openai.com/v1",
                "gpt-4o-mini",
            )
            .with_models("openai"),
            ProviderMeta::builtin(
                "anthropic",
                "Anthropic",
                ApiStyle::Anthropic,
                "https://api.anthropic.com/v1",
                "claude-3-5-haiku-latest",
            )
            .with_models("anthropic"),
            ProviderMeta::builtin(
                "gemini",
                "Google Gemini",
                ApiStyle::Gemini,
                "https://generativelanguage.googleapis.com/v1beta",
                "gemini-2.0-flash",
            )
            .with_models("gemini"),
            ProviderMeta::builtin(
                "deepseek",
                "DeepSeek",
                ApiStyle::Openai,
                "https://api.deepseek.com/v1",
                "deepseek-chat",
            )
            .with_balance("deepseek")
            .with_models("openai"),
            ProviderMeta::builtin(
                "moonshot",
                "Moonshot",
                ApiStyle::Openai,
                "https://api.moonshot.cn/v1",
                "moonshot-v1-8k",
            )
            .with_balance("moonshot")
            .with_models("openai"),
            ProviderMeta::builtin(
                "siliconflow",
                "SiliconFlow",
                ApiStyle::Openai,
                "https://api.siliconflow.cn/v1",
                "Qwen/Qwen2.5-7B-Instruct",
            )
            .with_balance("siliconflow")
            .with_models("siliconflow"),
            ProviderMeta::builtin(
                "openrouter",
                "OpenRouter",
                ApiStyle::Openai,
                "https://openrouter.ai/api/v1",
                "openai/gpt-4o-mini",
            )
            .with_balance("openrouter")
            .with_models("openai"),
            ProviderMeta::builtin(
                "groq",
                "Groq",
                ApiStyle::Openai,
                "https://api.groq.com/openai/v1",
                "llama-3.1-8b-instant",
            )
            .with_models("openai"),
            ProviderMeta::builtin(
                "xai",
                "xAI",
                ApiStyle::Openai,
                "https://api.x.ai/v1",
                "grok-3-mini",
            )
            .with_models("openai"),
        ];
        Self { providers }
    }

    /// Add custom providers; an entry with an existing key replaces it.
    #[must_use]
    pub fn with_custom(mut self, custom: impl IntoIterator<Item = ProviderMeta>) -> Self {
        for mut meta in custom {
            meta.key = meta.key.trim().to_lowercase();
            if meta.balance_check.is_some() {
                meta.has_balance = true;
            }
            if let Some(existing) = self.providers.iter_mut().find(|p| p.key == meta.key) {
                tracing::debug!(provider = %meta.key, "Overriding built-in provider");
                *existing = meta;
            } else {
                self.providers.push(meta);
            }
        }
        self
    }

    /// Look up a provider by key (case-insensitive).
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&ProviderMeta> {
        let key = key.trim().to_lowercase();
        self.providers.iter().find(|p| p.key == key)
    }

    /// Look up a provider by key.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProvider` if the key is not registered.
    pub fn get(&self, key: &str) -> Result<&ProviderMeta> {
        self.lookup(key)
            .ok_or_else(|| KeyprobeError::UnknownProvider(key.to_string()))
    }

    /// All providers in display order.
    #[must_use]
    pub fn all(&self) -> &[ProviderMeta] {
        &self.providers
    }

    /// Comma-separated list of keys, for error messages.
    #[must_use]
    pub fn keys(&self) -> String {
        self.providers
            .iter()
            .map(|p| p.key.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
