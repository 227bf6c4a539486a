//! Provider balance adapters.
//!
//! Each adapter calls one provider-specific endpoint and normalizes the
//! answer into a [`BalanceInfo`]. Endpoints are derived from the run's base
//! URL so self-hosted mirrors and test servers work the same way.

use serde::Deserialize;
use serde_json::Value;

use super::http::{SecureFetcher, UpstreamRequest};
use crate::error::{KeyprobeError, Result};

/// Normalized account balance.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceInfo {
    pub balance: f64,
    pub currency: Option<String>,
    pub total_granted: Option<f64>,
    pub expires_at: Option<String>,
    pub message: Option<String>,
}

impl BalanceInfo {
    fn new(balance: f64, currency: &str) -> Self {
        Self {
            balance,
            currency: Some(currency.to_string()),
            total_granted: None,
            expires_at: None,
            message: None,
        }
    }
}

/// Names of the adapters this build knows.
pub const ADAPTERS: &[&str] = &["deepseek", "moonshot", "siliconflow", "openrouter"];

/// Run the named balance adapter.
///
/// # Errors
///
/// Returns error for an unknown adapter, a failed request, or a payload
/// that does not carry a balance.
pub async fn check_balance(
    fetcher: &SecureFetcher,
    adapter: &str,
    token: &str,
    base_url: &str,
    region: Option<&str>,
) -> Result<BalanceInfo> {
    let base = base_url.trim_end_matches('/');
    let request = match adapter {
        "deepseek" => UpstreamRequest::get(format!("{}/user/balance", strip_suffix(base, "/v1"))),
        "moonshot" => {
            UpstreamRequest::get(format!("{}/v1/users/me/balance", strip_suffix(base, "/v1")))
        }
        "siliconflow" => {
            UpstreamRequest::get(format!("{}/v1/user/info", strip_suffix(base, "/v1")))
        }
        "openrouter" => {
            UpstreamRequest::get(format!("{}/api/v1/credits", strip_suffix(base, "/api/v1")))
        }
        other => {
            return Err(KeyprobeError::Unsupported {
                provider: other.to_string(),
                capability: "balance check".to_string(),
            });
        }
    }
    .bearer(token)
    .header("accept", "application/json");

    let payload: Value = fetcher.fetch_json(&request, region).await?;

    match adapter {
        "deepseek" => parse_deepseek(payload),
        "moonshot" => parse_moonshot(&payload, base),
        "siliconflow" => parse_siliconflow(&payload),
        _ => parse_openrouter(&payload),
    }
}

fn strip_suffix<'a>(base: &'a str, suffix: &str) -> &'a str {
    base.strip_suffix(suffix).unwrap_or(base)
}

/// Read a number that may be encoded as a JSON string.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn missing(field: &str) -> KeyprobeError {
    KeyprobeError::ParseResponse(format!("balance response missing {field}"))
}

// =============================================================================
// DeepSeek
// =============================================================================

#[derive(Debug, Deserialize)]
struct DeepSeekBalance {
    #[serde(default)]
    is_available: bool,
    #[serde(default)]
    balance_infos: Vec<DeepSeekBalanceInfo>,
}

#[derive(Debug, Deserialize)]
struct DeepSeekBalanceInfo {
    currency: String,
    total_balance: Value,
    #[serde(default)]
    granted_balance: Value,
}

fn parse_deepseek(payload: Value) -> Result<BalanceInfo> {
    let parsed: DeepSeekBalance = serde_json::from_value(payload)?;
    let info = parsed
        .balance_infos
        .first()
        .ok_or_else(|| missing("balance_infos"))?;
    let balance = number(&info.total_balance).ok_or_else(|| missing("total_balance"))?;

    let mut result = BalanceInfo::new(balance, &info.currency);
    result.total_granted = number(&info.granted_balance);
    if !parsed.is_available {
        result.message = Some("valid but balance is not available for use".to_string());
    }
    Ok(result)
}

// =============================================================================
// Moonshot
// =============================================================================

fn parse_moonshot(payload: &Value, base: &str) -> Result<BalanceInfo> {
    let data = &payload["data"];
    let balance = number(&data["available_balance"]).ok_or_else(|| missing("available_balance"))?;
    // The .cn endpoint bills in CNY, the international one in USD.
    let currency = if base.contains("moonshot.cn") { "CNY" } else { "USD" };

    let mut result = BalanceInfo::new(balance, currency);
    result.total_granted = number(&data["voucher_balance"]);
    Ok(result)
}

// =============================================================================
// SiliconFlow
// =============================================================================

fn parse_siliconflow(payload: &Value) -> Result<BalanceInfo> {
    let data = &payload["data"];
    let balance = number(&data["totalBalance"])
        .or_else(|| number(&data["balance"]))
        .ok_or_else(|| missing("totalBalance"))?;

    let mut result = BalanceInfo::new(balance, "CNY");
    result.total_granted = number(&data["balance"]);
    Ok(result)
}

// =============================================================================
// OpenRouter
// =============================================================================

fn parse_openrouter(payload: &Value) -> Result<BalanceInfo> {
    let data = &payload["data"];
    let credits = number(&data["total_credits"]).ok_or_else(|| missing("total_credits"))?;
    let usage = number(&data["total_usage"]).unwrap_or(0.0);

    let mut result = BalanceInfo::new(credits - usage, "USD");
    result.total_granted = Some(credits);
    Ok(result)
}
