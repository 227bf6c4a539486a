//! Robot-mode output (JSON and Markdown).
//!
//! Provides stable, token-efficient output for scripts and agents.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ReportView;
use crate::core::models::ValidationResult;
use crate::core::orchestrator::RunPhase;
use crate::core::provider::{ProviderMeta, ProviderRegistry};
use crate::core::store::CategoryCounts;
use crate::error::Result;
use crate::util::format::format_balance;
use crate::util::mask::fingerprint;

pub const SCHEMA_VERSION: &str = "keyprobe.v1";

/// Top-level JSON envelope for robot mode output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,
    pub errors: Vec<String>,
}

impl<T> RobotOutput<T> {
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            command: command.into(),
            data,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

// =============================================================================
// Check report
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckData<'a> {
    provider: &'a str,
    phase: RunPhase,
    total: usize,
    checked: usize,
    elapsed_ms: u128,
    counts: CategoryCounts,
    results: Vec<ResultRow<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultRow<'a> {
    order: u64,
    category: &'static str,
    key: String,
    fingerprint: String,
    is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_granted: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<&'a str>,
}

impl<'a> ResultRow<'a> {
    fn new(view: &ReportView<'_>, result: &'a ValidationResult) -> Self {
        Self {
            order: result.order,
            category: crate::core::store::categorize(result).as_str(),
            key: view.display_token(result),
            fingerprint: fingerprint(&result.token),
            is_valid: result.is_valid,
            status_code: result.status_code,
            message: result.message.as_deref(),
            balance: result.balance,
            currency: result.currency.as_deref(),
            total_granted: result.total_granted,
            expires_at: result.expires_at.as_deref(),
        }
    }
}

/// Render a run report as JSON.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn render_report_json(view: &ReportView<'_>, pretty: bool) -> Result<String> {
    let report = view.report;
    let categories = view.categories();
    let results = report
        .results
        .all()
        .into_iter()
        .filter(|r| categories.contains(&crate::core::store::categorize(r)))
        .map(|r| ResultRow::new(view, r))
        .collect();

    let data = CheckData {
        provider: &view.provider.key,
        phase: report.phase,
        total: report.total,
        checked: view.checked(),
        elapsed_ms: report.elapsed.as_millis(),
        counts: report.counts(),
        results,
    };
    let errors = report.error.iter().map(ToString::to_string).collect();
    to_json(&RobotOutput::new("check", data).with_errors(errors), pretty)
}

/// Render a run report as Markdown.
#[must_use]
pub fn render_report_md(view: &ReportView<'_>) -> String {
    let report = view.report;
    let counts = report.counts();
    let mut out = String::new();

    let _ = writeln!(out, "# {} key check\n", view.provider.label());
    let _ = writeln!(out, "- phase: {}", phase_name(report.phase));
    let _ = writeln!(out, "- checked: {} of {}", view.checked(), report.total);
    let _ = writeln!(out, "- elapsed_ms: {}", report.elapsed.as_millis());
    if let Some(error) = &report.error {
        let _ = writeln!(out, "- error: {error}");
    }

    for category in view.categories() {
        let bucket = report.results.in_category(category);
        if bucket.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n## {} ({})\n", category.label(), counts.get(category));
        let _ = writeln!(out, "| # | key | status | balance | message |");
        let _ = writeln!(out, "|---|-----|--------|---------|---------|");
        for result in bucket {
            let status = result
                .status_code
                .map_or_else(String::new, |s| s.to_string());
            let balance = result.balance.map_or_else(String::new, |b| {
                format_balance(b, result.currency.as_deref())
            });
            let message = result
                .message
                .as_deref()
                .unwrap_or_default()
                .replace('|', "\\|");
            let _ = writeln!(
                out,
                "| {} | `{}` | {status} | {balance} | {message} |",
                result.order + 1,
                view.display_token(result),
            );
        }
    }
    out
}

const fn phase_name(phase: RunPhase) -> &'static str {
    match phase {
        RunPhase::Running => "running",
        RunPhase::Paused => "paused",
        RunPhase::Completed => "completed",
        RunPhase::Stopped => "stopped",
        RunPhase::Failed => "failed",
    }
}

// =============================================================================
// Models and providers
// =============================================================================

#[derive(Debug, Serialize)]
struct ModelsData<'a> {
    provider: &'a str,
    models: &'a [String],
}

/// Render a model listing as JSON.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn render_models_json(provider: &ProviderMeta, models: &[String], pretty: bool) -> Result<String> {
    let data = ModelsData {
        provider: &provider.key,
        models,
    };
    to_json(&RobotOutput::new("models", data), pretty)
}

/// Render a model listing as Markdown.
#[must_use]
pub fn render_models_md(provider: &ProviderMeta, models: &[String]) -> String {
    let mut out = format!("## {} models\n\n", provider.label());
    for model in models {
        let _ = writeln!(out, "- {model}");
    }
    out
}

/// Render the provider table as JSON.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn render_providers_json(registry: &ProviderRegistry, pretty: bool) -> Result<String> {
    to_json(&RobotOutput::new("providers", registry.all()), pretty)
}

/// Render the provider table as Markdown.
#[must_use]
pub fn render_providers_md(registry: &ProviderRegistry) -> String {
    let mut out = String::from("| key | name | api style | balance | models | base url |\n");
    out.push_str("|-----|------|-----------|---------|--------|----------|\n");
    for meta in registry.all() {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            meta.key,
            meta.label(),
            meta.api_style,
            meta.has_balance,
            meta.fetch_models.is_some(),
            meta.default_base_url,
        );
    }
    out
}
