//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

use crate::cli::args::OutputFormat;
use crate::core::models::ValidationResult;
use crate::core::orchestrator::RunReport;
use crate::core::provider::{ProviderMeta, ProviderRegistry};
use crate::core::store::ResultCategory;
use crate::error::Result;
use crate::util::mask::mask;

/// A finished run plus the display choices for it.
#[derive(Debug)]
pub struct ReportView<'a> {
    pub provider: &'a ProviderMeta,
    pub report: &'a RunReport,
    /// Categories to list; empty means all.
    pub only: Vec<ResultCategory>,
    /// Print full keys instead of masked ones.
    pub show_keys: bool,
}

impl ReportView<'_> {
    /// Categories to list, in display order.
    #[must_use]
    pub fn categories(&self) -> Vec<ResultCategory> {
        ResultCategory::ALL
            .into_iter()
            .filter(|c| self.only.is_empty() || self.only.contains(c))
            .collect()
    }

    /// Key as it should appear in output.
    #[must_use]
    pub fn display_token(&self, result: &ValidationResult) -> String {
        if self.show_keys {
            result.token.clone()
        } else {
            mask(&result.token)
        }
    }

    /// Keys that produced a result, repeats included.
    #[must_use]
    pub fn checked(&self) -> usize {
        self.report.results.len()
    }
}

/// Render a finished `check` run.
///
/// # Errors
///
/// Returns error if JSON serialization fails.
pub fn render_report(
    view: &ReportView<'_>,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_report(view, no_color)),
        OutputFormat::Json => robot::render_report_json(view, pretty),
        OutputFormat::Md => Ok(robot::render_report_md(view)),
    }
}

/// Render a model listing.
///
/// # Errors
///
/// Returns error if JSON serialization fails.
pub fn render_models(
    provider: &ProviderMeta,
    models: &[String],
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_models(provider, models, no_color)),
        OutputFormat::Json => robot::render_models_json(provider, models, pretty),
        OutputFormat::Md => Ok(robot::render_models_md(provider, models)),
    }
}

/// Render the provider table.
///
/// # Errors
///
/// Returns error if JSON serialization fails.
pub fn render_providers(
    registry: &ProviderRegistry,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_providers(registry, no_color)),
        OutputFormat::Json => robot::render_providers_json(registry, pretty),
        OutputFormat::Md => Ok(robot::render_providers_md(registry)),
    }
}
