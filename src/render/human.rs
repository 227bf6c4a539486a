//! Human-readable terminal output.

use std::fmt::Write;

use colored::{Color, Colorize};

use super::ReportView;
use crate::core::models::ValidationResult;
use crate::core::orchestrator::RunPhase;
use crate::core::provider::{ProviderMeta, ProviderRegistry};
use crate::core::store::ResultCategory;
use crate::util::format::{format_balance, format_count, format_elapsed};

const fn category_color(category: ResultCategory) -> Color {
    match category {
        ResultCategory::Valid => Color::Green,
        ResultCategory::ZeroBalance | ResultCategory::RateLimited => Color::Yellow,
        ResultCategory::Invalid => Color::Red,
        ResultCategory::Error => Color::Magenta,
        ResultCategory::Duplicate => Color::BrightBlack,
    }
}

fn paint(text: &str, color: Color, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.color(color).to_string()
    }
}

fn bold(text: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.bold().to_string()
    }
}

fn dim(text: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.dimmed().to_string()
    }
}

/// Render a finished run.
#[must_use]
pub fn render_report(view: &ReportView<'_>, no_color: bool) -> String {
    let report = view.report;
    let counts = report.counts();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} {} of {} keys checked in {}",
        bold(view.provider.label(), no_color),
        format_count(view.checked()),
        format_count(report.total),
        format_elapsed(report.elapsed),
    );

    for category in view.categories() {
        let bucket = report.results.in_category(category);
        if bucket.is_empty() {
            continue;
        }
        let header = format!("{} ({})", category.label(), format_count(bucket.len()));
        let _ = writeln!(out, "\n{}", paint(&header, category_color(category), no_color));
        for result in bucket {
            let _ = writeln!(out, "  {}", render_row(view, result, no_color));
        }
    }

    let _ = writeln!(out);
    let summary: Vec<String> = ResultCategory::ALL
        .into_iter()
        .filter(|c| counts.get(*c) > 0)
        .map(|c| {
            paint(
                &format!("{} {}", format_count(counts.get(c)), c.label().to_lowercase()),
                category_color(c),
                no_color,
            )
        })
        .collect();
    if !summary.is_empty() {
        let _ = writeln!(out, "{}", summary.join(&dim(" · ", no_color)));
    }

    match report.phase {
        RunPhase::Stopped => {
            let _ = writeln!(
                out,
                "{}",
                paint(
                    &format!(
                        "Run stopped: {} keys left unchecked",
                        format_count(report.total.saturating_sub(view.checked()))
                    ),
                    Color::Yellow,
                    no_color,
                )
            );
        }
        RunPhase::Failed => {
            let reason = report
                .error
                .as_ref()
                .map_or_else(|| "unknown error".to_string(), ToString::to_string);
            let _ = writeln!(
                out,
                "{}",
                paint(&format!("Run failed: {reason}"), Color::Red, no_color)
            );
        }
        _ => {}
    }

    out
}

fn render_row(view: &ReportView<'_>, result: &ValidationResult, no_color: bool) -> String {
    let mut row = format!(
        "{} {}",
        dim(&format!("#{:<5}", result.order + 1), no_color),
        view.display_token(result)
    );
    if let Some(balance) = result.balance {
        let _ = write!(row, "  {}", format_balance(balance, result.currency.as_deref()));
    }
    if let Some(status) = result.status_code {
        let _ = write!(row, "  {}", dim(&format!("HTTP {status}"), no_color));
    }
    if let Some(message) = result.message.as_deref().filter(|m| !m.is_empty()) {
        let _ = write!(row, "  {}", dim(message, no_color));
    }
    row
}

/// Render a model listing.
#[must_use]
pub fn render_models(provider: &ProviderMeta, models: &[String], no_color: bool) -> String {
    let mut out = format!(
        "{} models ({})\n",
        bold(provider.label(), no_color),
        format_count(models.len())
    );
    for model in models {
        let _ = writeln!(out, "  {model}");
    }
    out
}

/// Render the provider table.
#[must_use]
pub fn render_providers(registry: &ProviderRegistry, no_color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        bold(
            &format!(
                "{:<18} {:<24} {:<18} {:<8} {:<7} {}",
                "KEY", "NAME", "API STYLE", "BALANCE", "MODELS", "BASE URL"
            ),
            no_color
        )
    );
    for meta in registry.all() {
        let yes_no = |flag: bool| if flag { "yes" } else { "-" };
        let _ = writeln!(
            out,
            "{:<18} {:<24} {:<18} {:<8} {:<7} {}",
            meta.key,
            meta.label(),
            meta.api_style.as_str(),
            yes_no(meta.has_balance),
            yes_no(meta.fetch_models.is_some()),
            dim(&meta.default_base_url, no_color),
        );
    }
    out
}
