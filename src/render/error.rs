//! Error rendering.
//!
//! Human mode prints the message with fix suggestions; JSON and Markdown
//! modes emit a structured error object for machine consumption.

use colored::Colorize;
use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::KeyprobeError;

/// Render an error for the selected output format.
#[must_use]
pub fn render_error(error: &KeyprobeError, format: OutputFormat, no_color: bool, pretty: bool) -> String {
    match format {
        OutputFormat::Json => render_error_json(error, pretty),
        OutputFormat::Md => render_error_json(error, true),
        OutputFormat::Human => render_human(error, no_color),
    }
}

/// Render an error as structured JSON.
#[must_use]
pub fn render_error_json(error: &KeyprobeError, pretty: bool) -> String {
    let body = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&body)
    } else {
        serde_json::to_string(&body)
    };
    rendered.unwrap_or_else(|_| render_human(error, true))
}

fn render_human(error: &KeyprobeError, no_color: bool) -> String {
    let headline = format!("error: {error}");
    let code = format!("[{}]", error.error_code());
    let mut lines = if no_color {
        vec![format!("{headline} {code}")]
    } else {
        vec![format!("{} {}", headline.red().bold(), code.dimmed())]
    };

    for suggestion in error.fix_suggestions() {
        lines.push(String::new());
        lines.push(format!("  {}", suggestion.context));
        if !suggestion.commands.is_empty() {
            lines.push(String::new());
            lines.push("  Try:".to_string());
            for command in &suggestion.commands {
                let command = if no_color {
                    command.clone()
                } else {
                    command.cyan().to_string()
                };
                lines.push(format!("    {command}"));
            }
        }
    }

    lines.join("\n")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorJson {
    error_code: &'static str,
    category: String,
    message: String,
    is_retryable: bool,
    exit_code: u8,
    suggestions: Vec<SuggestionJson>,
}

#[derive(Serialize)]
struct SuggestionJson {
    commands: Vec<String>,
    context: String,
}

impl ErrorJson {
    fn from_error(error: &KeyprobeError) -> Self {
        Self {
            error_code: error.error_code(),
            category: error.category().to_string(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            exit_code: error.exit_code() as u8,
            suggestions: error
                .fix_suggestions()
                .into_iter()
                .map(|s| SuggestionJson {
                    commands: s.commands,
                    context: s.context,
                })
                .collect(),
        }
    }
}
