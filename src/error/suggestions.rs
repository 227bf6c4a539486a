//! Fix suggestions for keyprobe errors.
//!
//! Each suggestion pairs copy-paste ready commands with a short explanation.

use super::KeyprobeError;
use crate::storage::config::{MAX_BATCH_SIZE, MAX_CONCURRENCY, MAX_TIMEOUT_SECS, MIN_CONCURRENCY};

/// A fix suggestion for an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixSuggestion {
    /// Commands to try, in order of preference.
    pub commands: Vec<String>,
    /// Why the error happened.
    pub context: String,
}

impl FixSuggestion {
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
        }
    }
}

impl KeyprobeError {
    /// Suggestions for resolving this error; empty when there is nothing to suggest.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::EmptyInput => vec![FixSuggestion::new(
                vec![
                    "keyprobe check --keys sk-a,sk-b".to_string(),
                    "keyprobe check --keys-file keys.txt".to_string(),
                    "cat keys.txt | keyprobe check".to_string(),
                ],
                "No key was found after splitting the input on commas and whitespace.",
            )],
            Self::TooManyCredentials { limit, .. } => vec![FixSuggestion::new(
                vec!["split -l 50000 keys.txt part-".to_string()],
                format!(
                    "A single run accepts at most {limit} keys, repeats included. \
                     Split the list or raise general.max_credentials in the config file."
                ),
            )],
            Self::InvalidConcurrency { .. } => vec![FixSuggestion::new(
                vec!["keyprobe check --concurrency 5".to_string()],
                format!("Concurrency must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}."),
            )],
            Self::Timeout(seconds) => vec![FixSuggestion::new(
                vec![format!(
                    "keyprobe check --timeout {}",
                    (seconds * 2).min(MAX_TIMEOUT_SECS)
                )],
                format!("The request did not finish within {seconds} seconds."),
            )],
            Self::BlockedTarget { .. } => vec![FixSuggestion::new(
                vec![],
                "Private, loopback, and link-local targets are refused. Set \
                 security.allow_private_targets = true in the config file to allow them.",
            )],
            Self::Config(_) => vec![FixSuggestion::new(
                vec![],
                format!(
                    "Check the config file. Timeouts range 1-{MAX_TIMEOUT_SECS} seconds \
                     and batch sizes 1-{MAX_BATCH_SIZE}."
                ),
            )],
            Self::ConfigParse { path, .. } => vec![FixSuggestion::new(
                vec![format!("$EDITOR {path}")],
                "The config file is not valid TOML or has a field of the wrong type.",
            )],
            Self::UnknownProvider(_) => vec![FixSuggestion::new(
                vec!["keyprobe providers".to_string()],
                "Use one of the listed provider keys, or add a [[providers]] entry to \
                 the config file.",
            )],
            Self::UnknownRegion(region) => vec![FixSuggestion::new(
                vec![],
                format!("Add `{region} = \"http://proxy:port\"` under [regions] in the config file."),
            )],
            Self::ReconnectExhausted { .. } | Self::Connect(_) => vec![FixSuggestion::new(
                vec!["keyprobe check --concurrency 2".to_string()],
                "The batch session kept dropping. Results collected so far were kept.",
            )],
            _ => Vec::new(),
        }
    }
}
