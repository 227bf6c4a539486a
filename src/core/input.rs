//! Raw key-list parsing.
//!
//! Keys may be separated by newlines, commas, or any whitespace. Each key's
//! `order` is its position in the parsed list, so it stays meaningful even
//! after duplicates are pulled out.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::models::{Credential, ValidationResult};
use crate::error::{KeyprobeError, Result};

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s,]+").unwrap());

/// A parsed key list.
#[derive(Debug, Clone, Default)]
pub struct ParsedInput {
    /// First occurrence of every distinct key, in input order.
    pub unique: Vec<Credential>,
    /// Terminal results for every repeat occurrence.
    pub duplicates: Vec<ValidationResult>,
}

impl ParsedInput {
    /// Number of keys parsed, repeats included.
    #[must_use]
    pub fn total(&self) -> usize {
        self.unique.len() + self.duplicates.len()
    }
}

/// Split raw input into tokens without any checks.
#[must_use]
pub fn split_tokens(raw: &str) -> Vec<&str> {
    SEPARATORS
        .split(raw)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Parse a raw key list.
///
/// `max_credentials` bounds the number of parsed keys, repeats included.
///
/// # Errors
///
/// Returns `EmptyInput` if no key is present and `TooManyCredentials` if the
/// list exceeds `max_credentials`.
pub fn parse_credentials(raw: &str, max_credentials: usize) -> Result<ParsedInput> {
    let tokens = split_tokens(raw);
    if tokens.is_empty() {
        return Err(KeyprobeError::EmptyInput);
    }
    if tokens.len() > max_credentials {
        return Err(KeyprobeError::TooManyCredentials {
            count: tokens.len(),
            limit: max_credentials,
        });
    }

    let mut seen = HashSet::with_capacity(tokens.len());
    let mut parsed = ParsedInput::default();
    for (order, token) in (0u64..).zip(tokens) {
        let credential = Credential::new(token, order);
        if seen.insert(token) {
            parsed.unique.push(credential);
        } else {
            parsed.duplicates.push(ValidationResult::duplicate(&credential));
        }
    }

    tracing::debug!(
        total = parsed.total(),
        unique = parsed.unique.len(),
        duplicates = parsed.duplicates.len(),
        "Parsed key list"
    );
    Ok(parsed)
}
