//! Result categorization and the in-memory result store.

use std::collections::HashSet;

use serde::Serialize;

use super::models::{BALANCE_UNKNOWN, ValidationResult};

/// Display bucket for a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCategory {
    Valid,
    ZeroBalance,
    RateLimited,
    Invalid,
    Error,
    Duplicate,
}

impl ResultCategory {
    pub const ALL: [Self; 6] = [
        Self::Valid,
        Self::ZeroBalance,
        Self::RateLimited,
        Self::Invalid,
        Self::Error,
        Self::Duplicate,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::ZeroBalance => "zero_balance",
            Self::RateLimited => "rate_limited",
            Self::Invalid => "invalid",
            Self::Error => "error",
            Self::Duplicate => "duplicate",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::ZeroBalance => "Zero balance",
            Self::RateLimited => "Rate limited",
            Self::Invalid => "Invalid",
            Self::Error => "Error",
            Self::Duplicate => "Duplicate",
        }
    }
}

impl std::fmt::Display for ResultCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn looks_rate_limited(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("rate limit")
        || message.contains("rate_limit")
        || message.contains("too many requests")
        || message.contains("resource_exhausted")
}

/// Bucket a result. Pure: the same result always lands in the same bucket.
#[must_use]
pub fn categorize(result: &ValidationResult) -> ResultCategory {
    let message = result.message.as_deref().unwrap_or_default();

    if result.is_duplicate() {
        return ResultCategory::Duplicate;
    }
    if result.is_error() {
        return ResultCategory::Error;
    }
    if result.is_valid {
        return match result.balance {
            #[allow(clippy::float_cmp)]
            Some(balance) if balance != BALANCE_UNKNOWN && balance <= 0.0 => {
                ResultCategory::ZeroBalance
            }
            _ => ResultCategory::Valid,
        };
    }
    if result.status_code == Some(429) || looks_rate_limited(message) {
        return ResultCategory::RateLimited;
    }
    ResultCategory::Invalid
}

/// Per-category totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub valid: usize,
    pub zero_balance: usize,
    pub rate_limited: usize,
    pub invalid: usize,
    pub error: usize,
    pub duplicate: usize,
}

impl CategoryCounts {
    #[must_use]
    pub const fn get(&self, category: ResultCategory) -> usize {
        match category {
            ResultCategory::Valid => self.valid,
            ResultCategory::ZeroBalance => self.zero_balance,
            ResultCategory::RateLimited => self.rate_limited,
            ResultCategory::Invalid => self.invalid,
            ResultCategory::Error => self.error,
            ResultCategory::Duplicate => self.duplicate,
        }
    }

    const fn bump(&mut self, category: ResultCategory) {
        match category {
            ResultCategory::Valid => self.valid += 1,
            ResultCategory::ZeroBalance => self.zero_balance += 1,
            ResultCategory::RateLimited => self.rate_limited += 1,
            ResultCategory::Invalid => self.invalid += 1,
            ResultCategory::Error => self.error += 1,
            ResultCategory::Duplicate => self.duplicate += 1,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.valid + self.zero_balance + self.rate_limited + self.invalid + self.error + self.duplicate
    }
}

/// Every result of one run, at most one per `order`.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    results: Vec<ValidationResult>,
    orders: HashSet<u64>,
}

impl ResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a result; a second result for the same `order` is dropped.
    pub fn insert(&mut self, result: ValidationResult) -> bool {
        if !self.orders.insert(result.order) {
            tracing::debug!(order = result.order, "Dropping repeated result");
            return false;
        }
        self.results.push(result);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// All results, sorted by `order`.
    #[must_use]
    pub fn all(&self) -> Vec<&ValidationResult> {
        let mut all: Vec<_> = self.results.iter().collect();
        all.sort_by_key(|r| r.order);
        all
    }

    /// Results in one category, sorted by `order`.
    #[must_use]
    pub fn in_category(&self, category: ResultCategory) -> Vec<&ValidationResult> {
        let mut bucket: Vec<_> = self
            .results
            .iter()
            .filter(|r| categorize(r) == category)
            .collect();
        bucket.sort_by_key(|r| r.order);
        bucket
    }

    #[must_use]
    pub fn valid(&self) -> Vec<&ValidationResult> {
        self.in_category(ResultCategory::Valid)
    }

    #[must_use]
    pub fn zero_balance(&self) -> Vec<&ValidationResult> {
        self.in_category(ResultCategory::ZeroBalance)
    }

    #[must_use]
    pub fn rate_limited(&self) -> Vec<&ValidationResult> {
        self.in_category(ResultCategory::RateLimited)
    }

    #[must_use]
    pub fn invalid(&self) -> Vec<&ValidationResult> {
        self.in_category(ResultCategory::Invalid)
    }

    #[must_use]
    pub fn errors(&self) -> Vec<&ValidationResult> {
        self.in_category(ResultCategory::Error)
    }

    #[must_use]
    pub fn duplicates(&self) -> Vec<&ValidationResult> {
        self.in_category(ResultCategory::Duplicate)
    }

    #[must_use]
    pub fn counts(&self) -> CategoryCounts {
        let mut counts = CategoryCounts::default();
        for result in &self.results {
            counts.bump(categorize(result));
        }
        counts
    }
}
