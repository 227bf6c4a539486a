//! keyprobe - batch validator for LLM provider API keys
//!
//! Parses a key list, validates each key against its provider's API in
//! bounded-concurrency batch sessions, and sorts the results into
//! categories (valid, zero balance, rate limited, invalid, error, duplicate).
//! Runs can be paused, resumed, and stopped; a dropped session is retried
//! a bounded number of times before the run fails.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod render;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, KeyprobeError, Result};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
