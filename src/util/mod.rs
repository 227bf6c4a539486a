//! Utility functions.

pub mod env;
pub mod format;
pub mod mask;

pub use format::{format_balance, format_count, format_elapsed};
pub use mask::{fingerprint, mask};
