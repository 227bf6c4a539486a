//! Terminal and environment checks.
//!
//! Stdout carries reports (and session frames), stderr carries progress
//! and logs, stdin may carry the key list. Each is checked separately.

use std::io::IsTerminal;

use crate::storage::config::{ENV_NO_COLOR, ENV_NO_COLOR_STD};

/// Progress output goes to stderr; only draw it on a terminal.
#[must_use]
pub fn stderr_is_tty() -> bool {
    std::io::stderr().is_terminal()
}

/// A terminal stdin means no key list was piped in.
#[must_use]
pub fn stdin_is_tty() -> bool {
    std::io::stdin().is_terminal()
}

/// Whether reports on stdout get ANSI colors.
///
/// Off for `--no-color`, a truthy `KEYPROBE_NO_COLOR`, any `NO_COLOR`,
/// `TERM=dumb`, or a non-terminal stdout.
#[must_use]
pub fn should_use_color(no_color_flag: bool) -> bool {
    let disabled_by_env = env_truthy(ENV_NO_COLOR) || std::env::var_os(ENV_NO_COLOR_STD).is_some();
    let dumb_terminal = std::env::var("TERM").is_ok_and(|t| t == "dumb");

    !no_color_flag && !disabled_by_env && !dumb_terminal && std::io::stdout().is_terminal()
}

/// `1`, `true`, `yes` and `on` (any case) are truthy; anything else, or unset, is not.
#[must_use]
pub fn env_truthy(var: &str) -> bool {
    std::env::var(var).is_ok_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}
