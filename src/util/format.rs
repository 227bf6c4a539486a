//! Number formatting utilities.

use std::time::Duration;

use crate::core::models::BALANCE_UNKNOWN;

/// Format a balance with its currency; the unknown sentinel renders as `?`.
#[must_use]
pub fn format_balance(balance: f64, currency: Option<&str>) -> String {
    #[allow(clippy::float_cmp)]
    if balance == BALANCE_UNKNOWN {
        return "?".to_string();
    }
    match currency {
        Some("USD") => format!("${balance:.2}"),
        Some("CNY") => format!("¥{balance:.2}"),
        Some(other) => format!("{balance:.2} {other}"),
        None => format!("{balance:.2}"),
    }
}

/// Format a count with thousands separators.
#[must_use]
pub fn format_count(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format an elapsed duration as `1m 05s` / `12.3s`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}
