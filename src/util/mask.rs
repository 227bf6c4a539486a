//! Log-safe renderings of API keys.
//!
//! Raw keys never go to logs. [`fingerprint`] gives a stable short hash for
//! correlating log lines; [`mask`] keeps just enough of the key for a human
//! to recognize it in a report.

use sha2::{Digest, Sha256};

/// Stable 12-hex-digit fingerprint of a key.
#[must_use]
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

/// Keep the first 6 and last 4 characters of a key.
#[must_use]
pub fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
