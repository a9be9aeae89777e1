//! Rotating gateway access token.
//!
//! The synthesis gateway accepts a token derived from wall-clock time: ticks
//! since the 1601 epoch floored to a five minute window, concatenated with the
//! fixed client identity, hashed with SHA-256 and rendered as uppercase hex.

use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed client identity the gateway expects in the connection URL.
pub const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";

const EPOCH_1601_OFFSET_SECS: u64 = 11_644_473_600;
const TICKS_PER_SEC: u64 = 10_000_000;
const WINDOW_TICKS: u64 = 300 * TICKS_PER_SEC;

/// Token for the current five minute window.
pub fn gateway_token() -> String {
    let unix_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    gateway_token_at(unix_secs)
}

/// Token for the window containing `unix_secs`.
pub fn gateway_token_at(unix_secs: u64) -> String {
    let ticks = (unix_secs + EPOCH_1601_OFFSET_SECS) * TICKS_PER_SEC;
    let windowed = ticks - ticks % WINDOW_TICKS;

    let mut hasher = Sha256::new();
    hasher.update(format!("{windowed}{TRUSTED_CLIENT_TOKEN}").as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_within_a_window() {
        let a = gateway_token_at(1_700_000_100);
        let b = gateway_token_at(1_700_000_150);
        assert_eq!(a, b);
    }

    #[test]
    fn changes_across_a_window_boundary() {
        // 1_700_000_100 and 1_700_000_500 land in different five minute buckets
        // of the shifted epoch.
        let a = gateway_token_at(1_700_000_100);
        let b = gateway_token_at(1_700_000_500);
        assert_ne!(a, b);
    }

    #[test]
    fn uppercase_hex_of_fixed_length() {
        let token = gateway_token_at(1_700_000_000);
        assert_eq!(token.len(), 64);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }
}
