//! Error types for supply_monitor
//!
//! Fetch failures collapse to a single user-visible message in the dashboard,
//! but keep their cause here so it can be logged.

use thiserror::Error;

/// Message shown in place of the chart whenever a refresh fails.
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch token data";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Wallet address is empty")]
    EmptyWallet,

    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Endpoint answered with status {status}")]
    Status { status: reqwest::StatusCode },

    #[error("Malformed token data: {0}")]
    Parse(#[from] serde_json::Error),
}

impl FetchError {
    pub fn is_parse(&self) -> bool {
        matches!(self, FetchError::Parse(_))
    }
}

/// Configuration problems detected before the monitor starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("No wallet address configured")]
    NoWallets,

    #[error("Wallet address at position {0} is empty")]
    EmptyWallet(usize),

    #[error("Refresh interval must be at least one second")]
    ZeroInterval,

    #[error("Endpoint must start with http:// or https://, got {0}")]
    InvalidEndpoint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_errors_are_distinguished() {
        let err = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
        assert!(FetchError::from(err).is_parse());
        assert!(!FetchError::EmptyWallet.is_parse());
    }

    #[test]
    fn test_config_errors_render_their_input() {
        let msg = ConfigError::InvalidEndpoint("ftp://x".to_string()).to_string();
        assert!(msg.contains("ftp://x"));
    }
}
