use std::time::Duration;

use ratatui::style::Color;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const APP_NAME: &str = "supply_monitor";
pub const CONFIG_NAME: &str = "config";

/// Bar colors, assigned cyclically by row position.
pub const DEFAULT_PALETTE: [Color; 6] = [
    Color::Rgb(0x4F, 0xDE, 0xE5),
    Color::Rgb(0xFF, 0xB5, 0x28),
    Color::Rgb(0xFF, 0x6B, 0x6B),
    Color::Rgb(0xF1, 0xF1, 0xF3),
    Color::Rgb(0x8B, 0x5C, 0xF6),
    Color::Rgb(0x34, 0xD3, 0x99),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub wallets: Vec<String>,
    pub refresh_interval_secs: u64,
    pub excluded_prefix: String,
    pub log_file: String,
    pub history_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "https://aisplit.com/inventory/token-data".to_string(),
            wallets: vec!["7jZj1fiUZXUQ3sKQcopbDnWZYAPkEu28Su32WCRoEfQn".to_string()],
            refresh_interval_secs: 15,
            excluded_prefix: "AT".to_string(),
            log_file: "supply_monitor.log".to_string(),
            history_len: 120,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wallets.is_empty() {
            return Err(ConfigError::NoWallets);
        }
        if let Some(i) = self.wallets.iter().position(|w| w.trim().is_empty()) {
            return Err(ConfigError::EmptyWallet(i));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        Ok(())
    }

    /// Apply command line overrides. A wallet given on the command line
    /// becomes the first (initially selected) wallet.
    pub fn with_overrides(
        mut self,
        wallet: Option<&str>,
        interval: Option<u64>,
        endpoint: Option<&str>,
    ) -> Self {
        if let Some(wallet) = wallet {
            self.wallets.retain(|w| w != wallet);
            self.wallets.insert(0, wallet.to_string());
        }
        if let Some(interval) = interval {
            self.refresh_interval_secs = interval;
        }
        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint.to_string();
        }
        self
    }

    pub fn monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        self.validate()?;
        Ok(MonitorConfig {
            endpoint: self.endpoint.trim_end_matches('/').to_string(),
            wallets: self.wallets.iter().map(|w| w.trim().to_string()).collect(),
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            excluded_prefix: self.excluded_prefix.clone(),
            palette: DEFAULT_PALETTE.to_vec(),
            history_len: self.history_len.max(1),
        })
    }
}

/// Everything a monitor instance needs, passed in at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub endpoint: String,
    /// Never empty once built through [`Config::monitor_config`].
    pub wallets: Vec<String>,
    pub refresh_interval: Duration,
    pub excluded_prefix: String,
    pub palette: Vec<Color>,
    pub history_len: usize,
}

impl MonitorConfig {
    pub fn interval_secs(&self) -> u64 {
        self.refresh_interval.as_secs().max(1)
    }
}
