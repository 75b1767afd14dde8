//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every field has a default, so a partial (or missing) file still yields
//! a runnable configuration. Secrets (the Telegram bot token) are
//! referenced by env-var name in the config and resolved at runtime.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub oracle: OracleConfig,
    pub agent: AgentConfig,
    pub telegram: TelegramConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 5000 }
    }
}

/// Seed balances for the in-memory ledger.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LedgerConfig {
    pub initial_sui: f64,
    pub initial_usdc: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OracleConfig {
    /// Price used until the first successful refresh (1 SUI in USDC).
    pub initial_price: f64,
    pub refresh_interval_secs: u64,
    pub stale_after_secs: u64,
    /// Maximum relative move of the synthetic random walk (0.02 = ±2%).
    pub max_synthetic_change: f64,
    pub request_timeout_secs: u64,
    pub coingecko_id: String,
    pub binance_symbol: String,
    pub coinbase_pair: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            initial_price: 0.95,
            refresh_interval_secs: 300,
            stale_after_secs: 600,
            max_synthetic_change: 0.02,
            request_timeout_secs: 10,
            coingecko_id: "sui".to_string(),
            binance_symbol: "SUIUSDT".to_string(),
            coinbase_pair: "SUI-USD".to_string(),
        }
    }
}

impl OracleConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Decision loop timing and policy constants.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub min_decision_delay_secs: u64,
    pub max_decision_delay_secs: u64,
    pub thinking_delay_secs: u64,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub follow_probability: f64,
    pub min_trade_fraction: f64,
    pub max_trade_fraction: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            min_decision_delay_secs: 15,
            max_decision_delay_secs: 60,
            thinking_delay_secs: 5,
            buy_threshold: 0.2,
            sell_threshold: 0.4,
            follow_probability: 0.8,
            min_trade_fraction: 0.25,
            max_trade_fraction: 0.75,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token_env: String,
    pub chat_id_env: String,
    /// JSON file holding settings saved through the configure endpoint.
    pub config_file: String,
    pub poll_interval_secs: u64,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: "TELEGRAM_BOT_TOKEN".to_string(),
            chat_id_env: "TELEGRAM_CHAT_ID".to_string(),
            config_file: "telegram-config.json".to_string(),
            poll_interval_secs: 2,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            warn!(path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply environment overrides (`PORT`).
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    fn validate(&self) -> Result<()> {
        let a = &self.agent;
        anyhow::ensure!(
            a.min_decision_delay_secs < a.max_decision_delay_secs,
            "agent.min_decision_delay_secs must be below agent.max_decision_delay_secs"
        );
        anyhow::ensure!(
            0.0 <= a.buy_threshold && a.buy_threshold <= a.sell_threshold && a.sell_threshold <= 1.0,
            "agent thresholds must satisfy 0 <= buy_threshold <= sell_threshold <= 1"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&a.follow_probability),
            "agent.follow_probability must be within [0, 1]"
        );
        anyhow::ensure!(
            0.0 <= a.min_trade_fraction
                && a.min_trade_fraction < a.max_trade_fraction
                && a.max_trade_fraction <= 1.0,
            "agent trade fractions must satisfy 0 <= min < max <= 1"
        );
        anyhow::ensure!(
            self.oracle.initial_price.is_finite() && self.oracle.initial_price > 0.0,
            "oracle.initial_price must be positive"
        );
        anyhow::ensure!(
            self.ledger.initial_sui >= 0.0 && self.ledger.initial_usdc >= 0.0,
            "ledger seed balances must be non-negative"
        );
        Ok(())
    }
}
