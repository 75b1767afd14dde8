//! Binance ticker provider (first fallback).
//!
//! API: `GET /api/v3/ticker/price?symbol=SUIUSDT`
//! Response: `{ "symbol": "SUIUSDT", "price": "1.23450000" }`
//! The price is a decimal string.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::PriceProvider;

const BASE_URL: &str = "https://api.binance.com";

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[serde(default)]
    price: Option<String>,
}

pub struct BinanceProvider {
    http: Client,
    base_url: String,
    symbol: String,
}

impl BinanceProvider {
    pub fn new(symbol: &str, timeout: Duration) -> Result<Self> {
        Self::with_base_url(BASE_URL, symbol, timeout)
    }

    pub fn with_base_url(base_url: &str, symbol: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("DeFAI/0.1.0")
            .build()
            .context("Failed to build HTTP client for Binance")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            symbol: symbol.to_string(),
        })
    }

    fn parse_price(ticker: &TickerPrice) -> Result<f64> {
        let raw = ticker
            .price
            .as_deref()
            .context("Binance ticker missing price")?;
        raw.trim()
            .parse::<f64>()
            .with_context(|| format!("Binance price is not a number: {raw}"))
    }
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch_price(&self) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        debug!(url = %url, symbol = %self.symbol, "Fetching Binance price");

        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", self.symbol.as_str())])
            .send()
            .await
            .context("Binance request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {status}: {body}");
        }

        let ticker: TickerPrice = resp
            .json()
            .await
            .context("Failed to parse Binance ticker response")?;

        Self::parse_price(&ticker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_price() {
        let ticker: TickerPrice =
            serde_json::from_str(r#"{"symbol":"SUIUSDT","price":"1.23450000"}"#).unwrap();
        let price = BinanceProvider::parse_price(&ticker).unwrap();
        assert!((price - 1.2345).abs() < 1e-12);
    }

    #[test]
    fn test_parse_missing_or_garbage_price() {
        let ticker: TickerPrice = serde_json::from_str(r#"{"code":-1121}"#).unwrap();
        assert!(BinanceProvider::parse_price(&ticker).is_err());

        let ticker: TickerPrice = serde_json::from_str(r#"{"price":"n/a"}"#).unwrap();
        assert!(BinanceProvider::parse_price(&ticker).is_err());
    }
}
