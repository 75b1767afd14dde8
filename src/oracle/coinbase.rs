//! Coinbase spot-price provider (last network fallback).
//!
//! API: `GET /v2/prices/{pair}/spot`
//! Response: `{ "data": { "amount": "1.23", "base": "SUI", "currency": "USD" } }`

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::PriceProvider;

const BASE_URL: &str = "https://api.coinbase.com";

#[derive(Debug, Deserialize)]
struct SpotResponse {
    #[serde(default)]
    data: Option<SpotData>,
}

#[derive(Debug, Deserialize)]
struct SpotData {
    #[serde(default)]
    amount: Option<String>,
}

pub struct CoinbaseProvider {
    http: Client,
    base_url: String,
    pair: String,
}

impl CoinbaseProvider {
    pub fn new(pair: &str, timeout: Duration) -> Result<Self> {
        Self::with_base_url(BASE_URL, pair, timeout)
    }

    pub fn with_base_url(base_url: &str, pair: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("DeFAI/0.1.0")
            .build()
            .context("Failed to build HTTP client for Coinbase")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            pair: pair.to_string(),
        })
    }

    fn parse_price(spot: &SpotResponse) -> Result<f64> {
        let raw = spot
            .data
            .as_ref()
            .and_then(|d| d.amount.as_deref())
            .context("Coinbase response missing data.amount")?;
        raw.trim()
            .parse::<f64>()
            .with_context(|| format!("Coinbase amount is not a number: {raw}"))
    }
}

#[async_trait]
impl PriceProvider for CoinbaseProvider {
    fn name(&self) -> &'static str {
        "coinbase"
    }

    async fn fetch_price(&self) -> Result<f64> {
        let url = format!("{}/v2/prices/{}/spot", self.base_url, self.pair);
        debug!(url = %url, "Fetching Coinbase price");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Coinbase request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Coinbase API error {status}: {body}");
        }

        let spot: SpotResponse = resp
            .json()
            .await
            .context("Failed to parse Coinbase spot response")?;

        Self::parse_price(&spot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spot() {
        let spot: SpotResponse = serde_json::from_str(
            r#"{"data":{"amount":"3.1416","base":"SUI","currency":"USD"}}"#,
        )
        .unwrap();
        let price = CoinbaseProvider::parse_price(&spot).unwrap();
        assert!((price - 3.1416).abs() < 1e-12);
    }

    #[test]
    fn test_parse_error_body() {
        let spot: SpotResponse =
            serde_json::from_str(r#"{"errors":[{"id":"not_found"}]}"#).unwrap();
        assert!(CoinbaseProvider::parse_price(&spot).is_err());
    }
}
