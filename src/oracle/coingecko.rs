//! CoinGecko simple-price provider (primary).
//!
//! API: `GET /api/v3/simple/price?ids={id}&vs_currencies=usd`
//! Response: `{ "sui": { "usd": 1.2345 } }`
//! Auth: none for the public tier. Rate limit: ~30 req/min.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::PriceProvider;

const BASE_URL: &str = "https://api.coingecko.com";

type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

pub struct CoinGeckoProvider {
    http: Client,
    base_url: String,
    coin_id: String,
}

impl CoinGeckoProvider {
    pub fn new(coin_id: &str, timeout: Duration) -> Result<Self> {
        Self::with_base_url(BASE_URL, coin_id, timeout)
    }

    pub fn with_base_url(base_url: &str, coin_id: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("DeFAI/0.1.0")
            .build()
            .context("Failed to build HTTP client for CoinGecko")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            coin_id: coin_id.to_string(),
        })
    }

    /// Pull `{coin_id}.usd` out of a simple-price body.
    fn parse_price(body: &SimplePriceResponse, coin_id: &str) -> Result<f64> {
        body.get(coin_id)
            .and_then(|quotes| quotes.get("usd"))
            .copied()
            .with_context(|| format!("CoinGecko response missing {coin_id}.usd"))
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    async fn fetch_price(&self) -> Result<f64> {
        let url = format!("{}/api/v3/simple/price", self.base_url);
        debug!(url = %url, coin = %self.coin_id, "Fetching CoinGecko price");

        let resp = self
            .http
            .get(&url)
            .query(&[("ids", self.coin_id.as_str()), ("vs_currencies", "usd")])
            .send()
            .await
            .context("CoinGecko request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("CoinGecko API error {status}: {body}");
        }

        let body: SimplePriceResponse = resp
            .json()
            .await
            .context("Failed to parse CoinGecko simple-price response")?;

        Self::parse_price(&body, &self.coin_id)
    }
}
