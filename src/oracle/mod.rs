//! SUI/USDC price oracle.
//!
//! Defines the `PriceProvider` trait and the `PriceOracle` that walks an
//! ordered list of providers, falling back to a synthetic price when all
//! of them fail. Implementations for CoinGecko, Binance and Coinbase live
//! in the submodules.

pub mod binance;
pub mod coinbase;
pub mod coingecko;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::OracleConfig;

/// Abstraction over external market-data sources.
///
/// Implementors fetch the current SUI price in USD. Any failure (network,
/// HTTP status, missing or malformed field) is reported as an error and
/// the oracle moves on to the next provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Fetch the latest price.
    async fn fetch_price(&self) -> Result<f64>;
}

/// Strategy used to synthesise a price when every provider has failed.
pub trait SyntheticPrice: Send + Sync {
    fn next_price(&self, last: f64) -> f64;
}

/// Bounded multiplicative random walk: `last * (1 + u)`, `u ∈ [-max, max)`.
pub struct RandomWalk {
    max_change: f64,
    rng: Mutex<StdRng>,
}

impl RandomWalk {
    pub fn new(max_change: f64) -> Self {
        Self {
            max_change: max_change.abs(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(max_change: f64, seed: u64) -> Self {
        Self {
            max_change: max_change.abs(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SyntheticPrice for RandomWalk {
    fn next_price(&self, last: f64) -> f64 {
        if self.max_change == 0.0 {
            return last;
        }
        let change = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(-self.max_change..self.max_change),
            Err(poisoned) => poisoned
                .into_inner()
                .gen_range(-self.max_change..self.max_change),
        };
        last * (1.0 + change)
    }
}

/// Current price and when it was last refreshed.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PriceState {
    pub price: f64,
    pub last_updated: DateTime<Utc>,
}

/// What a call to [`PriceOracle::refresh`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// A provider returned a usable price.
    Fetched { source: &'static str, price: f64 },
    /// Every provider failed; the synthetic strategy moved the price.
    Synthetic { price: f64 },
    /// Another refresh was already in flight.
    Skipped,
}

fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Price oracle with an ordered provider chain and a synthetic fallback.
pub struct PriceOracle {
    providers: Vec<Box<dyn PriceProvider>>,
    synthetic: Box<dyn SyntheticPrice>,
    state: RwLock<PriceState>,
    refreshing: AtomicBool,
    stale_after: Duration,
}

impl PriceOracle {
    /// Create an oracle seeded with `initial_price`, considered fresh now.
    pub fn new(
        providers: Vec<Box<dyn PriceProvider>>,
        synthetic: Box<dyn SyntheticPrice>,
        initial_price: f64,
        stale_after: Duration,
    ) -> Self {
        let price = if is_valid_price(initial_price) {
            initial_price
        } else {
            warn!(initial_price, "Invalid initial price, using 1.0");
            1.0
        };
        Self {
            providers,
            synthetic,
            state: RwLock::new(PriceState {
                price,
                last_updated: Utc::now(),
            }),
            refreshing: AtomicBool::new(false),
            stale_after,
        }
    }

    /// Build the default CoinGecko → Binance → Coinbase chain from config.
    pub fn from_config(cfg: &OracleConfig) -> Result<Self> {
        let timeout = cfg.request_timeout();
        let providers: Vec<Box<dyn PriceProvider>> = vec![
            Box::new(coingecko::CoinGeckoProvider::new(&cfg.coingecko_id, timeout)?),
            Box::new(binance::BinanceProvider::new(&cfg.binance_symbol, timeout)?),
            Box::new(coinbase::CoinbaseProvider::new(&cfg.coinbase_pair, timeout)?),
        ];
        Ok(Self::new(
            providers,
            Box::new(RandomWalk::new(cfg.max_synthetic_change)),
            cfg.initial_price,
            cfg.stale_after(),
        ))
    }

    /// Override when the seeded price was last updated.
    pub fn with_last_updated(mut self, at: DateTime<Utc>) -> Self {
        self.state.get_mut().last_updated = at;
        self
    }

    /// Current price. Always `> 0`.
    pub async fn price(&self) -> f64 {
        self.state.read().await.price
    }

    pub async fn snapshot(&self) -> PriceState {
        *self.state.read().await
    }

    /// Whether the price is older than the freshness window.
    pub async fn is_stale(&self) -> bool {
        let last = self.state.read().await.last_updated;
        match (Utc::now() - last).to_std() {
            Ok(age) => age > self.stale_after,
            // last_updated in the future
            Err(_) => false,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Refresh the price now, unless a refresh is already running.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(slot) = RefreshSlot::claim(self) else {
            debug!("Price refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        };
        slot.run_refresh().await
    }

    /// Start a background refresh if the price is stale.
    ///
    /// Returns immediately; `true` if a refresh was started. The in-flight
    /// slot is claimed before spawning so back-to-back calls coalesce.
    pub async fn refresh_if_stale(self: &Arc<Self>) -> bool {
        if !self.is_stale().await {
            return false;
        }
        let Some(slot) = RefreshSlot::claim(Arc::clone(self)) else {
            return false;
        };
        tokio::spawn(async move {
            slot.run_refresh().await;
        });
        true
    }

    /// Refresh immediately and then every `interval`.
    pub fn spawn_refresh_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }

    fn try_begin_refresh(&self) -> bool {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn run_refresh(&self) -> RefreshOutcome {
        debug!(providers = self.providers.len(), "Fetching SUI/USDC price");

        for provider in &self.providers {
            match provider.fetch_price().await {
                Ok(price) if is_valid_price(price) => {
                    self.store(price).await;
                    info!(
                        source = provider.name(),
                        price = format!("${price:.4}"),
                        "Updated SUI/USDC price"
                    );
                    return RefreshOutcome::Fetched {
                        source: provider.name(),
                        price,
                    };
                }
                Ok(price) => {
                    warn!(source = provider.name(), price, "Provider returned unusable price");
                }
                Err(e) => {
                    warn!(source = provider.name(), error = %e, "Price fetch failed");
                }
            }
        }

        let last = self.state.read().await.price;
        let candidate = self.synthetic.next_price(last);
        let price = if is_valid_price(candidate) { candidate } else { last };
        self.store(price).await;
        warn!(
            price = format!("${price:.4}"),
            "All price providers failed, using simulated price"
        );
        RefreshOutcome::Synthetic { price }
    }

    async fn store(&self, price: f64) {
        let mut state = self.state.write().await;
        state.price = price;
        state.last_updated = Utc::now();
    }
}

/// Holds the oracle's in-flight flag; dropping it releases the flag even
/// when the refresh future is cancelled part way.
struct RefreshSlot<O: Deref<Target = PriceOracle>>(O);

impl<O: Deref<Target = PriceOracle>> RefreshSlot<O> {
    fn claim(oracle: O) -> Option<Self> {
        oracle.try_begin_refresh().then(|| Self(oracle))
    }
}

impl<O: Deref<Target = PriceOracle>> Deref for RefreshSlot<O> {
    type Target = PriceOracle;

    fn deref(&self) -> &PriceOracle {
        &self.0
    }
}

impl<O: Deref<Target = PriceOracle>> Drop for RefreshSlot<O> {
    fn drop(&mut self) {
        self.0.refreshing.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
