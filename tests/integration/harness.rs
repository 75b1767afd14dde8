//! Shared test doubles.
//!
//! A `RecordingSink` that keeps every notification in memory and a
//! `ScriptedProvider` whose responses and call count are controlled
//! from test code. No network access.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use defai_agent::engine::{DecisionPolicy, Ledger, TradingService};
use defai_agent::notify::{Notification, NotificationSink};
use defai_agent::oracle::{PriceOracle, PriceProvider, RandomWalk};
use defai_agent::types::TradeAction;

// ---------------------------------------------------------------------------
// Recording sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

// ---------------------------------------------------------------------------
// Scripted price provider
// ---------------------------------------------------------------------------

/// Returns queued results in order, then fails. Counts every call.
pub struct ScriptedProvider {
    name: &'static str,
    script: Mutex<VecDeque<Result<f64, String>>>,
    calls: Arc<AtomicUsize>,
    latency: Duration,
}

impl ScriptedProvider {
    pub fn new(name: &'static str, script: Vec<Result<f64, String>>) -> Self {
        Self {
            name,
            script: Mutex::new(script.into()),
            calls: Arc::new(AtomicUsize::new(0)),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl PriceProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_price(&self) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(price)) => Ok(price),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("script exhausted")),
        }
    }
}

// ---------------------------------------------------------------------------
// Deterministic policy
// ---------------------------------------------------------------------------

/// Fixed delays; always proposes and keeps `action`.
pub struct FixedPolicy {
    pub action: TradeAction,
    pub fraction: f64,
}

impl DecisionPolicy for FixedPolicy {
    fn next_delay(&self) -> Duration {
        Duration::from_secs(15)
    }

    fn thinking_delay(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn propose(&self) -> TradeAction {
        self.action
    }

    fn resolve(&self, proposed: TradeAction) -> (TradeAction, bool) {
        (proposed, false)
    }

    fn trade_fraction(&self) -> f64 {
        self.fraction
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Oracle with no providers and a frozen synthetic price.
pub fn fixed_oracle(price: f64) -> PriceOracle {
    PriceOracle::new(
        Vec::new(),
        Box::new(RandomWalk::seeded(0.0, 1)),
        price,
        Duration::from_secs(600),
    )
}

pub fn service_with(
    sui: f64,
    usdc: f64,
    oracle: PriceOracle,
    policy: Arc<dyn DecisionPolicy>,
) -> (Arc<TradingService>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let service = TradingService::new(
        Ledger::new(sui, usdc).unwrap(),
        Arc::new(oracle),
        policy,
        sink.clone(),
    );
    (Arc::new(service), sink)
}

/// Let spawned notification tasks run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
