//! End-to-end agent lifecycle under paused tokio time.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use defai_agent::config::AgentConfig;
use defai_agent::engine::{RandomPolicy, StopReason};
use defai_agent::notify::{Notification, StatusKind};
use defai_agent::oracle::{PriceOracle, PriceProvider, RandomWalk, RefreshOutcome};
use defai_agent::types::{AgentStatus, Asset, Balances, DeployParams, EngineError, TradeAction};

use crate::harness::{fixed_oracle, service_with, settle, FixedPolicy, ScriptedProvider};

#[tokio::test(start_paused = true)]
async fn deploy_then_immediate_stop_leaves_balances() {
    let policy = Arc::new(RandomPolicy::seeded(AgentConfig::default(), 11));
    let (svc, sink) = service_with(100.0, 0.0, fixed_oracle(0.95), policy);

    svc.deploy(DeployParams::default()).await;
    svc.stop(StopReason::UserRequest).await;

    // Past the longest decision delay plus the thinking window.
    tokio::time::sleep(Duration::from_secs(70)).await;
    assert_eq!(svc.balances().await, Balances::new(100.0, 0.0));
    assert_eq!(svc.status().await, AgentStatus::Stopped);

    settle().await;
    let statuses: Vec<StatusKind> = sink
        .seen()
        .into_iter()
        .filter_map(|n| match n {
            Notification::Status { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![StatusKind::Started, StatusKind::Stopped]);
    assert!(!sink.seen().iter().any(|n| matches!(n, Notification::Trade { .. })));
}

#[tokio::test(start_paused = true)]
async fn random_agent_keeps_balances_non_negative() {
    let policy = Arc::new(RandomPolicy::seeded(AgentConfig::default(), 2024));
    let (svc, sink) = service_with(100.0, 100.0, fixed_oracle(1.3), policy);

    svc.deploy(DeployParams::default()).await;
    tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
    svc.stop(StopReason::UserRequest).await;

    let balances = svc.balances().await;
    assert!(balances.sui >= 0.0 && balances.usdc >= 0.0);

    let logs = svc.logs().await;
    let evaluations = logs.matches("[AGENT EVALUATION]").count();
    let decisions = logs.matches("[FINAL DECISION]").count();
    // A cycle never takes longer than 65s.
    assert!(evaluations > 150, "only {evaluations} evaluations");
    assert!(decisions + 2 >= evaluations);
    assert!(!logs.contains("[ERROR]"));

    settle().await;
    let trades = sink
        .seen()
        .iter()
        .filter(|n| matches!(n, Notification::Trade { .. }))
        .count();
    assert_eq!(trades, decisions);
}

#[tokio::test(start_paused = true)]
async fn buy_cycle_spends_usdc_fraction() {
    let policy = Arc::new(FixedPolicy { action: TradeAction::Buy, fraction: 0.5 });
    let (svc, sink) = service_with(0.0, 100.0, fixed_oracle(2.0), policy);

    svc.deploy(DeployParams::default()).await;
    tokio::time::sleep(Duration::from_secs(21)).await;
    svc.stop(StopReason::UserRequest).await;

    assert_eq!(svc.balances().await, Balances::new(25.0, 50.0));
    settle().await;
    assert!(sink.seen().contains(&Notification::Trade {
        action: TradeAction::Buy,
        price: 2.0,
        balances: Balances::new(25.0, 50.0),
    }));
}

#[tokio::test]
async fn manual_swaps_follow_engine_rules() {
    let policy = Arc::new(FixedPolicy { action: TradeAction::Hold, fraction: 0.5 });
    let (svc, _sink) = service_with(0.0, 100.0, fixed_oracle(2.0), policy);

    let receipt = assert_ok!(svc.swap(Asset::Usdc, Asset::Sui, Some(50.0)).await);
    assert_eq!(receipt.amount_out, 25.0);

    let err = assert_err!(svc.swap(Asset::Sui, Asset::Usdc, Some(26.0)).await);
    assert!(matches!(err, EngineError::InsufficientBalance { asset: Asset::Sui, .. }));

    let err = assert_err!(svc.swap(Asset::Usdc, Asset::Usdc, None).await);
    assert_eq!(err, EngineError::Validation("Cannot swap a coin for itself".into()));

    assert_eq!(svc.balances().await, Balances::new(25.0, 50.0));
}

#[tokio::test]
async fn oracle_falls_back_through_providers() {
    let coingecko = ScriptedProvider::new("coingecko", vec![Err("timeout".into())]);
    let binance = ScriptedProvider::new("binance", vec![Ok(1.42)]);
    let coinbase = ScriptedProvider::new("coinbase", vec![Ok(9.99)]);
    let coinbase_calls = coinbase.call_counter();

    let providers: Vec<Box<dyn PriceProvider>> =
        vec![Box::new(coingecko), Box::new(binance), Box::new(coinbase)];
    let oracle = PriceOracle::new(
        providers,
        Box::new(RandomWalk::seeded(0.02, 5)),
        0.95,
        Duration::from_secs(600),
    );

    assert_eq!(
        oracle.refresh().await,
        RefreshOutcome::Fetched { source: "binance", price: 1.42 }
    );
    assert_eq!(coinbase_calls.load(Ordering::SeqCst), 0);

    // Scripts: coingecko and binance now exhausted, coinbase still has one.
    assert_eq!(
        oracle.refresh().await,
        RefreshOutcome::Fetched { source: "coinbase", price: 9.99 }
    );

    for _ in 0..100 {
        assert!(matches!(oracle.refresh().await, RefreshOutcome::Synthetic { .. }));
        assert!(oracle.price().await > 0.0);
    }
}
