//! HTTP flows through the full router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use defai_agent::config::AgentConfig;
use defai_agent::engine::RandomPolicy;
use defai_agent::notify::telegram::TelegramNotifier;
use defai_agent::oracle::{PriceOracle, PriceProvider, RandomWalk};
use defai_agent::server::{build_router, AppState, ServerState};

use crate::harness::{fixed_oracle, service_with, ScriptedProvider};

fn state_with(sui: f64, usdc: f64, oracle: PriceOracle) -> AppState {
    let policy = Arc::new(RandomPolicy::seeded(AgentConfig::default(), 8));
    let (service, _sink) = service_with(sui, usdc, oracle, policy);
    let telegram = Arc::new(
        TelegramNotifier::new("http://127.0.0.1:1", None, Duration::from_secs(2)).unwrap(),
    );
    Arc::new(ServerState::new(service, telegram))
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn stale_fetch_pair_refreshes_once_in_background() {
    let provider = ScriptedProvider::new("coingecko", vec![Ok(1.5), Ok(1.6)])
        .with_latency(Duration::from_millis(200));
    let calls = provider.call_counter();
    let providers: Vec<Box<dyn PriceProvider>> = vec![Box::new(provider)];
    let oracle = PriceOracle::new(
        providers,
        Box::new(RandomWalk::seeded(0.02, 1)),
        0.95,
        Duration::from_secs(600),
    )
    .with_last_updated(chrono::Utc::now() - chrono::Duration::minutes(11));
    let state = state_with(1.0, 2.0, oracle);

    let (status, first) = post(build_router(state.clone()), "/fetch_pair", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    // Served from cache while the refresh runs.
    assert_eq!(first["currentPrice"], 0.95);

    let (_, second) = post(build_router(state.clone()), "/api/wallet/fetch_pair", json!({})).await;
    assert_eq!(second["currentPrice"], 0.95);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let (_, third) = post(build_router(state), "/fetch_pair", json!({})).await;
    assert_eq!(third["currentPrice"], 1.5);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn set_then_swap_then_check() {
    let state = state_with(0.0, 0.0, fixed_oracle(2.0));

    let (status, _) = post(
        build_router(state.clone()),
        "/set_swap",
        json!({"assetA": 0, "assetB": 100}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, swap) = post(
        build_router(state.clone()),
        "/swap",
        json!({"fromCoin": "usdc", "toCoin": "sui", "amount": "50"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(swap["amountOut"], "25");

    let (_, check) = post(build_router(state.clone()), "/check-balances", json!({})).await;
    assert_eq!(check["balances"], json!({"sui": 25.0, "usdc": 50.0}));

    let (_, logs) = post(
        build_router(state),
        "/fetch_logs",
        json!({"uid": "u", "password": "p"}),
    )
    .await;
    assert!(logs["log"].as_str().unwrap().starts_with("[FINAL DECISION] BUY at "));
}

#[tokio::test]
async fn swap_without_amount_moves_whole_balance() {
    let state = state_with(4.0, 0.0, fixed_oracle(0.5));
    let (status, swap) = post(
        build_router(state.clone()),
        "/swap",
        json!({"fromCoin": "SUI", "toCoin": "USDC"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(swap["amountIn"], "4");
    assert_eq!(swap["amountOut"], "2");

    let balances = state.service.balances().await;
    assert_eq!((balances.sui, balances.usdc), (0.0, 2.0));
}
