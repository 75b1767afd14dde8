//! DeFAI: simulated SUI/USDC trading agent.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! starts the price refresher and serves the HTTP API until ctrl-c.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use defai_agent::config::AppConfig;
use defai_agent::engine::{Ledger, RandomPolicy, TradingService};
use defai_agent::notify::telegram::{startup_message, TelegramNotifier};
use defai_agent::oracle::PriceOracle;
use defai_agent::server::{self, ServerState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Initialise structured logging
    init_logging();

    let mut cfg = AppConfig::load_or_default("config.toml")?;
    cfg.apply_env();

    info!(
        port = cfg.server.port,
        sui = cfg.ledger.initial_sui,
        usdc = cfg.ledger.initial_usdc,
        initial_price = cfg.oracle.initial_price,
        "DeFAI agent starting up"
    );

    // -- Initialise components -------------------------------------------

    let oracle = Arc::new(PriceOracle::from_config(&cfg.oracle)?);
    let refresher = Arc::clone(&oracle).spawn_refresh_loop(cfg.oracle.refresh_interval());

    let telegram = Arc::new(TelegramNotifier::from_config(&cfg.telegram)?);

    let ledger = Ledger::new(cfg.ledger.initial_sui, cfg.ledger.initial_usdc)
        .context("Invalid seed balances")?;
    let service = Arc::new(TradingService::new(
        ledger,
        Arc::clone(&oracle),
        Arc::new(RandomPolicy::new(cfg.agent.clone())),
        telegram.clone(),
    ));

    if telegram.is_enabled() {
        let banner = startup_message(oracle.price().await);
        let notifier = Arc::clone(&telegram);
        tokio::spawn(async move {
            notifier.send_message(&banner).await;
        });
    }

    // -- Serve -----------------------------------------------------------

    let state = Arc::new(ServerState::new(service, telegram));
    let result = server::serve(state, cfg.server.port).await;

    refresher.abort();
    info!("DeFAI agent shut down");
    result
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("defai_agent=info"));

    let json_logging = std::env::var("DEFAI_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
