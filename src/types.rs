//! Shared types for the DeFAI trading agent.
//!
//! These types form the data model used across all modules.
//! They are kept free of engine logic so that the oracle, engine,
//! notification and server modules can depend on them without
//! circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// The fixed two-asset universe. SUI is the traded asset, USDC the quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Sui,
    Usdc,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Sui => write!(f, "SUI"),
            Asset::Usdc => write!(f, "USDC"),
        }
    }
}

/// Parse an asset symbol (case-insensitive).
impl std::str::FromStr for Asset {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SUI" => Ok(Asset::Sui),
            "USDC" => Ok(Asset::Usdc),
            _ => Err(EngineError::Validation(
                "Invalid coins. Only SUI and USDC are supported.".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// A point-in-time copy of both ledger balances.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Balances {
    pub sui: f64,
    pub usdc: f64,
}

impl Balances {
    pub fn new(sui: f64, usdc: f64) -> Self {
        Self { sui, usdc }
    }

    pub fn get(&self, asset: Asset) -> f64 {
        match asset {
            Asset::Sui => self.sui,
            Asset::Usdc => self.usdc,
        }
    }
}

impl fmt::Display for Balances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SUI={:.6}, USDC={:.6}", self.sui, self.usdc)
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// A trading decision produced by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    /// The swap direction `(from, to)` for this action, if it trades.
    ///
    /// BUY spends USDC for SUI; SELL spends SUI for USDC.
    pub fn direction(&self) -> Option<(Asset, Asset)> {
        match self {
            TradeAction::Buy => Some((Asset::Usdc, Asset::Sui)),
            TradeAction::Sell => Some((Asset::Sui, Asset::Usdc)),
            TradeAction::Hold => None,
        }
    }

    /// The action implied by spending `from`.
    pub fn for_swap_from(from: Asset) -> Self {
        match from {
            Asset::Sui => TradeAction::Sell,
            Asset::Usdc => TradeAction::Buy,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
            TradeAction::Hold => write!(f, "HOLD"),
        }
    }
}

// ---------------------------------------------------------------------------
// Agent status
// ---------------------------------------------------------------------------

/// Agent lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Stopped,
    Running,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Stopped => write!(f, "stopped"),
            AgentStatus::Running => write!(f, "running"),
        }
    }
}

/// Parameters supplied when deploying the agent. Recorded, not enforced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployParams {
    pub profit: Option<serde_json::Value>,
    pub loss: Option<serde_json::Value>,
    pub risk: Option<serde_json::Value>,
}

impl fmt::Display for DeployParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<serde_json::Value>| match v {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "undefined".to_string(),
        };
        write!(
            f,
            "profit={}, loss={}, risk={}",
            show(&self.profit),
            show(&self.loss),
            show(&self.risk),
        )
    }
}

// ---------------------------------------------------------------------------
// Swap receipt
// ---------------------------------------------------------------------------

/// Receipt returned after a simulated swap is applied to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapReceipt {
    /// Opaque `0x`-prefixed transaction reference.
    pub tx_hash: String,
    pub from: Asset,
    pub to: Asset,
    pub amount_in: f64,
    pub amount_out: f64,
    /// SUI/USDC price the swap executed at.
    pub price: f64,
    pub balances_after: Balances,
    pub timestamp: DateTime<Utc>,
}

impl SwapReceipt {
    pub fn action(&self) -> TradeAction {
        TradeAction::for_swap_from(self.from)
    }
}

impl fmt::Display for SwapReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {} -> {:.6} {} @ {:.4} [{}]",
            self.action(),
            self.amount_in,
            self.from,
            self.amount_out,
            self.to,
            self.price,
            self.tx_hash,
        )
    }
}

/// Generate a mock 32-byte transaction hash.
pub fn mock_tx_hash() -> String {
    format!(
        "0x{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the trading engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("Insufficient {asset} balance: need {needed:.6}, have {available:.6}")]
    InsufficientBalance {
        asset: Asset,
        needed: f64,
        available: f64,
    },

    #[error("Execution error: {0}")]
    Execution(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
