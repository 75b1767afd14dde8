//! Core engine: ledger, swaps and the decide → swap → notify loop.

pub mod decision;
pub mod ledger;
pub mod service;
pub mod session;
pub mod swap;

pub use decision::{DecisionLoop, DecisionPolicy, RandomPolicy};
pub use ledger::Ledger;
pub use service::TradingService;
pub use session::StopReason;
pub use swap::SwapEngine;
