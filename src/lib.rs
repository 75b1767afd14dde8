//! DeFAI: simulated SUI/USDC trading agent service.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod oracle;
pub mod engine;
pub mod notify;
pub mod storage;
pub mod server;
