//! Integration tests for the DeFAI trading agent.

mod harness;
mod http_flow;
mod lifecycle;
