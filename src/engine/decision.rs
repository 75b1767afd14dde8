//! Decision loop: propose, confirm or override, then act.
//!
//! One loop task runs per deployed session generation. Each cycle waits a
//! random delay, proposes an action, "thinks" for a fixed delay, resolves
//! the final action and executes it. Stopping is observed at the two
//! checkpoints that follow the delays; the second one holds the session
//! until the trade has been applied.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::engine::service::{Committed, TradingService};
use crate::engine::session;
use crate::notify::Notification;
use crate::types::TradeAction;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Source of the loop's timing and decisions.
pub trait DecisionPolicy: Send + Sync {
    /// Wait before the next evaluation.
    fn next_delay(&self) -> Duration;

    /// Wait between proposing and resolving.
    fn thinking_delay(&self) -> Duration;

    /// Initial analysis result.
    fn propose(&self) -> TradeAction;

    /// Final action and whether the proposal was overridden.
    fn resolve(&self, proposed: TradeAction) -> (TradeAction, bool);

    /// Share of the spent balance to trade, in `[0, 1]`.
    fn trade_fraction(&self) -> f64;
}

/// Uniform-random policy driven by [`AgentConfig`].
///
/// Proposes BUY below `buy_threshold`, SELL below `sell_threshold`, HOLD
/// otherwise; keeps the proposal with `follow_probability` and otherwise
/// overrides to BUY or SELL with equal odds.
pub struct RandomPolicy {
    cfg: AgentConfig,
    rng: Mutex<StdRng>,
}

impl RandomPolicy {
    pub fn new(cfg: AgentConfig) -> Self {
        Self {
            cfg,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(cfg: AgentConfig, seed: u64) -> Self {
        Self {
            cfg,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Map a uniform draw in `[0, 1)` to a proposal.
    pub fn classify(&self, draw: f64) -> TradeAction {
        if draw < self.cfg.buy_threshold {
            TradeAction::Buy
        } else if draw < self.cfg.sell_threshold {
            TradeAction::Sell
        } else {
            TradeAction::Hold
        }
    }

    /// Resolve `proposed` from two uniform draws. An override is never HOLD.
    pub fn resolve_with(&self, proposed: TradeAction, keep_draw: f64, side_draw: f64) -> (TradeAction, bool) {
        if keep_draw < self.cfg.follow_probability {
            (proposed, false)
        } else if side_draw < 0.5 {
            (TradeAction::Buy, true)
        } else {
            (TradeAction::Sell, true)
        }
    }

    fn uniform(&self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(low..high),
            Err(poisoned) => poisoned.into_inner().gen_range(low..high),
        }
    }
}

impl DecisionPolicy for RandomPolicy {
    fn next_delay(&self) -> Duration {
        Duration::from_secs_f64(self.uniform(
            self.cfg.min_decision_delay_secs as f64,
            self.cfg.max_decision_delay_secs as f64,
        ))
    }

    fn thinking_delay(&self) -> Duration {
        Duration::from_secs(self.cfg.thinking_delay_secs)
    }

    fn propose(&self) -> TradeAction {
        self.classify(self.uniform(0.0, 1.0))
    }

    fn resolve(&self, proposed: TradeAction) -> (TradeAction, bool) {
        let keep = self.uniform(0.0, 1.0);
        let side = self.uniform(0.0, 1.0);
        self.resolve_with(proposed, keep, side)
    }

    fn trade_fraction(&self) -> f64 {
        self.uniform(self.cfg.min_trade_fraction, self.cfg.max_trade_fraction)
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// What a single cycle ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Held,
    Traded(TradeAction),
    Failed(TradeAction),
    /// The session was stopped or redeployed at a checkpoint.
    Aborted,
}

pub struct DecisionLoop {
    service: Arc<TradingService>,
    generation: u64,
}

impl DecisionLoop {
    pub fn new(service: Arc<TradingService>, generation: u64) -> Self {
        Self { service, generation }
    }

    /// Run cycles until the session is no longer active for this generation.
    pub async fn run(self) {
        info!(generation = self.generation, "Decision loop started");
        loop {
            if self.run_cycle().await == CycleOutcome::Aborted {
                break;
            }
        }
        info!(generation = self.generation, "Decision loop exited");
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        let policy = self.service.policy();

        let delay = policy.next_delay();
        debug!(delay_secs = delay.as_secs_f64(), "Next decision scheduled");
        tokio::time::sleep(delay).await;

        let proposed = policy.propose();
        if !self
            .service
            .log_if_active(self.generation, session::evaluation_line(proposed))
            .await
        {
            return CycleOutcome::Aborted;
        }
        info!(proposed = %proposed, "Agent evaluation");

        tokio::time::sleep(policy.thinking_delay()).await;

        let (action, overridden) = policy.resolve(proposed);
        let fraction = match action {
            TradeAction::Hold => 0.0,
            _ => policy.trade_fraction(),
        };
        let committed = self
            .service
            .commit_decision(self.generation, action, fraction)
            .await;

        match committed {
            Committed::Inactive => CycleOutcome::Aborted,
            Committed::Held => {
                info!(action = %action, proposed = %proposed, overridden, "Final decision");
                let price = self.service.price().await;
                let balances = self.service.balances().await;
                self.service.dispatch(Notification::Trade { action, price, balances });
                CycleOutcome::Held
            }
            Committed::Traded(receipt) => {
                info!(action = %action, proposed = %proposed, overridden, "Final decision");
                self.service.dispatch(Notification::Trade {
                    action,
                    price: receipt.price,
                    balances: receipt.balances_after,
                });
                CycleOutcome::Traded(action)
            }
            Committed::Failed(e) => {
                let message = e.to_string();
                warn!(action = %action, error = %message, "Decision execution failed");
                self.service.dispatch(Notification::Error {
                    message: format!("Failed to execute {action}"),
                    details: Some(message),
                    balances: Some(self.service.balances().await),
                });
                CycleOutcome::Failed(action)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RandomPolicy {
        RandomPolicy::seeded(AgentConfig::default(), 42)
    }

    #[test]
    fn test_classify_thresholds() {
        let p = policy();
        assert_eq!(p.classify(0.0), TradeAction::Buy);
        assert_eq!(p.classify(0.1999), TradeAction::Buy);
        assert_eq!(p.classify(0.2), TradeAction::Sell);
        assert_eq!(p.classify(0.3999), TradeAction::Sell);
        assert_eq!(p.classify(0.4), TradeAction::Hold);
        assert_eq!(p.classify(0.9999), TradeAction::Hold);
    }

    #[test]
    fn test_resolve_keeps_or_overrides() {
        let p = policy();
        assert_eq!(p.resolve_with(TradeAction::Hold, 0.79, 0.1), (TradeAction::Hold, false));
        assert_eq!(p.resolve_with(TradeAction::Hold, 0.8, 0.1), (TradeAction::Buy, true));
        assert_eq!(p.resolve_with(TradeAction::Buy, 0.95, 0.5), (TradeAction::Sell, true));
    }

    #[test]
    fn test_override_never_holds() {
        let p = policy();
        for _ in 0..2_000 {
            let (action, overridden) = p.resolve(TradeAction::Hold);
            if overridden {
                assert_ne!(action, TradeAction::Hold);
            } else {
                assert_eq!(action, TradeAction::Hold);
            }
        }
    }

    #[test]
    fn test_seeded_distribution_roughly_matches() {
        let p = policy();
        let n = 10_000;
        let mut counts = [0usize; 3];
        for _ in 0..n {
            match p.propose() {
                TradeAction::Buy => counts[0] += 1,
                TradeAction::Sell => counts[1] += 1,
                TradeAction::Hold => counts[2] += 1,
            }
        }
        let share = |c: usize| c as f64 / n as f64;
        assert!((share(counts[0]) - 0.2).abs() < 0.03);
        assert!((share(counts[1]) - 0.2).abs() < 0.03);
        assert!((share(counts[2]) - 0.6).abs() < 0.03);
    }

    #[test]
    fn test_seeded_policies_agree() {
        let a = RandomPolicy::seeded(AgentConfig::default(), 9);
        let b = RandomPolicy::seeded(AgentConfig::default(), 9);
        for _ in 0..100 {
            assert_eq!(a.propose(), b.propose());
        }
    }

    #[test]
    fn test_delays_and_fraction_in_range() {
        let p = policy();
        for _ in 0..500 {
            let d = p.next_delay();
            assert!(d >= Duration::from_secs(15) && d < Duration::from_secs(60));
            let f = p.trade_fraction();
            assert!((0.25..0.75).contains(&f));
        }
        assert_eq!(p.thinking_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_degenerate_range_returns_low() {
        let cfg = AgentConfig {
            min_trade_fraction: 0.5,
            max_trade_fraction: 0.5,
            ..AgentConfig::default()
        };
        assert_eq!(RandomPolicy::seeded(cfg, 1).trade_fraction(), 0.5);
    }
}
