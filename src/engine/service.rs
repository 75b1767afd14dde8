//! Trading service: owns the ledger, the agent session and the
//! collaborators, and exposes the operations the HTTP layer and the
//! command listener call.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::engine::decision::{DecisionLoop, DecisionPolicy};
use crate::engine::ledger::Ledger;
use crate::engine::session::{self, AgentSession, StopReason};
use crate::engine::swap::SwapEngine;
use crate::notify::{BotCommand, Notification, NotificationSink, StatusKind, HELP_TEXT};
use crate::oracle::PriceOracle;
use crate::types::{AgentStatus, Asset, Balances, DeployParams, EngineError, SwapReceipt, TradeAction};

/// Result of the final checkpoint of a decision cycle.
#[derive(Debug)]
pub(crate) enum Committed {
    /// The session was stopped or redeployed; nothing was recorded.
    Inactive,
    Held,
    Traded(SwapReceipt),
    Failed(EngineError),
}

pub struct TradingService {
    ledger: RwLock<Ledger>,
    session: RwLock<AgentSession>,
    oracle: Arc<PriceOracle>,
    policy: Arc<dyn DecisionPolicy>,
    sink: Arc<dyn NotificationSink>,
}

impl TradingService {
    pub fn new(
        ledger: Ledger,
        oracle: Arc<PriceOracle>,
        policy: Arc<dyn DecisionPolicy>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            ledger: RwLock::new(ledger),
            session: RwLock::new(AgentSession::new()),
            oracle,
            policy,
            sink,
        }
    }

    pub fn oracle(&self) -> &Arc<PriceOracle> {
        &self.oracle
    }

    pub(crate) fn policy(&self) -> Arc<dyn DecisionPolicy> {
        Arc::clone(&self.policy)
    }

    pub async fn price(&self) -> f64 {
        self.oracle.price().await
    }

    // -- Ledger ------------------------------------------------------------

    pub async fn balances(&self) -> Balances {
        self.ledger.read().await.balances()
    }

    pub async fn set_balances(&self, sui: Option<f64>, usdc: Option<f64>) -> Result<Balances, EngineError> {
        self.ledger.write().await.set(sui, usdc)
    }

    /// Externally requested swap. Records the decision and notifies.
    pub async fn swap(&self, from: Asset, to: Asset, amount: Option<f64>) -> Result<SwapReceipt, EngineError> {
        let price = self.oracle.price().await;
        let receipt = {
            let mut ledger = self.ledger.write().await;
            SwapEngine::execute(&mut ledger, from, to, amount, price)?
        };

        let action = receipt.action();
        self.session
            .write()
            .await
            .push(session::final_decision_line(action, receipt.timestamp));
        self.dispatch(Notification::Trade {
            action,
            price: receipt.price,
            balances: receipt.balances_after,
        });
        Ok(receipt)
    }

    /// Record the final decision for `generation` and carry it out.
    ///
    /// The session guard is held through the swap, so a concurrent stop
    /// lands either before the decision (nothing happens) or after the trade.
    pub(crate) async fn commit_decision(&self, generation: u64, action: TradeAction, fraction: f64) -> Committed {
        let price = self.oracle.price().await;
        let mut session = self.session.write().await;
        if !session.is_active(generation) {
            return Committed::Inactive;
        }
        session.push(session::final_decision_line(action, Utc::now()));

        let Some((from, to)) = action.direction() else {
            return Committed::Held;
        };
        let result = {
            let mut ledger = self.ledger.write().await;
            let amount = ledger.balance(from) * fraction;
            SwapEngine::execute(&mut ledger, from, to, Some(amount), price)
        };
        match result {
            Ok(receipt) => Committed::Traded(receipt),
            Err(e) => {
                session.push(session::error_line(action, &e.to_string()));
                Committed::Failed(e)
            }
        }
    }

    // -- Agent lifecycle ---------------------------------------------------

    pub async fn status(&self) -> AgentStatus {
        self.session.read().await.status()
    }

    pub async fn logs(&self) -> String {
        self.session.read().await.log_text()
    }

    /// Append `line` only if `generation` is still the running session.
    pub(crate) async fn log_if_active(&self, generation: u64, line: String) -> bool {
        let mut session = self.session.write().await;
        if !session.is_active(generation) {
            return false;
        }
        session.push(line);
        true
    }

    /// Start (or restart) the agent. Returns the new session generation.
    ///
    /// A loop from an earlier generation exits at its next checkpoint.
    pub async fn deploy(self: &Arc<Self>, params: DeployParams) -> u64 {
        let now = Utc::now();
        let generation = {
            let mut session = self.session.write().await;
            let generation = session.start();
            session.push(session::started_line(&params));
            session.push(session::initialized_line(now));
            session.push(session::evaluation_line(TradeAction::Hold));
            generation
        };

        info!(generation, params = %params, "Agent deployed");
        self.dispatch(Notification::Status {
            status: StatusKind::Started,
            reason: Some(format!("Started with parameters: {params}")),
            balances: Some(self.balances().await),
            error: None,
        });

        self.start_command_listener(generation).await;
        tokio::spawn(DecisionLoop::new(Arc::clone(self), generation).run());
        generation
    }

    pub async fn stop(&self, reason: StopReason) {
        {
            let mut session = self.session.write().await;
            session.stop();
            session.push(session::stopped_line(reason, Utc::now()));
        }

        info!(reason = reason.describe(), "Agent stopped");
        self.dispatch(Notification::Status {
            status: StatusKind::Stopped,
            reason: Some(reason.describe().to_string()),
            balances: Some(self.balances().await),
            error: None,
        });
    }

    async fn start_command_listener(self: &Arc<Self>, generation: u64) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let Some(listener) = self.sink.spawn_command_listener(tx) else {
            return;
        };

        {
            let mut session = self.session.write().await;
            if !session.is_active(generation) {
                listener.stop();
                return;
            }
            session.set_listener(Some(listener));
        }

        // Ends once the listener is stopped and its sender dropped.
        let service = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                service.handle_command(command).await;
            }
            debug!(generation, "Command consumer exited");
        });
    }

    /// React to a remote operator command.
    pub async fn handle_command(&self, command: BotCommand) {
        match command {
            BotCommand::Stop => self.stop(StopReason::RemoteCommand).await,
            BotCommand::Status => {
                let status = match self.status().await {
                    AgentStatus::Running => "RUNNING ▶️",
                    AgentStatus::Stopped => "STOPPED ⏹️",
                };
                let balances = self.balances().await;
                self.dispatch(Notification::Message(format!(
                    "<b>Agent Status:</b> {status}\n\n\
                     <b>Current Balances:</b>\nSUI: {:.6}\nUSDC: {:.2}",
                    balances.sui, balances.usdc
                )));
            }
            BotCommand::Balance => {
                let balances = self.balances().await;
                let price = self.price().await;
                self.dispatch(Notification::Message(format!(
                    "<b>Current Balances:</b>\nSUI: {:.6}\nUSDC: {:.2}\n\n\
                     <b>SUI Price:</b> ${price:.4}\n\
                     <b>Total Value:</b> ${:.2}",
                    balances.sui,
                    balances.usdc,
                    balances.sui * price + balances.usdc
                )));
            }
            BotCommand::Help => self.dispatch(Notification::Message(HELP_TEXT.to_string())),
        }
    }

    /// Fire-and-forget delivery to the sink.
    pub(crate) fn dispatch(&self, notification: Notification) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            sink.notify(notification).await;
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
