//! Outbound notifications.
//!
//! Defines the `NotificationSink` trait the engine reports to, and the
//! Telegram implementation. Every notification is best-effort: sinks
//! swallow their own failures and the engine never waits on delivery.

pub mod telegram;

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::types::{Balances, TradeAction};

/// Agent lifecycle events reported through status notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Started,
    Stopped,
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKind::Started => write!(f, "STARTED"),
            StatusKind::Stopped => write!(f, "STOPPED"),
            StatusKind::Error => write!(f, "ERROR"),
        }
    }
}

/// A message the engine wants delivered to a human.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A BUY/SELL/HOLD decision and the balances after acting on it.
    Trade {
        action: TradeAction,
        price: f64,
        balances: Balances,
    },
    /// Agent started, stopped or failed.
    Status {
        status: StatusKind,
        reason: Option<String>,
        balances: Option<Balances>,
        error: Option<String>,
    },
    /// A fault inside a decision cycle.
    Error {
        message: String,
        details: Option<String>,
        balances: Option<Balances>,
    },
    /// Free-form text (command replies, startup banner).
    Message(String),
}

/// Commands a remote operator can send while the agent is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Stop,
    Status,
    Balance,
    Help,
}

impl BotCommand {
    /// Parse a chat message such as `/stop` or `/Stop@my_bot`.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().split_whitespace().next()?.to_lowercase();
        let command = word.split('@').next().unwrap_or_default();
        match command {
            "/stop" => Some(BotCommand::Stop),
            "/status" => Some(BotCommand::Status),
            "/balance" => Some(BotCommand::Balance),
            "/help" => Some(BotCommand::Help),
            _ => None,
        }
    }
}

/// Command list sent in reply to `/help` and in the startup banner.
pub const HELP_TEXT: &str = "<b>Available Commands:</b>\n\n\
    /status - Check agent status\n\
    /stop - Stop the trading agent\n\
    /balance - Show current balances\n\
    /help - Show this message";

/// Handle to a running command listener. Stopping aborts the poll task.
#[derive(Debug)]
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

/// Destination for engine notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a notification. Must not fail; unconfigured sinks no-op.
    async fn notify(&self, notification: Notification);

    /// Start forwarding remote commands to `commands`, if supported.
    fn spawn_command_listener(
        &self,
        _commands: UnboundedSender<BotCommand>,
    ) -> Option<ListenerHandle> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(BotCommand::parse("/stop"), Some(BotCommand::Stop));
        assert_eq!(BotCommand::parse("  /STATUS "), Some(BotCommand::Status));
        assert_eq!(BotCommand::parse("/balance please"), Some(BotCommand::Balance));
        assert_eq!(BotCommand::parse("/help@defai_bot"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("stop"), None);
        assert_eq!(BotCommand::parse(""), None);
        assert_eq!(BotCommand::parse("/start"), None);
    }

    #[tokio::test]
    async fn test_listener_handle_stop() {
        let task = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        let abort = task.abort_handle();
        let handle = ListenerHandle::new(task);
        assert!(!abort.is_finished());
        handle.stop();
        tokio::task::yield_now().await;
        assert!(abort.is_finished());
    }
}
