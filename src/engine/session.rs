//! Agent session: lifecycle status, log lines and the loop generation.
//!
//! Every deploy bumps `generation`; a decision loop only acts while the
//! session is running with the generation it was started for.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::notify::ListenerHandle;
use crate::types::{AgentStatus, DeployParams, TradeAction};

/// Why the agent was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    UserRequest,
    RemoteCommand,
}

impl StopReason {
    /// Human-readable reason carried in the stop notification.
    pub fn describe(&self) -> &'static str {
        match self {
            StopReason::UserRequest => "Stopped by user request",
            StopReason::RemoteCommand => "Stopped by Telegram command",
        }
    }
}

#[derive(Debug, Default)]
pub struct AgentSession {
    status: AgentStatus,
    logs: Vec<String>,
    generation: u64,
    listener: Option<ListenerHandle>,
}

impl AgentSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Clear logs, mark running and return the new generation.
    /// Any listener from a previous run is stopped.
    pub fn start(&mut self) -> u64 {
        self.stop_listener();
        self.logs.clear();
        self.status = AgentStatus::Running;
        self.generation += 1;
        self.generation
    }

    /// Mark stopped and cancel the command listener.
    pub fn stop(&mut self) {
        self.status = AgentStatus::Stopped;
        self.stop_listener();
    }

    /// Whether a loop started for `generation` may keep acting.
    pub fn is_active(&self, generation: u64) -> bool {
        self.status == AgentStatus::Running && self.generation == generation
    }

    pub fn set_listener(&mut self, listener: Option<ListenerHandle>) {
        self.stop_listener();
        self.listener = listener;
    }

    fn stop_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// All log lines joined with newlines.
    pub fn log_text(&self) -> String {
        self.logs.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Log lines
// ---------------------------------------------------------------------------

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn started_line(params: &DeployParams) -> String {
    format!("[INFO] Agent starting with parameters: {params}")
}

pub fn initialized_line(at: DateTime<Utc>) -> String {
    format!("[INFO] Agent initialized at {}", iso(at))
}

pub fn evaluation_line(action: TradeAction) -> String {
    format!("[AGENT EVALUATION] Agent Based Analysis Result: {action}")
}

pub fn final_decision_line(action: TradeAction, at: DateTime<Utc>) -> String {
    format!("[FINAL DECISION] {action} at {}", iso(at))
}

pub fn stopped_line(reason: StopReason, at: DateTime<Utc>) -> String {
    match reason {
        StopReason::UserRequest => format!("[INFO] Agent stopped at {}", iso(at)),
        StopReason::RemoteCommand => {
            format!("[INFO] Agent stopped by Telegram command at {}", iso(at))
        }
    }
}

pub fn error_line(action: TradeAction, message: &str) -> String {
    format!("[ERROR] Failed to execute {action}: {message}")
}
