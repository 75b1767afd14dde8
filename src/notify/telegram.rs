//! Telegram notification sink.
//!
//! Sends HTML-formatted trading, status and error alerts through the Bot
//! API and, while the agent runs, polls `getUpdates` for operator
//! commands. Settings come from env vars and a JSON file saved by the
//! configure endpoint. Without both a bot token and a chat id the sink is
//! disabled and every call is a silent no-op.
//!
//! API docs: https://core.telegram.org/bots/api

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::{BotCommand, ListenerHandle, Notification, NotificationSink, StatusKind, HELP_TEXT};
use crate::config::TelegramConfig;
use crate::storage;
use crate::types::{Balances, TradeAction};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Which notifications reach the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything.
    #[default]
    All,
    /// Trading decisions, status changes and errors.
    Decisions,
    /// Status changes and errors only.
    Errors,
}

/// Partial settings update, as accepted by the configure endpoint and
/// stored in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
}

struct Settings {
    bot_token: Option<SecretString>,
    chat_id: String,
    /// Operator switch; delivery also needs credentials.
    switched_on: bool,
    log_level: LogLevel,
}

impl Settings {
    fn enabled(&self) -> bool {
        self.switched_on
            && !self.chat_id.trim().is_empty()
            && self
                .bot_token
                .as_ref()
                .is_some_and(|t| !t.expose_secret().trim().is_empty())
    }

    fn apply(&mut self, update: &TelegramUpdate) {
        if let Some(token) = &update.bot_token {
            self.bot_token = Some(SecretString::new(token.clone()));
        }
        if let Some(chat_id) = &update.chat_id {
            self.chat_id = chat_id.clone();
        }
        if let Some(enabled) = update.enabled {
            self.switched_on = enabled;
        }
        if let Some(level) = update.log_level {
            self.log_level = level;
        }
    }

    fn to_file(&self) -> TelegramUpdate {
        TelegramUpdate {
            bot_token: self.bot_token.as_ref().map(|t| t.expose_secret().clone()),
            chat_id: Some(self.chat_id.clone()),
            enabled: Some(self.switched_on),
            log_level: Some(self.log_level),
        }
    }
}

/// Public view of the sink configuration. Never includes the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramStatus {
    pub enabled: bool,
    pub log_level: LogLevel,
}

// ---------------------------------------------------------------------------
// Bot API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

pub struct TelegramNotifier {
    http: Client,
    api_base: String,
    settings: RwLock<Settings>,
    config_path: Option<PathBuf>,
    poll_interval: Duration,
}

impl TelegramNotifier {
    /// Create a notifier with no credentials (disabled until configured).
    ///
    /// `config_path`, when set, receives the settings on every
    /// [`configure`](Self::configure) call.
    pub fn new(api_base: &str, config_path: Option<PathBuf>, poll_interval: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("DeFAI/0.1.0")
            .build()
            .context("Failed to build HTTP client for Telegram")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            settings: RwLock::new(Settings {
                bot_token: None,
                chat_id: String::new(),
                switched_on: true,
                log_level: LogLevel::All,
            }),
            config_path,
            poll_interval,
        })
    }

    /// Build from config: env credentials first, then the saved file.
    pub fn from_config(cfg: &TelegramConfig) -> Result<Self> {
        let path = PathBuf::from(&cfg.config_file);
        let notifier = Self::new(
            &cfg.api_base,
            Some(path.clone()),
            Duration::from_secs(cfg.poll_interval_secs.max(1)),
        )?;

        let from_env = TelegramUpdate {
            bot_token: std::env::var(&cfg.bot_token_env).ok(),
            chat_id: std::env::var(&cfg.chat_id_env).ok(),
            ..Default::default()
        };
        notifier.write_settings().apply(&from_env);

        match storage::load_json::<TelegramUpdate>(&path) {
            Ok(Some(saved)) => {
                notifier.write_settings().apply(&saved);
                info!("Telegram configuration loaded from file");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to load Telegram configuration"),
        }

        let status = notifier.status();
        info!(
            enabled = status.enabled,
            log_level = ?status.log_level,
            "Telegram notifications {}",
            if status.enabled { "ENABLED" } else { "DISABLED" }
        );
        Ok(notifier)
    }

    /// Merge new settings, persist them, and report whether the sink is
    /// now enabled. A failed save is logged and otherwise ignored.
    pub fn configure(&self, update: &TelegramUpdate) -> bool {
        let (enabled, file) = {
            let mut settings = self.write_settings();
            settings.apply(update);
            (settings.enabled(), settings.to_file())
        };

        if let Some(path) = &self.config_path {
            match storage::save_json(&file, path) {
                Ok(()) => info!(path = %path.display(), "Telegram configuration saved"),
                Err(e) => warn!(error = %e, "Error saving Telegram configuration"),
            }
        }

        info!(enabled, "Telegram configured");
        enabled
    }

    pub fn status(&self) -> TelegramStatus {
        let settings = self.read_settings();
        TelegramStatus {
            enabled: settings.enabled(),
            log_level: settings.log_level,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.read_settings().enabled()
    }

    /// Send raw HTML text to the configured chat.
    /// Returns whether the Bot API accepted it.
    pub async fn send_message(&self, text: &str) -> bool {
        let Some((token, chat_id)) = self.credentials() else {
            debug!("Telegram notifications disabled, not sending message");
            return false;
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, token.expose_secret());
        let body = SendMessageRequest {
            chat_id: &chat_id,
            text,
            parse_mode: "HTML",
        };

        let resp = match self.http.post(&url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                // reqwest errors carry the URL, which embeds the token.
                warn!(error = %e.without_url(), "Error sending Telegram message");
                return false;
            }
        };

        match resp.json::<ApiResponse<serde_json::Value>>().await {
            Ok(api) if api.ok => {
                debug!("Telegram message sent successfully");
                true
            }
            Ok(api) => {
                warn!(description = ?api.description, "Failed to send Telegram message");
                false
            }
            Err(e) => {
                warn!(error = %e.without_url(), "Unreadable Telegram response");
                false
            }
        }
    }

    fn credentials(&self) -> Option<(SecretString, String)> {
        let settings = self.read_settings();
        if !settings.enabled() {
            return None;
        }
        let token = SecretString::new(settings.bot_token.as_ref()?.expose_secret().clone());
        Some((token, settings.chat_id.clone()))
    }

    fn read_settings(&self) -> std::sync::RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_settings(&self) -> std::sync::RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn notify(&self, notification: Notification) {
        let (enabled, level) = {
            let settings = self.read_settings();
            (settings.enabled(), settings.log_level)
        };
        if !enabled {
            return;
        }

        let now = Utc::now();
        let text = match notification {
            Notification::Trade { action, price, balances } => {
                if level == LogLevel::Errors {
                    return;
                }
                format_trade(action, price, &balances, now)
            }
            Notification::Status { status, reason, balances, error } => {
                format_status(status, reason.as_deref(), balances.as_ref(), error.as_deref(), now)
            }
            Notification::Error { message, details, balances } => {
                format_error(&message, details.as_deref(), balances.as_ref(), now)
            }
            Notification::Message(text) => text,
        };

        self.send_message(&text).await;
    }

    fn spawn_command_listener(
        &self,
        commands: UnboundedSender<BotCommand>,
    ) -> Option<ListenerHandle> {
        let Some((token, chat_id)) = self.credentials() else {
            debug!("Telegram notifications disabled, not setting up command listener");
            return None;
        };

        info!("Setting up Telegram command listener");
        let poller = CommandPoller {
            http: self.http.clone(),
            url: format!("{}/bot{}/getUpdates", self.api_base, token.expose_secret()),
            chat_id,
            poll_interval: self.poll_interval,
        };
        Some(ListenerHandle::new(tokio::spawn(poller.run(commands))))
    }
}

// ---------------------------------------------------------------------------
// Command polling
// ---------------------------------------------------------------------------

struct CommandPoller {
    http: Client,
    url: String,
    chat_id: String,
    poll_interval: Duration,
}

impl CommandPoller {
    async fn run(self, commands: UnboundedSender<BotCommand>) {
        let mut last_update_id: i64 = 0;
        loop {
            match self.poll(last_update_id + 1).await {
                Ok(updates) => {
                    for update in updates {
                        last_update_id = last_update_id.max(update.update_id);
                        let Some(command) = self.command_from(&update) else {
                            continue;
                        };
                        info!(command = ?command, "Received Telegram command");
                        if commands.send(command).is_err() {
                            debug!("Command receiver dropped, listener exiting");
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Error polling Telegram updates"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn poll(&self, offset: i64) -> Result<Vec<Update>> {
        let resp = self
            .http
            .get(&self.url)
            .query(&[("offset", offset)])
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("getUpdates request failed")?;

        let api: ApiResponse<Vec<Update>> = resp
            .json()
            .await
            .map_err(|e| e.without_url())
            .context("Failed to parse getUpdates response")?;

        if !api.ok {
            anyhow::bail!(
                "getUpdates rejected: {}",
                api.description.unwrap_or_default()
            );
        }
        Ok(api.result.unwrap_or_default())
    }

    /// Only messages from the configured chat count.
    fn command_from(&self, update: &Update) -> Option<BotCommand> {
        let message = update.message.as_ref()?;
        if message.chat.id.to_string() != self.chat_id.trim() {
            return None;
        }
        BotCommand::parse(message.text.as_deref()?)
    }
}

// ---------------------------------------------------------------------------
// Message formatting
// ---------------------------------------------------------------------------

fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escape free text for Telegram's HTML parse mode.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn push_balances(message: &mut String, balances: &Balances) {
    let _ = write!(
        message,
        "<b>Current Balances:</b>\nSUI: {:.6}\nUSDC: {:.2}\n\n",
        balances.sui, balances.usdc
    );
}

pub fn format_trade(action: TradeAction, price: f64, balances: &Balances, now: DateTime<Utc>) -> String {
    let emoji = match action {
        TradeAction::Buy => "🟢",
        TradeAction::Sell => "🔴",
        TradeAction::Hold => "🟡",
    };

    let mut message = format!("<b>{emoji} {action} Signal</b>\n\n");
    if price > 0.0 {
        let _ = write!(message, "<b>Price:</b> ${price:.4}\n\n");
    }
    push_balances(&mut message, balances);
    let _ = write!(message, "<i>{}</i>", timestamp(now));
    message
}

pub fn format_status(
    status: StatusKind,
    reason: Option<&str>,
    balances: Option<&Balances>,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let emoji = match status {
        StatusKind::Started => "▶️",
        StatusKind::Stopped => "⏹️",
        StatusKind::Error => "⚠️",
    };

    let mut message = format!("<b>{emoji} Trading Agent {status}</b>\n\n");
    if let Some(reason) = reason {
        let _ = write!(message, "<b>Reason:</b> {}\n\n", escape_html(reason));
    }
    if let Some(balances) = balances {
        push_balances(&mut message, balances);
    }
    if let Some(error) = error {
        let _ = write!(message, "<b>Error:</b> {}\n\n", escape_html(error));
    }
    let _ = write!(message, "<i>{}</i>", timestamp(now));
    message
}

pub fn format_error(
    error: &str,
    details: Option<&str>,
    balances: Option<&Balances>,
    now: DateTime<Utc>,
) -> String {
    let mut message = format!("<b>⚠️ ERROR</b>\n\n{}\n\n", escape_html(error));
    if let Some(details) = details {
        let _ = write!(message, "<b>Details:</b> {}\n\n", escape_html(details));
    }
    if let Some(balances) = balances {
        push_balances(&mut message, balances);
    }
    let _ = write!(message, "<i>{}</i>", timestamp(now));
    message
}

/// Banner sent when the server comes up.
pub fn startup_message(price: f64) -> String {
    format!(
        "🤖 <b>DeFAI Trading Agent Server Started</b>\n\n\
         The trading agent server is now online and ready to receive commands.\n\n\
         {HELP_TEXT}\n\n\
         Current SUI price: {price:.4}"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
