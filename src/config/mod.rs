use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::{EventType, MonitoredUser};

const DEFAULT_SETTINGS_PATH: &str = "config.json";
const DEFAULT_STATE_PATH: &str = "data/state.json";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Process-level configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub settings_path: PathBuf,
    pub state_path: PathBuf,
    pub metrics_addr: Option<SocketAddr>,
    pub log_json: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            telegram_chat_id: required("TELEGRAM_CHAT_ID")?,
            settings_path: env::var("MONITOR_CONFIG_PATH")
                .unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.into())
                .into(),
            state_path: env::var("STATE_PATH")
                .unwrap_or_else(|_| DEFAULT_STATE_PATH.into())
                .into(),
            metrics_addr: match env::var("METRICS_ADDR") {
                Ok(raw) if !raw.trim().is_empty() => Some(
                    raw.trim()
                        .parse()
                        .with_context(|| format!("METRICS_ADDR is not a socket address: {raw}"))?,
                ),
                _ => None,
            },
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => anyhow::bail!(
            "{key} is not set. Copy .env.example to .env and fill in your credentials."
        ),
    }
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// Per-event-type notification toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub on_new_position: bool,
    #[serde(default = "default_true")]
    pub on_position_increase: bool,
    #[serde(default)]
    pub on_position_closed: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            on_new_position: true,
            on_position_increase: true,
            on_position_closed: false,
        }
    }
}

impl NotificationSettings {
    pub fn is_enabled(&self, event_type: EventType) -> bool {
        match event_type {
            EventType::NewPosition => self.on_new_position,
            EventType::PositionIncreased => self.on_position_increase,
            EventType::PositionClosed => self.on_position_closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredUserConfig {
    pub username: String,
    pub profile_url: String,
    /// Skips username resolution when set.
    #[serde(default)]
    pub wallet_address: String,
}

impl MonitoredUserConfig {
    pub fn to_user(&self) -> MonitoredUser {
        MonitoredUser::new(&self.username, &self.profile_url).with_wallet(&self.wallet_address)
    }
}

/// Contents of the JSON settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_poll_interval")]
    pub polling_interval_seconds: u64,
    #[serde(default)]
    pub monitored_users: Vec<MonitoredUserConfig>,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default = "default_true")]
    pub first_run_suppress_notifications: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            polling_interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            monitored_users: Vec::new(),
            notifications: NotificationSettings::default(),
            first_run_suppress_notifications: true,
        }
    }
}

impl MonitorSettings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn from_json(contents: &str) -> anyhow::Result<Self> {
        let settings: Self = serde_json::from_str(contents)?;
        if settings.polling_interval_seconds == 0 {
            anyhow::bail!("polling_interval_seconds must be greater than zero");
        }
        Ok(settings)
    }
}
