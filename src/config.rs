use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::scheduling::reminders::validate_cron;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file '{}': {source}", .path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },

    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),

    #[error("invalid weekly_reminder_cron '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Chat id of the single teacher.
    teacher_id: i64,
    /// Channel that receives the 10-minute lesson reminders.
    broadcast_chat_id: Option<i64>,
    /// Chat that receives the bot's own logs.
    log_chat_id: Option<i64>,
    /// Directory for the database and logs. Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default = "default_weekly_cron")]
    weekly_reminder_cron: String,
    #[serde(default = "default_event_poll_ms")]
    event_poll_ms: u64,
    #[serde(default = "default_reminder_poll_secs")]
    reminder_poll_secs: u64,
    #[serde(default = "default_transient_ttl_secs")]
    transient_ttl_secs: u64,
    #[serde(default = "default_direction")]
    default_direction: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_weekly_cron() -> String {
    // sec min hour day month dow year
    "0 0 18 * * Sun *".to_string()
}

fn default_event_poll_ms() -> u64 {
    1000
}

fn default_reminder_poll_secs() -> u64 {
    60
}

fn default_transient_ttl_secs() -> u64 {
    5
}

fn default_direction() -> String {
    "Общее".to_string()
}

pub struct Config {
    pub telegram_bot_token: String,
    pub teacher_id: i64,
    pub broadcast_chat_id: Option<i64>,
    pub log_chat_id: Option<i64>,
    /// Directory for state files (database, logs).
    pub data_dir: PathBuf,
    /// Zone the weekly reminder schedule is evaluated in.
    pub timezone: Tz,
    pub weekly_reminder_cron: String,
    pub event_poll: Duration,
    pub reminder_poll: Duration,
    /// How long transient notices stay visible.
    pub transient_ttl: Duration,
    /// Direction recorded for bookings made from the calendar.
    pub default_direction: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }
        if file.teacher_id == 0 {
            return Err(ConfigError::Validation("teacher_id must be a Telegram chat id".into()));
        }
        if file.event_poll_ms == 0 || file.reminder_poll_secs == 0 {
            return Err(ConfigError::Validation("poll intervals must be positive".into()));
        }
        if file.default_direction.trim().is_empty() {
            return Err(ConfigError::Validation("default_direction must not be empty".into()));
        }

        let timezone: Tz = file
            .timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(file.timezone.clone()))?;
        validate_cron(&file.weekly_reminder_cron).map_err(|reason| ConfigError::InvalidCron {
            expr: file.weekly_reminder_cron.clone(),
            reason,
        })?;

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            teacher_id: file.teacher_id,
            broadcast_chat_id: file.broadcast_chat_id,
            log_chat_id: file.log_chat_id,
            data_dir,
            timezone,
            weekly_reminder_cron: file.weekly_reminder_cron,
            event_poll: Duration::from_millis(file.event_poll_ms),
            reminder_poll: Duration::from_secs(file.reminder_poll_secs),
            transient_ttl: Duration::from_secs(file.transient_ttl_secs),
            default_direction: file.default_direction,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("schedule.db")
    }
}
