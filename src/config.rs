use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use teloxide::types::{ChatId, UserId};

use crate::payments::cryptobot::{DEFAULT_API_URL, DEFAULT_MARGIN};
use crate::payments::{Plan, PriceList};

pub const DEFAULT_CONFIG_PATH: &str = "animebot.json";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    /// Falls back to the BOT_TOKEN environment variable.
    #[serde(default)]
    telegram_bot_token: Option<String>,
    admin_ids: Vec<u64>,
    /// Falls back to the CRYPTO_TOKEN environment variable.
    #[serde(default)]
    crypto_pay_token: Option<String>,
    #[serde(default)]
    crypto_pay_api_url: Option<String>,
    #[serde(default = "default_crypto_assets")]
    crypto_assets: Vec<String>,
    #[serde(default = "default_crypto_margin")]
    crypto_margin: f64,
    #[serde(default = "default_webhook_bind")]
    webhook_bind: String,
    #[serde(default = "default_webhook_path")]
    webhook_path: String,
    /// Legacy check: the webhook caller's User-Agent must contain this.
    #[serde(default)]
    webhook_user_agent_marker: Option<String>,
    #[serde(default)]
    verify_webhook_signature: Option<bool>,
    /// Directory for the database and logs. Defaults to current directory.
    data_dir: Option<String>,
    log_chat_id: Option<i64>,
    /// File id or URL of the welcome picture.
    #[serde(default)]
    welcome_photo: Option<String>,
    #[serde(default = "default_transfer_details")]
    transfer_details: String,
    #[serde(default = "default_trial_days")]
    trial_days: u32,
    /// Plan key -> price in rubles.
    #[serde(default)]
    prices: HashMap<String, u32>,
}

fn default_crypto_assets() -> Vec<String> {
    vec!["TON".into(), "BTC".into(), "USDT".into()]
}

fn default_crypto_margin() -> f64 {
    DEFAULT_MARGIN
}

fn default_webhook_bind() -> String {
    "0.0.0.0:8080".into()
}

fn default_webhook_path() -> String {
    "/webhook".into()
}

fn default_transfer_details() -> String {
    "Реквизиты уточняйте у администратора".into()
}

fn default_trial_days() -> u32 {
    7
}

pub struct Config {
    pub telegram_bot_token: String,
    pub admin_ids: Vec<UserId>,
    pub crypto_pay_token: Option<String>,
    pub crypto_pay_api_url: String,
    /// Assets shown with approximate amounts next to a crypto invoice.
    pub crypto_assets: Vec<String>,
    pub crypto_margin: f64,
    pub webhook_bind: SocketAddr,
    pub webhook_path: String,
    pub webhook_user_agent_marker: Option<String>,
    pub verify_webhook_signature: bool,
    pub data_dir: PathBuf,
    pub log_chat_id: Option<ChatId>,
    pub welcome_photo: Option<String>,
    pub transfer_details: String,
    pub trial_days: u32,
    pub prices: PriceList,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], with a custom environment lookup.
    pub fn load_with_env<P, F>(path: P, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        let telegram_bot_token = file
            .telegram_bot_token
            .filter(|t| !t.is_empty())
            .or_else(|| env("BOT_TOKEN"))
            .unwrap_or_default();
        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required (or set BOT_TOKEN)".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }

        if file.admin_ids.is_empty() {
            return Err(ConfigError::Validation("admin_ids must contain at least one admin ID".into()));
        }
        if !(0.0..5.0).contains(&file.crypto_margin) {
            return Err(ConfigError::Validation("crypto_margin must be in [0, 5)".into()));
        }
        if !file.webhook_path.starts_with('/') {
            return Err(ConfigError::Validation("webhook_path must start with '/'".into()));
        }
        if file.trial_days == 0 {
            return Err(ConfigError::Validation("trial_days must be positive".into()));
        }
        let webhook_bind: SocketAddr = file.webhook_bind.parse().map_err(|_| {
            ConfigError::Validation(format!("webhook_bind '{}' is not a socket address", file.webhook_bind))
        })?;

        let mut overrides = HashMap::new();
        for (key, price) in file.prices {
            let plan = Plan::from_key(&key)
                .ok_or_else(|| ConfigError::Validation(format!("unknown plan '{key}' in prices")))?;
            overrides.insert(plan, price);
        }

        let crypto_pay_token = file
            .crypto_pay_token
            .filter(|t| !t.is_empty())
            .or_else(|| env("CRYPTO_TOKEN").filter(|t| !t.is_empty()));
        let verify_webhook_signature = file
            .verify_webhook_signature
            .unwrap_or(crypto_pay_token.is_some());

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token,
            admin_ids: file.admin_ids.into_iter().map(UserId).collect(),
            crypto_pay_token,
            crypto_pay_api_url: file.crypto_pay_api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            crypto_assets: file.crypto_assets.into_iter().map(|a| a.to_uppercase()).collect(),
            crypto_margin: file.crypto_margin,
            webhook_bind,
            webhook_path: file.webhook_path,
            webhook_user_agent_marker: file.webhook_user_agent_marker.filter(|m| !m.is_empty()),
            verify_webhook_signature,
            data_dir,
            log_chat_id: file.log_chat_id.map(ChatId),
            welcome_photo: file.welcome_photo.filter(|p| !p.is_empty()),
            transfer_details: file.transfer_details,
            trial_days: file.trial_days,
            prices: PriceList::with_overrides(&overrides),
        })
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("anime.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Token the webhook verifies signatures with, if verification is on.
    pub fn webhook_signing_token(&self) -> Option<String> {
        if self.verify_webhook_signature {
            self.crypto_pay_token.clone()
        } else {
            None
        }
    }
}
