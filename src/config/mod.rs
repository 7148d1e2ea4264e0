//! # Configuration Management Module
//!
//! Loads, validates and writes the bot's TOML configuration.
//!
//! ## Configuration Structure
//!
//! - [`BotConfig`] - Node identity, channel and firmware strings
//! - [`ReplyConfig`] - Quiet window, cooldown and feature toggles for the reply engine
//! - [`StorageConfig`] - Where the relay directory lives and how large the peer table is
//! - [`LoggingConfig`] - Log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pingbot::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Bot name: {}", config.bot.name);
//!     Config::create_default("config.example.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [bot]
//! name = "Mr.Pong🏓"
//! channel = 0
//! channel_name = "#test"
//!
//! [reply]
//! quiet_threshold = 20
//! cooldown_seconds = 5
//!
//! [storage]
//! data_dir = "./data"
//! ```
//!
//! Every field has a default, so a partial file (or an empty one) loads.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Advertised node name; also prefixes every outgoing channel message.
    #[serde(default = "default_name")]
    pub name: String,
    /// Plain name people type to address the bot. Derived from `name` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention: Option<String>,
    /// Channel index the bot listens and replies on.
    #[serde(default)]
    pub channel: u8,
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,
    #[serde(default = "default_firmware_build")]
    pub firmware_build: String,
    /// Minutes between flood self-adverts; 0 disables them.
    #[serde(default)]
    pub flood_advert_interval_minutes: u32,
}

fn default_name() -> String {
    "Mr.Pong🏓".to_string()
}

fn default_channel_name() -> String {
    "#test".to_string()
}

fn default_firmware_version() -> String {
    "v1.0.0".to_string()
}

fn default_firmware_build() -> String {
    "2026-02-25".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            mention: None,
            channel: 0,
            channel_name: default_channel_name(),
            firmware_version: default_firmware_version(),
            firmware_build: default_firmware_build(),
            flood_advert_interval_minutes: 0,
        }
    }
}

impl BotConfig {
    /// Name matched (case-insensitively) inside a message body to address the bot.
    ///
    /// Without an explicit `mention`, emoji and other non-ASCII symbols are dropped
    /// from `name`: `Mr.Pong🏓` becomes `Mr.Pong`.
    pub fn plain_name(&self) -> String {
        if let Some(m) = self.mention.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            return m.to_string();
        }
        self.name
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_ascii_punctuation() || *c == ' ')
            .collect::<String>()
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    /// Full build with relay statistics and the addressed commands.
    #[serde(default = "default_true")]
    pub enable_stats: bool,
    /// Persist relay-type peers across restarts.
    #[serde(default = "default_true")]
    pub enable_persistence: bool,
    /// Sliding window span used for quiet mode.
    #[serde(default = "default_window_seconds")]
    pub quiet_window_seconds: u64,
    /// Maximum number of arrivals tracked inside the window.
    #[serde(default = "default_window_capacity")]
    pub quiet_window_capacity: usize,
    /// Arrivals inside the window at which the bot goes quiet.
    #[serde(default = "default_quiet_threshold")]
    pub quiet_threshold: usize,
    /// Minimum gap between two auto-replies.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// Fixed pause before an auto-reply goes out.
    #[serde(default = "default_pre_send_pause_ms")]
    pub pre_send_pause_ms: u64,
    /// Upper bound for `"<name>: <text>"` in bytes.
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,
}

fn default_true() -> bool {
    true
}

fn default_window_seconds() -> u64 {
    5 * 60
}

fn default_window_capacity() -> usize {
    255
}

fn default_quiet_threshold() -> usize {
    20
}

fn default_cooldown_seconds() -> u64 {
    5
}

fn default_pre_send_pause_ms() -> u64 {
    300
}

fn default_max_text_len() -> usize {
    160
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            enable_stats: true,
            enable_persistence: true,
            quiet_window_seconds: default_window_seconds(),
            quiet_window_capacity: default_window_capacity(),
            quiet_threshold: default_quiet_threshold(),
            cooldown_seconds: default_cooldown_seconds(),
            pre_send_pause_ms: default_pre_send_pause_ms(),
            max_text_len: default_max_text_len(),
        }
    }
}

impl ReplyConfig {
    pub fn window_span_ms(&self) -> u64 {
        self.quiet_window_seconds.saturating_mul(1000)
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_seconds.saturating_mul(1000)
    }

    pub fn pre_send_pause(&self) -> Duration {
        Duration::from_millis(self.pre_send_pause_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Relay directory file name inside `data_dir`.
    #[serde(default = "default_peers_file")]
    pub peers_file: String,
    /// Capacity of the in-memory peer table; new peers are rejected when full.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
    /// Delay between the first unsaved relay change and the rewrite.
    #[serde(default = "default_save_delay_seconds")]
    pub save_delay_seconds: u64,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_peers_file() -> String {
    "relays.bin".to_string()
}

fn default_max_peers() -> usize {
    350
}

fn default_save_delay_seconds() -> u64 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            peers_file: default_peers_file(),
            max_peers: default_max_peers(),
            save_delay_seconds: default_save_delay_seconds(),
        }
    }
}

impl StorageConfig {
    pub fn peers_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.peers_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: Some("pingbot.log".to_string()),
        }
    }
}

impl LoggingConfig {
    /// Parsed level; unknown strings fall back to `Info`.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject combinations the reply engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.bot.name.trim().is_empty() {
            return Err(anyhow!("bot.name must not be empty"));
        }
        if self.bot.plain_name().is_empty() {
            return Err(anyhow!(
                "bot.name '{}' has no plain characters; set bot.mention",
                self.bot.name
            ));
        }
        if self.reply.quiet_threshold == 0 {
            return Err(anyhow!("reply.quiet_threshold must be at least 1"));
        }
        if self.reply.quiet_window_capacity < self.reply.quiet_threshold {
            return Err(anyhow!(
                "reply.quiet_window_capacity ({}) must be >= reply.quiet_threshold ({})",
                self.reply.quiet_window_capacity,
                self.reply.quiet_threshold
            ));
        }
        if self.reply.max_text_len <= self.bot.name.len() + 2 {
            return Err(anyhow!(
                "reply.max_text_len ({}) leaves no room after the '{}: ' prefix",
                self.reply.max_text_len,
                self.bot.name
            ));
        }
        if self.storage.max_peers == 0 {
            return Err(anyhow!("storage.max_peers must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_firmware_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.reply.quiet_window_seconds, 300);
        assert_eq!(cfg.reply.quiet_window_capacity, 255);
        assert_eq!(cfg.reply.quiet_threshold, 20);
        assert_eq!(cfg.reply.cooldown_ms(), 5000);
        assert_eq!(cfg.reply.pre_send_pause(), Duration::from_millis(300));
        assert_eq!(cfg.storage.max_peers, 350);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn plain_name_drops_emoji() {
        let bot = BotConfig::default();
        assert_eq!(bot.plain_name(), "Mr.Pong");

        let explicit = BotConfig {
            mention: Some("pong".to_string()),
            ..BotConfig::default()
        };
        assert_eq!(explicit.plain_name(), "pong");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str("[reply]\nquiet_threshold = 3\n").unwrap();
        assert_eq!(cfg.reply.quiet_threshold, 3);
        assert_eq!(cfg.reply.cooldown_seconds, 5);
        assert_eq!(cfg.bot.channel_name, "#test");
        assert_eq!(cfg.storage.peers_file, "relays.bin");
    }

    #[test]
    fn validate_rejects_threshold_above_capacity() {
        let mut cfg = Config::default();
        cfg.reply.quiet_window_capacity = 10;
        cfg.reply.quiet_threshold = 11;
        assert!(cfg.validate().is_err());

        cfg.reply.quiet_threshold = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn serialized_default_round_trips() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.bot.name, "Mr.Pong🏓");
        assert_eq!(back.logging.level_filter(), log::LevelFilter::Info);
    }
}
