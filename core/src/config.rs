//! Configuration system for modmail
//!
//! Configuration is read from `~/.modmail/config.json`. Environment variables
//! override file values so that hosted deployments can keep the bot token out
//! of the file.

use crate::error::{ConfigError, Result};
use crate::types::{ChannelId, RoleId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Discord connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token from Discord Developer Portal
    #[serde(default)]
    pub token: String,
    /// Guild that hosts the ticket channels
    #[serde(default)]
    pub guild_id: u64,
    /// Prefix for text commands (`!close`, `!reply`)
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            guild_id: 0,
            command_prefix: default_command_prefix(),
        }
    }
}

fn default_command_prefix() -> String {
    "!".to_string()
}

/// Ticket behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketsConfig {
    /// Category that ticket channels are created under
    #[serde(default)]
    pub category_id: u64,
    /// Role that can see and answer tickets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_role_id: Option<u64>,
    /// Prefix for ticket channel names
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    /// Grace delay before a closed ticket channel is deleted
    #[serde(default = "default_close_delay_secs")]
    pub close_delay_secs: u64,
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            category_id: 0,
            staff_role_id: None,
            channel_prefix: default_channel_prefix(),
            close_delay_secs: default_close_delay_secs(),
        }
    }
}

impl TicketsConfig {
    pub fn category(&self) -> ChannelId {
        ChannelId(self.category_id)
    }

    pub fn staff_role(&self) -> Option<RoleId> {
        self.staff_role_id.map(RoleId)
    }
}

fn default_channel_prefix() -> String {
    "ticket".to_string()
}

fn default_close_delay_secs() -> u64 {
    5
}

/// Keep-alive HTTP endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Whether to serve the status endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Host to bind to
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_host() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    10000
}

/// Root configuration for modmail
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Discord configuration
    #[serde(default)]
    pub discord: DiscordConfig,
    /// Ticket configuration
    #[serde(default)]
    pub tickets: TicketsConfig,
    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Config {
    /// Check that everything needed to run the bot is present
    pub fn validate(&self) -> Result<()> {
        if self.discord.token.is_empty() {
            return Err(ConfigError::Missing("discord.token".to_string()).into());
        }
        if self.discord.guild_id == 0 {
            return Err(ConfigError::Missing("discord.guild_id".to_string()).into());
        }
        if self.tickets.category_id == 0 {
            return Err(ConfigError::Missing("tickets.category_id".to_string()).into());
        }
        if self.discord.command_prefix.is_empty() {
            return Err(ConfigError::Invalid("discord.command_prefix is empty".to_string()).into());
        }
        Ok(())
    }
}

/// Get the default config directory
pub fn get_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".modmail")
}

/// Get the config file path
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Load configuration from the default location.
///
/// A missing file is not an error here: environment variables alone are
/// enough to run the bot.
pub async fn load_config() -> Result<Config> {
    let config_path = get_config_path();

    let mut config = if config_path.exists() {
        read_config_file(&config_path).await?
    } else {
        tracing::debug!("no config file at {}, using defaults", config_path.display());
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Load configuration from an explicit path
pub async fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()).into());
    }
    let mut config = read_config_file(path).await?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

async fn read_config_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path).await?;
    let config: Config = serde_json::from_str(&contents)
        .map_err(|e| ConfigError::Parse(format!("Failed to parse config JSON: {}", e)))?;
    Ok(config)
}

/// Apply environment variable overrides to config
///
/// Recognised: `DISCORD_TOKEN`, `GUILD_ID`, `MODMAIL_CATEGORY_ID`,
/// `MOD_ROLE_ID`, `MODMAIL_PREFIX`.
fn apply_env_overrides<F>(config: &mut Config, var: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = var("DISCORD_TOKEN") {
        tracing::debug!("discord token from environment");
        config.discord.token = token;
    }
    if let Some(id) = var("GUILD_ID") {
        config.discord.guild_id = parse_id("GUILD_ID", &id)?;
    }
    if let Some(id) = var("MODMAIL_CATEGORY_ID") {
        config.tickets.category_id = parse_id("MODMAIL_CATEGORY_ID", &id)?;
    }
    if let Some(id) = var("MOD_ROLE_ID") {
        config.tickets.staff_role_id = Some(parse_id("MOD_ROLE_ID", &id)?);
    }
    if let Some(prefix) = var("MODMAIL_PREFIX") {
        config.discord.command_prefix = prefix;
    }
    Ok(())
}

fn parse_id(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::Invalid(format!("{} is not a valid id: {}", key, e)).into())
}

/// Save configuration to the default location
pub async fn save_config(config: &Config) -> Result<()> {
    save_config_to(config, &get_config_path()).await
}

/// Save configuration to an explicit path
pub async fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;

    fs::write(path, json).await?;
    Ok(())
}
