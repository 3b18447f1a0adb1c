//! Configuration loading.
//!
//! A single TOML file; the bot token may instead come from `DISCORD_TOKEN`
//! so the file can be committed without secrets.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Gateway intents this daemon needs: GUILDS, GUILD_MEMBERS,
/// GUILD_MESSAGE_REACTIONS.
const DEFAULT_INTENTS: u64 = (1 << 0) | (1 << 1) | (1 << 10);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no bot token: set [bot] token or the DISCORD_TOKEN environment variable")]
    MissingToken,
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bot identity and runtime knobs.
    pub bot: BotConfig,
    /// Discord endpoints and gateway intents.
    #[serde(default)]
    pub discord: DiscordConfig,
    /// Store file locations.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Verification button appearance.
    #[serde(default)]
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Bot token; `DISCORD_TOKEN` overrides.
    #[serde(default)]
    pub token: Option<String>,
    /// Prometheus metrics HTTP port (default 9090; 0 disables).
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// REST base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Gateway URL override; normally discovered via `/gateway/bot`.
    #[serde(default)]
    pub gateway_url: Option<String>,
    /// Gateway intents bitfield.
    #[serde(default = "default_intents")]
    pub intents: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Reaction-role mapping file.
    #[serde(default = "default_reaction_path")]
    pub reaction_roles: String,
    /// Verification config file.
    #[serde(default = "default_verify_path")]
    pub verify: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyConfig {
    /// Label on the persistent verification button.
    #[serde(default = "default_button_label")]
    pub button_label: String,
}

fn default_api_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_intents() -> u64 {
    DEFAULT_INTENTS
}

fn default_reaction_path() -> String {
    "data/reaction_roles.json".to_string()
}

fn default_verify_path() -> String {
    "data/verify.json".to_string()
}

fn default_button_label() -> String {
    "Verify".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            gateway_url: None,
            intents: default_intents(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            reaction_roles: default_reaction_path(),
            verify: default_verify_path(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            button_label: default_button_label(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and apply the token override.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        if let Ok(token) = std::env::var("DISCORD_TOKEN")
            && !token.is_empty()
        {
            config.bot.token = Some(token);
        }
        if config.bot.token.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingToken);
        }
        Ok(config)
    }

    /// The resolved bot token. `load` guarantees presence.
    pub fn token(&self) -> &str {
        self.bot.token.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = toml::from_str(
            r#"
            [bot]
            token = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.discord.api_url, "https://discord.com/api/v10");
        assert_eq!(config.discord.intents, DEFAULT_INTENTS);
        assert_eq!(config.storage.reaction_roles, "data/reaction_roles.json");
        assert_eq!(config.verify.button_label, "Verify");
        assert_eq!(config.bot.metrics_port, None);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config: Config = toml::from_str(
            r#"
            [bot]
            token = "abc"
            metrics_port = 0

            [discord]
            api_url = "http://localhost:8080/api"
            intents = 1

            [storage]
            reaction_roles = "/tmp/rr.json"
            verify = "/tmp/v.json"

            [verify]
            button_label = "I'm human"
            "#,
        )
        .unwrap();
        assert_eq!(config.bot.metrics_port, Some(0));
        assert_eq!(config.discord.api_url, "http://localhost:8080/api");
        assert_eq!(config.discord.intents, 1);
        assert_eq!(config.storage.verify, "/tmp/v.json");
        assert_eq!(config.verify.button_label, "I'm human");
    }
}
