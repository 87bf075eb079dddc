use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{
    audio::{
        effects::{DEFAULT_VOLUME, MAX_VOLUME},
        idle::{
            IdlePolicy, DEFAULT_EMPTY_CHANNEL_TIMEOUT, DEFAULT_NO_COMMAND_TIMEOUT,
            DEFAULT_POLL_INTERVAL,
        },
        queue::DEFAULT_MAX_HISTORY,
        PlayerConfig,
    },
    storage::GuildSettings,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: u8,
    pub max_history: usize,

    // Auto leave
    pub empty_channel_timeout: Duration,
    pub no_command_timeout: Duration,
    pub idle_poll_interval: Duration,

    // Paths
    pub data_dir: PathBuf,

    // Features
    pub enable_filters: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("No se pudo crear {}", config.data_dir.display()))?;

        Ok(config)
    }

    /// Builds the configuration from any key/value source. `load` uses the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: lookup("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            // Audio
            default_volume: parse_or(&lookup, "DEFAULT_VOLUME", defaults.default_volume)?,
            max_history: parse_or(&lookup, "MAX_HISTORY", defaults.max_history)?,

            // Auto leave
            empty_channel_timeout: duration_or(
                &lookup,
                "EMPTY_CHANNEL_TIMEOUT",
                defaults.empty_channel_timeout,
            )?,
            no_command_timeout: duration_or(
                &lookup,
                "NO_COMMAND_TIMEOUT",
                defaults.no_command_timeout,
            )?,
            idle_poll_interval: duration_or(
                &lookup,
                "IDLE_POLL_INTERVAL",
                defaults.idle_poll_interval,
            )?,

            // Paths
            data_dir: lookup("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),

            // Features
            enable_filters: parse_or(&lookup, "ENABLE_FILTERS", defaults.enable_filters)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 150
    /// - The idle poll interval must be non-zero and shorter than both timeouts
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > MAX_VOLUME {
            anyhow::bail!(
                "Default volume must be between 0 and {}, got: {}",
                MAX_VOLUME,
                self.default_volume
            );
        }

        if self.idle_poll_interval.is_zero() {
            anyhow::bail!("Idle poll interval must be greater than 0");
        }

        if self.idle_poll_interval > self.empty_channel_timeout
            || self.idle_poll_interval > self.no_command_timeout
        {
            anyhow::bail!(
                "Idle poll interval ({}) cannot exceed the auto leave timeouts",
                humantime::format_duration(self.idle_poll_interval)
            );
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} history\n  \
            Auto leave: empty {}, no command {}, poll {}\n  \
            Features: Filters={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.max_history,
            humantime::format_duration(self.empty_channel_timeout),
            humantime::format_duration(self.no_command_timeout),
            humantime::format_duration(self.idle_poll_interval),
            self.enable_filters,
        )
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            default_volume: self.default_volume,
            idle: IdlePolicy {
                empty_channel_timeout: self.empty_channel_timeout,
                no_command_timeout: self.no_command_timeout,
                poll_interval: self.idle_poll_interval,
            },
            max_history: self.max_history,
            enable_filters: self.enable_filters,
        }
    }

    /// Settings for guilds with nothing stored yet.
    pub fn default_guild_settings(&self) -> GuildSettings {
        GuildSettings {
            volume: self.default_volume,
            ..GuildSettings::default()
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("{} inválido: {}", key, value)),
        _ => Ok(default),
    }
}

fn duration_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => humantime::parse_duration(value.trim())
            .with_context(|| format!("{} inválido: {}", key, value)),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            default_volume: DEFAULT_VOLUME,
            max_history: DEFAULT_MAX_HISTORY,

            // Auto leave defaults
            empty_channel_timeout: DEFAULT_EMPTY_CHANNEL_TIMEOUT,
            no_command_timeout: DEFAULT_NO_COMMAND_TIMEOUT,
            idle_poll_interval: DEFAULT_POLL_INTERVAL,

            // Path defaults
            data_dir: "/app/data".into(),

            // Feature defaults
            enable_filters: true,
        }
    }
}
