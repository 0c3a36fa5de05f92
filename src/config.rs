//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! tuning constants for the Telegram transport.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use teloxide::types::ChatId;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Broadcast channel whose posts are mirrored
    pub source_channel_id: i64,
    /// Discussion group receiving the mirrored posts
    pub destination_group_id: i64,

    /// File holding the persisted mirror map
    #[serde(default = "default_persistence_path")]
    pub persistence_path: String,

    /// Album collection window, measured from the first item of a group
    #[serde(default = "default_media_group_window_ms")]
    pub media_group_window_ms: u64,

    /// Extra attempts for transient Telegram failures (0 disables retry)
    #[serde(default)]
    pub telegram_api_max_retries: usize,
}

fn default_persistence_path() -> String {
    DEFAULT_PERSISTENCE_PATH.to_string()
}

const fn default_media_group_window_ms() -> u64 {
    DEFAULT_MEDIA_GROUP_WINDOW_MS
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use channel_mirror::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg.. `APP__SOURCE_CHANNEL_ID=-100123 ./target/app`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain variables: TELEGRAM_TOKEN, SOURCE_CHANNEL_ID, ...
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Source channel as a Telegram chat id
    #[must_use]
    pub const fn source_channel(&self) -> ChatId {
        ChatId(self.source_channel_id)
    }

    /// Destination group as a Telegram chat id
    #[must_use]
    pub const fn destination_group(&self) -> ChatId {
        ChatId(self.destination_group_id)
    }

    /// Album collection window as a [`Duration`]
    #[must_use]
    pub const fn media_group_window(&self) -> Duration {
        Duration::from_millis(self.media_group_window_ms)
    }
}

/// Default location of the persisted mirror map
pub const DEFAULT_PERSISTENCE_PATH: &str = "persistence.json";

/// Default album collection window in milliseconds
pub const DEFAULT_MEDIA_GROUP_WINDOW_MS: u64 = 2000;

// Telegram API retry configuration
/// Initial backoff before the first retry
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for a single backoff delay
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_settings_from_env() -> Result<(), ConfigError> {
        env::set_var("TELEGRAM_TOKEN", "dummy");
        env::set_var("SOURCE_CHANNEL_ID", "-1001");
        env::set_var("DESTINATION_GROUP_ID", "-1002");

        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "dummy");
        assert_eq!(settings.source_channel(), ChatId(-1001));
        assert_eq!(settings.destination_group(), ChatId(-1002));

        // Unset keys fall back to defaults
        assert_eq!(settings.persistence_path, DEFAULT_PERSISTENCE_PATH);
        assert_eq!(
            settings.media_group_window(),
            Duration::from_millis(DEFAULT_MEDIA_GROUP_WINDOW_MS)
        );
        assert_eq!(settings.telegram_api_max_retries, 0);

        env::remove_var("TELEGRAM_TOKEN");
        env::remove_var("SOURCE_CHANNEL_ID");
        env::remove_var("DESTINATION_GROUP_ID");
        Ok(())
    }
}
