//! Runtime configuration
//!
//! Loaded from an optional JSON file; every field has a default so an empty
//! object (or no file at all) is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::game::Timings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Seconds of inactivity before a game is frozen
    pub move_timeout_secs: u64,
    /// Seconds a challenge or rematch prompt stays open
    pub challenge_timeout_secs: u64,
    /// Cosmetic delay before the bot moves, in milliseconds
    pub bot_think_millis: u64,
    /// Chains a participant may open per UTC day; unlimited when absent
    pub daily_game_limit: Option<u32>,
    /// Participants never subject to the daily limit
    pub limit_exempt: Vec<String>,
    /// Name shown for the bot
    pub bot_name: String,
    /// Fixed seed for coin flips and bot openings
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            move_timeout_secs: 300,
            challenge_timeout_secs: 60,
            bot_think_millis: 1000,
            daily_game_limit: None,
            limit_exempt: Vec::new(),
            bot_name: "vG Bot".to_string(),
            seed: None,
        }
    }
}

impl GameConfig {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.move_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "move_timeout_secs must be greater than 0".to_string(),
            });
        }
        if self.challenge_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "challenge_timeout_secs must be greater than 0".to_string(),
            });
        }
        if self.daily_game_limit == Some(0) {
            return Err(ConfigError::Invalid {
                message: "daily_game_limit must be at least 1 (omit it for no limit)".to_string(),
            });
        }
        Ok(())
    }

    pub fn timings(&self) -> Timings {
        Timings {
            move_timeout: Duration::from_secs(self.move_timeout_secs),
            challenge_timeout: Duration::from_secs(self.challenge_timeout_secs),
        }
    }

    pub fn bot_think_delay(&self) -> Duration {
        Duration::from_millis(self.bot_think_millis)
    }
}
