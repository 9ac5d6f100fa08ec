use crate::types::{AppResult, Tick, MILLISECONDS, SECONDS};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How often the bracket service is polled for open matches.
pub const BRACKET_POLL_INTERVAL: Tick = 10 * SECONDS;
/// Fixed backoff between retries of failed bracket operations.
pub const BRACKET_RETRY_BACKOFF: Tick = 5 * SECONDS;
/// At most this many matches are started per poll cycle.
pub const MAX_STARTS_PER_CYCLE: usize = 14;
/// Pause between a round ending and the next one being set up.
pub const ROUND_END_DELAY: Tick = 5 * SECONDS;
/// Settle time between marking a match underway and starting it, and
/// between a spectator joining and being hidden from the fighters.
pub const SETTLE_DELAY: Tick = 100 * MILLISECONDS;
/// Countdown starts from here, one announcement per second.
pub const COUNTDOWN_FROM: u8 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketCredentials {
    pub username: String,
    pub api_key: String,
}

/// Runtime configuration, loaded from a JSON file next to the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub credentials: Option<BracketCredentials>,
    pub arenas_path: Option<String>,
}

impl Settings {
    pub fn load(path: &Path) -> AppResult<Self> {
        let data = std::fs::read_to_string(path)?;
        if data.is_empty() {
            return Err(anyhow!("Settings file is empty"));
        }
        Ok(serde_json::from_str(&data)?)
    }

    pub fn credentials(&self) -> AppResult<&BracketCredentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| anyhow!("No bracket credentials configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert!(settings.credentials.is_none());
        assert!(settings.credentials().is_err());
    }

    #[test]
    fn test_settings_with_credentials() {
        let settings: Settings = serde_json::from_str(
            r#"{"credentials": {"username": "host", "api_key": "secret"}}"#,
        )
        .unwrap();
        assert_eq!(settings.credentials().unwrap().username, "host");
    }
}
