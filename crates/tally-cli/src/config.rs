//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tally_assistant::{AssistantConfig, HISTORY_WINDOW};

/// API root used when neither the config file nor the command line names one
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/v1";

/// Configuration for tally
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API root of the bookkeeping server
    pub base_url: Option<String>,
    /// Bearer token (alternative to the TALLY_TOKEN environment variable)
    pub token: Option<String>,
    /// Whether the assistant is enabled
    pub enabled: Option<bool>,
    /// Stream replies as they are generated
    pub stream: Option<bool>,
    /// Timeout for non-streaming requests
    pub timeout_secs: Option<u64>,
    /// Trailing messages sent as context
    pub history_window: Option<usize>,
    /// Print the assistant's reasoning while it streams
    pub show_thinking: Option<bool>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TALLY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            token: None,
            enabled: Some(true),
            stream: Some(true),
            timeout_secs: Some(60),
            history_window: Some(HISTORY_WINDOW),
            show_thinking: Some(false),
        };

        default_config.save()?;
        Ok(path)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Bearer token from config, falling back to TALLY_TOKEN
    pub fn token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("TALLY_TOKEN").ok())
            .filter(|t| !t.is_empty())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Session settings derived from this config
    pub fn assistant_config(&self) -> AssistantConfig {
        AssistantConfig {
            enabled: self.enabled.unwrap_or(true),
            streaming: self.stream.unwrap_or(true),
            history_window: self.history_window.unwrap_or(HISTORY_WINDOW),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# tally configuration file
# Place at ~/.config/tally/config.toml (Linux/Mac) or %APPDATA%\tally\config.toml (Windows)

# API root of your bookkeeping server
base_url = "http://localhost:8080/api/v1"

# Bearer token (optional - the TALLY_TOKEN environment variable also works)
# token = "..."

# Set to false to refuse all assistant requests
enabled = true

# Stream replies as they are generated; false waits for the whole reply
stream = true

# Timeout in seconds for non-streaming requests (0 disables it)
timeout_secs = 60

# How many trailing messages are sent as context
history_window = 12

# Print the assistant's reasoning while it streams
show_thinking = false
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(example_config()).unwrap();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.stream, Some(true));
        assert_eq!(config.timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.history_window, Some(12));
        assert_eq!(config.token, None);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::parse("stream = false\n").unwrap();
        let assistant = config.assistant_config();
        assert!(assistant.enabled);
        assert!(!assistant.streaming);
        assert_eq!(assistant.history_window, HISTORY_WINDOW);
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = Config {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_token_from_config_wins() {
        let config = Config {
            token: Some("abc".into()),
            ..Default::default()
        };
        assert_eq!(config.token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config {
            base_url: Some("https://books.example.com/api/v1".into()),
            enabled: Some(false),
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::parse(&text).unwrap(), config);
    }
}
