//! Application configuration
//!
//! Defaults are embedded from `config.toml`. An optional override file is
//! layered on top field by field, and a few values can be supplied through
//! the environment (or a `.env` file loaded by `main`).

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use zeroize::Zeroize;

/// Embedded default configuration
const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml");

/// Environment variable holding the backend API key
pub(crate) const API_KEY_ENV: &str = "MOCK_INTERVIEW_API_KEY";

/// Environment variable overriding the backend base URL
pub(crate) const API_URL_ENV: &str = "MOCK_INTERVIEW_API_URL";

/// Environment variable holding the realtime voice service key
pub(crate) const VOICE_KEY_ENV: &str = "OPENAI_API_KEY";

/// Fully resolved configuration
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Config {
    pub api: ApiConfig,
    pub voice: VoiceConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend RPC settings
#[derive(Clone, Deserialize)]
pub(crate) struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Secret,
    pub request_timeout_secs: u64,
    pub load_retries: u32,
}

/// Realtime voice service settings
#[derive(Clone, Deserialize)]
pub(crate) struct VoiceConfig {
    pub url: String,
    pub model: String,
    pub voice: String,
    #[serde(default)]
    pub api_key: Secret,
    pub connect_timeout_secs: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_secs: u64,
    pub ping_interval_secs: u64,
}

/// Session orchestration settings
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SessionConfig {
    pub tick_interval_secs: u64,
    pub autosave_interval_secs: u64,
    /// Sessions loaded with more elapsed seconds than this count as resumed
    pub resume_threshold_secs: u64,
    /// Ids with this prefix are local placeholders and never persisted
    pub ephemeral_prefix: String,
    pub evaluate_coding_give_up: bool,
}

/// Local storage locations
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct StorageConfig {
    /// Path of the durable flag file (None = platform data dir)
    pub flag_store_path: Option<PathBuf>,
    /// Directory for transcript exports (None = Documents folder)
    pub transcript_dir: Option<PathBuf>,
}

/// String secret that is wiped from memory on drop and never printed
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub(crate) struct Secret(String);

impl Secret {
    pub(crate) fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "Secret(<empty>)")
        } else {
            write!(f, "Secret(<redacted>)")
        }
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("load_retries", &self.load_retries)
            .finish()
    }
}

impl fmt::Debug for VoiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceConfig")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl VoiceConfig {
    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub(crate) fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub(crate) fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

impl SessionConfig {
    pub(crate) fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub(crate) fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            autosave_interval_secs: 10,
            resume_threshold_secs: 5,
            ephemeral_prefix: "local-".to_string(),
            evaluate_coding_give_up: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid API base URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl Config {
    /// Load the embedded defaults, layer an optional override file on top,
    /// then apply environment overrides.
    pub(crate) fn load(override_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged: toml::Value = toml::from_str(DEFAULT_CONFIG_TOML)?;

        if let Some(path) = override_path {
            let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })?;
            let overrides: toml::Value = toml::from_str(&contents)?;
            merge_toml(&mut merged, overrides);
            info!("Loaded config overrides from {:?}", path);
        }

        let mut config: Config = merged.try_into()?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.api.api_key = Secret::new(key);
        }
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.is_empty()) {
            self.api.base_url = url;
        }
        if self.voice.api_key.is_empty() {
            if let Some(key) = lookup(VOICE_KEY_ENV).filter(|v| !v.is_empty()) {
                self.voice.api_key = Secret::new(key);
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.api.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.api.base_url.clone(),
            source: e,
        })?;
        Ok(())
    }
}

/// Recursively merge `overrides` into `base`; tables merge, everything else replaces
fn merge_toml(base: &mut toml::Value, overrides: toml::Value) {
    match (base, overrides) {
        (toml::Value::Table(base_table), toml::Value::Table(override_table)) => {
            for (key, value) in override_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, value) => *base = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Config {
        let value: toml::Value = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        value.try_into().unwrap()
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config = defaults();
        assert_eq!(config.session.autosave_interval_secs, 10);
        assert_eq!(config.session.tick_interval_secs, 1);
        assert_eq!(config.session.resume_threshold_secs, 5);
        assert_eq!(config.session.ephemeral_prefix, "local-");
        assert!(!config.session.evaluate_coding_give_up);
        assert_eq!(config.voice.max_reconnect_attempts, 5);
        assert!(config.storage.flag_store_path.is_none());
    }

    #[test]
    fn test_merge_overrides_single_field() {
        let mut base: toml::Value = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        let overrides: toml::Value = toml::from_str(
            r#"
            [session]
            autosave_interval_secs = 3
            "#,
        )
        .unwrap();
        merge_toml(&mut base, overrides);
        let config: Config = base.try_into().unwrap();
        assert_eq!(config.session.autosave_interval_secs, 3);
        // Untouched fields keep their defaults
        assert_eq!(config.session.resume_threshold_secs, 5);
        assert_eq!(config.voice.voice, "alloy");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = defaults();
        config.apply_env(|key| match key {
            API_KEY_ENV => Some("secret-key".to_string()),
            API_URL_ENV => Some("https://interviews.example.com/api/".to_string()),
            VOICE_KEY_ENV => Some("voice-key".to_string()),
            _ => None,
        });
        assert_eq!(config.api.api_key.expose(), "secret-key");
        assert_eq!(config.api.base_url, "https://interviews.example.com/api/");
        assert_eq!(config.voice.api_key.expose(), "voice-key");
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let secret = Secret::new("hunter2");
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let mut config = defaults();
        config.api.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
