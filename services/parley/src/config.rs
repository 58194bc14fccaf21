use parley_core::{DEFAULT_LEGACY_AUDIO_DELAY, Leg, SessionConfig};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Values given on the command line. They win over the environment.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub send_url: Option<String>,
    pub recv_url: Option<String>,
    pub system_prompt: Option<String>,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub send_url: String,
    pub recv_url: String,
    pub primary: Leg,
    pub legacy_audio_delay: Duration,
    pub tool_timeout: Option<Duration>,
    pub system_prompt: Option<String>,
    /// A `tracing_subscriber::EnvFilter` directive string.
    pub log_filter: String,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(&Overrides::default())
    }

    /// Loads configuration from the environment, preferring `overrides`.
    pub fn load(overrides: &Overrides) -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let send_url = overrides
            .send_url
            .clone()
            .or_else(|| std::env::var("PARLEY_SEND_URL").ok())
            .ok_or_else(|| ConfigError::MissingVar("PARLEY_SEND_URL".to_string()))?;
        let recv_url = overrides
            .recv_url
            .clone()
            .or_else(|| std::env::var("PARLEY_RECV_URL").ok())
            .ok_or_else(|| ConfigError::MissingVar("PARLEY_RECV_URL".to_string()))?;

        let primary_str = std::env::var("PARLEY_PRIMARY").unwrap_or_else(|_| "send".to_string());
        let primary = match primary_str.to_lowercase().as_str() {
            "send" | "outbound" => Leg::Outbound,
            "recv" | "inbound" => Leg::Inbound,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "PARLEY_PRIMARY".to_string(),
                    format!("'{}' is not one of send, recv", primary_str),
                ));
            }
        };

        let legacy_audio_delay = match millis_var("PARLEY_LEGACY_AUDIO_DELAY_MS")? {
            Some(delay) => delay,
            None => DEFAULT_LEGACY_AUDIO_DELAY,
        };
        let tool_timeout = millis_var("PARLEY_TOOL_TIMEOUT_MS")?.filter(|t| !t.is_zero());

        let system_prompt = overrides
            .system_prompt
            .clone()
            .or_else(|| std::env::var("PARLEY_SYSTEM_PROMPT").ok())
            .filter(|prompt| !prompt.trim().is_empty());

        let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(&log_filter).map_err(|e| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid filter: {}", log_filter, e),
            )
        })?;

        Ok(Self {
            send_url,
            recv_url,
            primary,
            legacy_audio_delay,
            tool_timeout,
            system_prompt,
            log_filter,
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        let config = SessionConfig::new(&self.send_url, &self.recv_url)
            .with_primary(self.primary)
            .with_legacy_audio_delay(self.legacy_audio_delay);
        match self.tool_timeout {
            Some(timeout) => config.with_tool_call_timeout(timeout),
            None => config,
        }
    }
}

fn millis_var(name: &str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(None),
    }
}
