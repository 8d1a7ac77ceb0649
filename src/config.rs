use std::time::Duration;

use thiserror::Error;

use crate::worker::WorkerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Worker configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    // Telegram API credentials
    pub api_id: i32,
    pub api_hash: String,
    pub session_string: String,
    pub channel_username: String,

    // State store
    pub redis_url: String,

    // Collection
    pub update_interval: Duration,
    pub posts_count: usize,

    // Failure policy
    pub connect_retries: u32,
    pub connect_backoff_step: Duration,
    pub max_consecutive_failures: u32,
    pub failure_cooldown: Duration,

    // Logging
    pub log_level: String,
}

// Credentials stay out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .field("session_string", &"<redacted>")
            .field("channel_username", &self.channel_username)
            .field("redis_url", &self.redis_url)
            .field("update_interval", &self.update_interval)
            .field("posts_count", &self.posts_count)
            .field("connect_retries", &self.connect_retries)
            .field("connect_backoff_step", &self.connect_backoff_step)
            .field("max_consecutive_failures", &self.max_consecutive_failures)
            .field("failure_cooldown", &self.failure_cooldown)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_id_raw = required_env("TG_API_ID")?;
        let api_id = api_id_raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::ParseInt {
                name: "TG_API_ID".to_string(),
                source: e,
            })?;

        Ok(Self {
            // Telegram API credentials
            api_id,
            api_hash: required_env("TG_API_HASH")?,
            session_string: required_env("TG_SESSION_STRING")?,
            channel_username: normalize_username(&env_or_default(
                "TG_CHANNEL_USERNAME",
                "itatmisis",
            )),

            // State store
            redis_url: env_or_default("REDIS_URL", "redis://localhost:6379"),

            // Collection
            update_interval: Duration::from_secs(parse_env_u64("TG_UPDATE_INTERVAL", 900)?),
            posts_count: parse_env_usize("TG_POSTS_COUNT", 5)?,

            // Failure policy
            connect_retries: parse_env_u32("WORKER_CONNECT_RETRIES", 5)?,
            connect_backoff_step: Duration::from_secs(parse_env_u64(
                "WORKER_CONNECT_BACKOFF_SECS",
                5,
            )?),
            max_consecutive_failures: parse_env_u32("WORKER_MAX_FAILURES", 5)?,
            failure_cooldown: Duration::from_secs(parse_env_u64(
                "WORKER_FAILURE_COOLDOWN_SECS",
                60,
            )?),

            // Logging
            log_level: env_or_default("LOG_LEVEL", "INFO"),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_username.is_empty() {
            return Err(invalid("TG_CHANNEL_USERNAME", "cannot be empty"));
        }
        if self.api_hash.trim().is_empty() {
            return Err(invalid("TG_API_HASH", "cannot be empty"));
        }
        if self.session_string.trim().is_empty() {
            return Err(invalid("TG_SESSION_STRING", "cannot be empty"));
        }
        if self.update_interval.is_zero() {
            return Err(invalid("TG_UPDATE_INTERVAL", "must be at least 1 second"));
        }
        if self.posts_count == 0 || self.posts_count > 100 {
            return Err(invalid("TG_POSTS_COUNT", "must be between 1 and 100"));
        }
        if self.connect_retries == 0 {
            return Err(invalid("WORKER_CONNECT_RETRIES", "must be at least 1"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(invalid("WORKER_MAX_FAILURES", "must be at least 1"));
        }
        if tracing_level(&self.log_level).is_none() {
            return Err(invalid(
                "LOG_LEVEL",
                &format!(
                    "must be one of DEBUG, INFO, WARNING, ERROR, CRITICAL, got '{}'",
                    self.log_level
                ),
            ));
        }
        Ok(())
    }

    /// The scheduler-relevant subset of the configuration.
    #[must_use]
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            channel_username: self.channel_username.clone(),
            posts_count: self.posts_count,
            update_interval: self.update_interval,
            connect_retries: self.connect_retries,
            connect_backoff_step: self.connect_backoff_step,
            max_consecutive_failures: self.max_consecutive_failures,
            failure_cooldown: self.failure_cooldown,
        }
    }

    /// A fully populated configuration for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            api_id: 12345,
            api_hash: "0123456789abcdef0123456789abcdef".to_string(),
            session_string: "dGVzdA==".to_string(),
            channel_username: "itatmisis".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            update_interval: Duration::from_secs(900),
            posts_count: 5,
            connect_retries: 5,
            connect_backoff_step: Duration::from_secs(5),
            max_consecutive_failures: 5,
            failure_cooldown: Duration::from_secs(60),
            log_level: "INFO".to_string(),
        }
    }
}

/// Map a `LOG_LEVEL` value onto a tracing level directive.
///
/// Accepts the conventional names including `WARNING` and `CRITICAL`, which
/// tracing spells `warn` and `error`.
#[must_use]
pub fn tracing_level(level: &str) -> Option<&'static str> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" | "fatal" => Some("error"),
        _ => None,
    }
}

fn normalize_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_string()
}

fn invalid(name: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.trim().parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.trim().parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.trim().parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
