//! Threadgate configuration.
//!
//! Configuration is deserializable (every field has a default) and can be read
//! from `THREADGATE_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use threadgate_core::ChannelId;

/// Environment variable names read by [`ThreadgateConfig::from_env`].
pub mod env {
    /// Path of the session store file.
    pub const DB_PATH: &str = "THREADGATE_DB_PATH";
    /// Whether session bindings are consulted at all.
    pub const SESSIONS_ENABLED: &str = "THREADGATE_SESSIONS_ENABLED";
    /// Global approval requirement.
    pub const REQUIRE_APPROVAL: &str = "THREADGATE_REQUIRE_APPROVAL";
    /// Sandbox prefixes, separated like `PATH`.
    pub const ALLOWED_PREFIXES: &str = "THREADGATE_ALLOWED_PREFIXES";
    /// Maximum readable file size in bytes.
    pub const MAX_FILE_BYTES: &str = "THREADGATE_MAX_FILE_BYTES";
    /// Fallback channel when nothing else resolves.
    pub const DEFAULT_CHANNEL: &str = "THREADGATE_DEFAULT_CHANNEL";
    /// How long an approval prompt waits for a human.
    pub const APPROVAL_TIMEOUT_SECS: &str = "THREADGATE_APPROVAL_TIMEOUT_SECS";
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set to a value that could not be parsed.
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Configuration for the trust and resolution layer.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadgateConfig {
    /// Session store location.
    #[serde(default = "ThreadgateConfig::default_db_path")]
    pub db_path: PathBuf,

    /// When false, session bindings are never consulted.
    #[serde(default = "ThreadgateConfig::default_true")]
    pub sessions_enabled: bool,

    /// Global approval requirement; call sites can only narrow it.
    #[serde(default = "ThreadgateConfig::default_true")]
    pub require_approval: bool,

    /// Directories under which files may be read.
    #[serde(default = "ThreadgateConfig::default_allowed_prefixes")]
    pub allowed_prefixes: Vec<PathBuf>,

    /// Largest file, in bytes, the file guard will read.
    #[serde(default = "ThreadgateConfig::default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Channel used when neither a session nor the caller names one.
    #[serde(default)]
    pub default_channel: Option<ChannelId>,

    /// Approval prompt timeout in seconds.
    #[serde(default = "ThreadgateConfig::default_approval_timeout")]
    pub approval_timeout_seconds: u64,
}

impl ThreadgateConfig {
    fn default_db_path() -> PathBuf {
        PathBuf::from("data/sessions.db")
    }

    const fn default_true() -> bool {
        true
    }

    fn default_allowed_prefixes() -> Vec<PathBuf> {
        vec![PathBuf::from("/tmp")]
    }

    const fn default_max_file_bytes() -> u64 {
        8 * 1024 * 1024 // 8 MiB
    }

    const fn default_approval_timeout() -> u64 {
        300 // 5 minutes
    }

    /// Get the approval timeout as a `Duration`.
    #[must_use]
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_seconds)
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source, falling back to
    /// defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(env::DB_PATH).filter(|v| !v.is_empty()) {
            config.db_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(env::SESSIONS_ENABLED) {
            config.sessions_enabled = parse_bool(env::SESSIONS_ENABLED, &value)?;
        }
        if let Some(value) = lookup(env::REQUIRE_APPROVAL) {
            config.require_approval = parse_bool(env::REQUIRE_APPROVAL, &value)?;
        }
        if let Some(value) = lookup(env::ALLOWED_PREFIXES) {
            config.allowed_prefixes = std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        if let Some(value) = lookup(env::MAX_FILE_BYTES) {
            config.max_file_bytes =
                value
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        name: env::MAX_FILE_BYTES,
                        value: value.clone(),
                        reason: e.to_string(),
                    })?;
        }
        if let Some(value) = lookup(env::DEFAULT_CHANNEL).filter(|v| !v.is_empty()) {
            let channel = ChannelId::parse(value.clone()).map_err(|e| ConfigError::InvalidValue {
                name: env::DEFAULT_CHANNEL,
                value,
                reason: e.to_string(),
            })?;
            config.default_channel = Some(channel);
        }
        if let Some(value) = lookup(env::APPROVAL_TIMEOUT_SECS) {
            config.approval_timeout_seconds =
                value
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        name: env::APPROVAL_TIMEOUT_SECS,
                        value: value.clone(),
                        reason: e.to_string(),
                    })?;
        }

        Ok(config)
    }
}

impl Default for ThreadgateConfig {
    fn default() -> Self {
        Self {
            db_path: Self::default_db_path(),
            sessions_enabled: true,
            require_approval: true,
            allowed_prefixes: Self::default_allowed_prefixes(),
            max_file_bytes: Self::default_max_file_bytes(),
            default_channel: None,
            approval_timeout_seconds: Self::default_approval_timeout(),
        }
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
