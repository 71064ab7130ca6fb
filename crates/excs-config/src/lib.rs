//! Profile configuration for the command station bridge.
//!
//! TOML profiles merged with `EXCS_` environment variables, and
//! translation to `excs_core::StationConfig`. The CLI layers its
//! `GlobalOpts` overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use excs_core::DEFAULT_PORT;
use excs_core::StationConfig;

pub const DEFAULT_PROFILE: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{name}'")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is selected.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named command station profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some(DEFAULT_PROFILE.into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Response timeout in seconds for profiles that set none.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    20
}
fn default_port() -> u16 {
    DEFAULT_PORT
}

/// One command station. Durations are in seconds unless suffixed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Hostname or IP address.
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timeout: Option<u64>,

    /// Overrides `defaults.timeout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_timeout: Option<u64>,

    /// Reconnect backoff cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff: Option<u64>,

    /// Quiet period ending the track list reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_ms: Option<u64>,
}

impl Profile {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            connection_timeout: None,
            response_timeout: None,
            heartbeat_interval: None,
            heartbeat_timeout: None,
            max_backoff: None,
            settle_ms: None,
        }
    }
}

impl Config {
    /// Look up `name`, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or(DEFAULT_PROFILE);
        self.profiles
            .get_key_value(name)
            .map(|(name, profile)| (name.as_str(), profile))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "excs", "excs").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("excs");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Nested keys use a double underscore, e.g.
/// `EXCS_PROFILES__LAYOUT__HOST=10.0.0.5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("EXCS_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `StationConfig` from a profile, filling gaps from `defaults`.
pub fn profile_to_station_config(profile: &Profile, defaults: &Defaults) -> Result<StationConfig, ConfigError> {
    let host = profile.host.trim();
    if host.is_empty() {
        return Err(invalid("host", "must not be empty"));
    }
    if profile.port == 0 {
        return Err(invalid("port", "must not be 0"));
    }

    let secs = |field: &str, value: Option<u64>| -> Result<Option<Duration>, ConfigError> {
        match value {
            Some(0) => Err(invalid(field, "must be at least 1 second")),
            other => Ok(other.map(Duration::from_secs)),
        }
    };

    let mut config = StationConfig::new(host, profile.port);
    if let Some(timeout) = secs("connection_timeout", profile.connection_timeout)? {
        config.connection_timeout = timeout;
    }
    config.response_timeout = secs("response_timeout", Some(profile.response_timeout.unwrap_or(defaults.timeout)))?
        .unwrap_or(config.response_timeout);
    if let Some(interval) = secs("heartbeat_interval", profile.heartbeat_interval)? {
        config.heartbeat_interval = interval;
    }
    if let Some(timeout) = secs("heartbeat_timeout", profile.heartbeat_timeout)? {
        config.heartbeat_timeout = timeout;
    }
    if config.heartbeat_timeout <= config.heartbeat_interval {
        return Err(invalid("heartbeat_timeout", "must be longer than heartbeat_interval"));
    }
    if let Some(cap) = secs("max_backoff", profile.max_backoff)? {
        config.max_backoff = cap.max(config.min_backoff);
    }
    if let Some(ms) = profile.settle_ms {
        config.settle_time = Duration::from_millis(ms);
    }

    Ok(config)
}
