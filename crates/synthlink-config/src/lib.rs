//! Shared configuration for synthlink tools.
//!
//! TOML profiles plus `SYNTHLINK_` environment overrides, and translation
//! to `synthlink_core::SessionConfig`. The CLI adds flag-aware wrappers on
//! top.
//!
//! Environment keys nest with a double underscore:
//! `SYNTHLINK_DEFAULTS__TIMEOUT=10`, `SYNTHLINK_DEFAULT_PROFILE=studio`.

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

use synthlink_core::{ReconnectConfig, SessionConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{profile}'")]
    UnknownProfile { profile: String },

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

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named controller profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// HTTP request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Bulk refresh timeout, seconds.
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            refresh_timeout: default_refresh_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_refresh_timeout() -> u64 {
    300
}

/// A named controller profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Editor base URL (e.g., "http://localhost:8080").
    pub controller: String,

    /// Override request timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Override duplex channel handshake timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,

    /// Override refresh timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_timeout: Option<u64>,

    /// Give up reconnecting after this many failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_max_retries: Option<u32>,
}

impl Profile {
    pub fn new(controller: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            timeout: None,
            connect_timeout: None,
            refresh_timeout: None,
            reconnect_max_retries: None,
        }
    }
}

impl Config {
    /// Resolve a profile: the explicit name, else `default_profile`,
    /// else `"default"`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
            .to_owned();

        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile)),
            None => Err(ConfigError::UnknownProfile { profile: name }),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "synthlink", "synthlink").map_or_else(
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
    p.push("synthlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Layered sources: built-in defaults, then the TOML file, then env.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SYNTHLINK_").split("__"))
}

/// Extract a `Config` from any figment.
pub fn load_from(figment: &Figment) -> Result<Config, ConfigError> {
    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_from(&figment(&config_path()))
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Session config translation ──────────────────────────────────────

/// Build a `SessionConfig` from a profile and the global defaults.
pub fn profile_to_session_config(profile: &Profile, defaults: &Defaults) -> Result<SessionConfig, ConfigError> {
    let url: url::Url = profile
        .controller
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "controller".into(),
            reason: format!("invalid URL: {}", profile.controller),
        })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "controller".into(),
            reason: format!("expected an http or https URL, got '{}'", url.scheme()),
        });
    }

    let mut config = SessionConfig::new(url);
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.refresh_timeout =
        Duration::from_secs(profile.refresh_timeout.unwrap_or(defaults.refresh_timeout));
    if let Some(secs) = profile.connect_timeout {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(max_retries) = profile.reconnect_max_retries {
        config.reconnect = ReconnectConfig {
            max_retries: Some(max_retries),
            ..ReconnectConfig::default()
        };
    }
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn from_toml(toml: &str) -> Config {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml));
        load_from(&figment).unwrap()
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = from_toml("");
        assert_eq!(config, Config::default());
        assert_eq!(config.defaults.timeout, 30);
        assert_eq!(config.defaults.refresh_timeout, 300);
    }

    #[test]
    fn profiles_and_defaults_parse() {
        let config = from_toml(
            r#"
            default_profile = "studio"

            [defaults]
            output = "json"
            refresh_timeout = 120

            [profiles.studio]
            controller = "http://studio.local:8080"
            timeout = 5
            reconnect_max_retries = 3
            "#,
        );

        assert_eq!(config.defaults.output, "json");
        assert_eq!(config.defaults.timeout, 30);
        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "studio");
        assert_eq!(profile.timeout, Some(5));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let config = from_toml("");
        let err = config.profile(Some("nope")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile { profile } if profile == "nope"));
    }

    #[test]
    fn session_config_applies_overrides() {
        let mut profile = Profile::new("http://localhost:8080/");
        profile.timeout = Some(7);
        profile.reconnect_max_retries = Some(2);

        let config = profile_to_session_config(&profile, &Defaults::default()).unwrap();

        assert_eq!(config.url.as_str(), "http://localhost:8080/");
        assert_eq!(config.timeout, Duration::from_secs(7));
        assert_eq!(config.refresh_timeout, Duration::from_secs(300));
        assert_eq!(config.reconnect.max_retries, Some(2));
    }

    #[test]
    fn session_config_rejects_bad_urls() {
        for controller in ["not a url", "ftp://studio.local/"] {
            let err = profile_to_session_config(&Profile::new(controller), &Defaults::default())
                .unwrap_err();
            assert!(matches!(err, ConfigError::Validation { .. }), "{controller}");
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config
            .profiles
            .insert("default".into(), Profile::new("http://localhost:8080"));
        save_config_to(&config, &path).unwrap();

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path));
        assert_eq!(load_from(&figment).unwrap(), config);
    }
}
