//! Client configuration loading
//!
//! Config precedence: env vars > config file > defaults. The config file
//! is optional; a missing file yields the defaults, so a zero-config dev
//! setup talks to a local backend out of the box.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ORIGIN: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SESSION_FILE: &str = "session.json";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
}

/// API connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            timeout_ms: default_timeout_ms(),
            session_file: default_session_file(),
        }
    }
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_session_file() -> PathBuf {
    PathBuf::from(DEFAULT_SESSION_FILE)
}

impl ClientConfig {
    /// Load configuration from a TOML file, then overlay environment
    /// variables.
    ///
    /// Env overrides: `API_ORIGIN`, `API_TIMEOUT_MS`, `SESSION_FILE`.
    /// A missing config file is not an error; defaults apply.
    pub fn load(path: &Path) -> common::Result<Self> {
        let mut config: ClientConfig = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            ClientConfig {
                api: ApiConfig::default(),
            }
        };

        if let Ok(origin) = std::env::var("API_ORIGIN") {
            config.api.origin = origin;
        }
        if let Ok(timeout) = std::env::var("API_TIMEOUT_MS") {
            config.api.timeout_ms = timeout.parse().map_err(|e| {
                common::Error::Config(format!("API_TIMEOUT_MS is not a number: {e}"))
            })?;
        }
        if let Ok(file) = std::env::var("SESSION_FILE") {
            config.api.session_file = PathBuf::from(file);
        }

        if !config.api.origin.starts_with("http://") && !config.api.origin.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "origin must start with http:// or https://, got: {}",
                config.api.origin
            )));
        }

        if config.api.timeout_ms == 0 {
            return Err(common::Error::Config(
                "timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from an explicit arg or CONFIG_PATH env var.
    pub fn resolve_path(explicit: Option<&str>) -> PathBuf {
        if let Some(p) = explicit {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("api-client.toml")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.api.timeout_ms)
    }
}
