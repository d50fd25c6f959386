//! Shared error types for configuration and local IO

use thiserror::Error;

/// Errors raised while loading configuration or touching local files.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using the shared Error.
pub type Result<T> = std::result::Result<T, Error>;
