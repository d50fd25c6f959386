//! Error types for session credential operations

/// Errors from credential storage and token endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure (no response received). The pipeline inspects
    /// the source to decide whether the failure is retryable.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("CSRF token fetch failed: {0}")]
    Csrf(String),

    #[error("session parse error: {0}")]
    SessionParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
