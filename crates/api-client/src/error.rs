//! Uniform error record for pipeline consumers
//!
//! Every failure leaving the pipeline is normalized into an `ApiError`:
//! one taxonomy kind, a human-readable message, and whatever structured
//! detail the backend supplied. Callers branch on `kind` without parsing
//! message strings.

use serde::{Deserialize, Serialize};

/// Taxonomy of failure categories the pipeline reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Session could not be restored; the caller must re-authenticate.
    AuthExpired,
    /// Transport-level failure (timeout, refused connection) or 5xx after
    /// retries were exhausted.
    TransientNetwork,
    /// The backend rejected the request as malformed (4xx other than 401).
    Validation,
    /// The backend failed internally (5xx) in a way retries did not cure.
    Server,
    /// Anything the classifier could not place.
    Unknown,
}

impl ErrorKind {
    /// Stable lowercase label, used for log fields and metric tags.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::AuthExpired => "auth_expired",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::Validation => "validation",
            ErrorKind::Server => "server",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// Fallback message when the response body carries no usable detail.
const DEFAULT_MESSAGE: &str = "request failed";

/// Normalized pipeline error.
///
/// `code` and `http_status` are populated when the backend supplied them;
/// `raw_body` preserves the unparsed response body for diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {message}", .kind.label())]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    /// Machine-readable error code from the response body, if present.
    pub code: Option<String>,
    /// HTTP status of the failed response, if one was received.
    pub http_status: Option<u16>,
    /// Unparsed response body, for diagnostics.
    pub raw_body: Option<String>,
}

impl ApiError {
    /// Terminal authentication failure: session is gone and cannot be
    /// refreshed.
    pub fn auth_expired() -> Self {
        Self {
            kind: ErrorKind::AuthExpired,
            message: "session expired".into(),
            code: None,
            http_status: None,
            raw_body: None,
        }
    }

    /// Classify a received HTTP error response.
    ///
    /// Message precedence: body `detail`, then `message` (top-level or
    /// nested under an `error` object), then a generic fallback. The raw
    /// body is preserved verbatim.
    pub fn from_response(status: u16, body: &str) -> Self {
        let kind = match status {
            401 => ErrorKind::AuthExpired,
            400..=499 => ErrorKind::Validation,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        };

        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let message = parsed
            .as_ref()
            .and_then(extract_message)
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
        let code = parsed.as_ref().and_then(extract_code);

        Self {
            kind,
            message,
            code,
            http_status: Some(status),
            raw_body: if body.is_empty() {
                None
            } else {
                Some(body.to_string())
            },
        }
    }

    /// Classify a transport failure where no response was received.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() || err.is_connect() {
            ErrorKind::TransientNetwork
        } else {
            ErrorKind::Unknown
        };
        Self {
            kind,
            message: err.to_string(),
            code: None,
            http_status: None,
            raw_body: None,
        }
    }
}

fn extract_message(body: &serde_json::Value) -> Option<String> {
    for value in [
        body.get("detail"),
        body.get("message"),
        body.get("error").and_then(|e| e.get("message")),
    ]
    .into_iter()
    .flatten()
    {
        if let Some(s) = value.as_str() {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

fn extract_code(body: &serde_json::Value) -> Option<String> {
    for value in [
        body.get("code"),
        body.get("error").and_then(|e| e.get("code")),
    ]
    .into_iter()
    .flatten()
    {
        if let Some(s) = value.as_str() {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

impl From<session_auth::Error> for ApiError {
    fn from(err: session_auth::Error) -> Self {
        match err {
            session_auth::Error::Http(ref e) => Self::from_transport(e),
            session_auth::Error::InvalidCredentials(_) => Self::auth_expired(),
            other => Self {
                kind: ErrorKind::Unknown,
                message: other.to_string(),
                code: None,
                http_status: None,
                raw_body: None,
            },
        }
    }
}
