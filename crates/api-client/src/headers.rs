//! Outgoing request header assembly
//!
//! Pure transform from (credential, csrf token, retry count) to a header
//! map. The wire contract:
//!   Authorization: Bearer <access token>     when authenticated
//!   X-CSRF-Token: <token>                    mutating verbs only
//!   X-Retry-Count: <n>                       always, 0 on first attempt

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");
pub const RETRY_COUNT_HEADER: HeaderName = HeaderName::from_static("x-retry-count");

/// Whether the verb mutates state and therefore needs a CSRF token.
pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Assemble the authentication headers for one request attempt.
///
/// A token that cannot be encoded as a header value is skipped with a
/// warning rather than failing the request; the backend will answer 401
/// and the normal recovery path takes over.
pub fn build_headers(
    access_token: Option<&str>,
    csrf_token: Option<&str>,
    retry_count: u32,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(token) = access_token {
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("access token is not a valid header value, sending unauthenticated"),
        }
    }

    if let Some(token) = csrf_token {
        match HeaderValue::from_str(token) {
            Ok(value) => {
                headers.insert(CSRF_HEADER, value);
            }
            Err(_) => warn!("CSRF token is not a valid header value, omitting"),
        }
    }

    // u32 formatting is always a valid header value
    if let Ok(value) = HeaderValue::from_str(&retry_count.to_string()) {
        headers.insert(RETRY_COUNT_HEADER, value);
    }

    headers
}
