//! Session token endpoint wire calls
//!
//! Two interactions with the console backend:
//! 1. Token refresh (exchanging the refresh token for a new pair)
//! 2. CSRF token fetch (anti-forgery value for mutating verbs)
//!
//! Both target the configured API origin. The refresh endpoint rejecting the
//! refresh token (401/403) is a terminal condition surfaced as
//! `Error::InvalidCredentials`; callers treat transport failures as
//! retryable.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Path of the refresh endpoint, relative to the API origin.
pub const REFRESH_PATH: &str = "/api/auth/refresh";

/// Path of the CSRF token endpoint, relative to the API origin.
pub const CSRF_PATH: &str = "/api/auth/csrf";

/// Response from the refresh endpoint.
///
/// `expires_in` is a delta in seconds from the response time. The caller
/// converts this to an absolute unix millisecond timestamp when storing
/// the credential.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Response from the CSRF token endpoint.
#[derive(Debug, Deserialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
    /// Seconds the token remains valid (delta, not absolute)
    pub expires_in: u64,
}

/// Exchange a refresh token for a new credential pair.
///
/// Called by the refresh coordinator, both proactively (expired access
/// token observed before send) and reactively (401 observed on a response).
pub async fn refresh_session(
    client: &reqwest::Client,
    origin: &str,
    refresh: &str,
) -> Result<TokenResponse> {
    let url = format!("{}{REFRESH_PATH}", origin.trim_end_matches('/'));
    let response = client
        .post(&url)
        .json(&RefreshRequest {
            refresh_token: refresh,
        })
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 401/403 means the refresh token is revoked or expired
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenRefresh(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenRefresh(format!("invalid refresh response: {e}")))
}

/// Fetch a fresh CSRF token from the backend.
///
/// Only the `CsrfCache` calls this; callers go through the cache so
/// concurrent mutating requests share one fetch per validity window.
pub async fn fetch_csrf_token(client: &reqwest::Client, origin: &str) -> Result<CsrfResponse> {
    let url = format!("{}{CSRF_PATH}", origin.trim_end_matches('/'));
    let response = client.get(&url).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Csrf(format!(
            "CSRF endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<CsrfResponse>()
        .await
        .map_err(|e| Error::Csrf(format!("invalid CSRF response: {e}")))
}
