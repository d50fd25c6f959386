//! Cached anti-forgery token for mutating verbs
//!
//! The backend issues short-lived CSRF tokens; every POST/PUT/PATCH/DELETE
//! must carry one. The cache fetches lazily and shares one token across all
//! mutating requests inside its validity window. The cache mutex is held
//! across the network fetch, so N concurrent callers produce exactly one
//! fetch: the leader fills the cache and the followers find it filled when
//! they acquire the lock.

use common::Secret;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::token;

/// Margin subtracted from the token lifetime when judging freshness, so a
/// token is never attached moments before it lapses in transit.
const EXPIRY_SKEW_MS: u64 = 5_000;

/// A server-issued anti-forgery token with its absolute expiry.
#[derive(Debug, Clone)]
pub struct CsrfToken {
    pub value: Secret<String>,
    /// Expiration as unix timestamp in milliseconds
    pub expires: u64,
}

/// Lazily-populated single-flight CSRF token cache.
pub struct CsrfCache {
    client: reqwest::Client,
    origin: String,
    state: Mutex<Option<CsrfToken>>,
}

impl CsrfCache {
    pub fn new(client: reqwest::Client, origin: String) -> Self {
        Self {
            client,
            origin,
            state: Mutex::new(None),
        }
    }

    /// Return the cached token value, fetching a fresh one if the cache is
    /// empty or the token expires within the skew margin.
    pub async fn get(&self, now_millis: u64) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.as_ref() {
            if token.expires > now_millis + EXPIRY_SKEW_MS {
                return Ok(token.value.expose().clone());
            }
        }

        debug!("CSRF token absent or expiring, fetching");
        let response = token::fetch_csrf_token(&self.client, &self.origin).await?;
        let value = response.csrf_token;
        *state = Some(CsrfToken {
            value: Secret::new(value.clone()),
            expires: now_millis + response.expires_in * 1000,
        });
        Ok(value)
    }

    /// Drop the cached token. Called on logout; the next mutating request
    /// fetches a fresh one.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        *state = None;
    }
}
