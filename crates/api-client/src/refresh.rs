//! Single-flight credential refresh coordinator
//!
//! Many requests can observe an expired access token at once. Exactly one
//! of them performs the refresh; the rest park on a oneshot channel and
//! receive the same outcome, in arrival order. The coordinator never holds
//! its lock across network I/O: the leader releases the lock, refreshes,
//! then re-acquires it to fan the result out.
//!
//! A refresh that fails terminally (the backend rejects the refresh token)
//! destroys the session and notifies the embedder exactly once, no matter
//! how many requests were waiting.

use std::sync::Arc;

use session_auth::{Credential, CredentialStore, now_millis, token};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::metrics;
use crate::retry::{RetryPolicy, is_transient_transport};

/// Hook invoked when the session is terminally lost.
///
/// The pipeline has no opinion on what re-authentication looks like; the
/// embedder decides (prompt the user, restart a login flow, exit).
pub trait SessionNotifier: Send + Sync {
    fn session_expired(&self);
}

/// Default notifier that only logs.
pub struct NoopNotifier;

impl SessionNotifier for NoopNotifier {
    fn session_expired(&self) {
        info!("session expired, re-authentication required");
    }
}

struct RefreshState {
    in_progress: bool,
    waiters: Vec<oneshot::Sender<Result<String, ApiError>>>,
}

/// Serializes credential refreshes across concurrent requests.
pub struct RefreshCoordinator {
    client: reqwest::Client,
    origin: String,
    store: Arc<CredentialStore>,
    notifier: Arc<dyn SessionNotifier>,
    policy: RetryPolicy,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(
        client: reqwest::Client,
        origin: String,
        store: Arc<CredentialStore>,
        notifier: Arc<dyn SessionNotifier>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            origin,
            store,
            notifier,
            policy,
            state: Mutex::new(RefreshState {
                in_progress: false,
                waiters: Vec::new(),
            }),
        }
    }

    /// Obtain a fresh access token, joining an in-flight refresh if one
    /// exists.
    ///
    /// Returns the new access token on success. On terminal failure the
    /// session has already been cleared and the notifier fired; the caller
    /// only needs to surface the error.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let rx = {
            let mut state = self.state.lock().await;
            if state.in_progress {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                debug!(waiters = state.waiters.len(), "joining in-flight refresh");
                Some(rx)
            } else {
                state.in_progress = true;
                None
            }
        };

        if let Some(rx) = rx {
            // The leader always drains waiters before resetting the flag,
            // so a dropped sender can only mean the leader panicked.
            return rx.await.unwrap_or_else(|_| Err(ApiError::auth_expired()));
        }

        let outcome = self.perform_refresh().await;

        let waiters = {
            let mut state = self.state.lock().await;
            state.in_progress = false;
            std::mem::take(&mut state.waiters)
        };
        debug!(
            waiters = waiters.len(),
            ok = outcome.is_ok(),
            "refresh complete, waking waiters"
        );
        for tx in waiters {
            // A waiter that gave up (request cancelled) is fine to skip
            let _ = tx.send(outcome.clone());
        }

        outcome
    }

    /// Execute the refresh wire call, retrying transient failures per the
    /// policy. Terminal failure clears the session.
    async fn perform_refresh(&self) -> Result<String, ApiError> {
        let Some(credential) = self.store.get().await else {
            warn!("refresh requested but no session exists");
            self.notifier.session_expired();
            return Err(ApiError::auth_expired());
        };

        let mut attempt: u32 = 0;
        loop {
            match token::refresh_session(&self.client, &self.origin, &credential.refresh).await {
                Ok(response) => {
                    let expires = now_millis() + response.expires_in * 1000;
                    let access = response.access_token.clone();
                    if let Err(e) = self
                        .store
                        .set(Credential {
                            access: response.access_token,
                            refresh: response.refresh_token,
                            expires,
                        })
                        .await
                    {
                        // The new pair is valid even if persisting it
                        // failed; a restart will just refresh again.
                        warn!(error = %e, "failed to persist refreshed credential");
                    }
                    metrics::record_refresh("ok");
                    info!("session refreshed");
                    return Ok(access);
                }
                Err(session_auth::Error::Http(ref e))
                    if is_transient_transport(e) && self.policy.should_retry(attempt) =>
                {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient refresh failure, backing off"
                    );
                    metrics::record_retry("refresh_transport");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(error = %e, "refresh failed terminally, destroying session");
                    if let Err(e) = self.store.clear().await {
                        warn!(error = %e, "failed to clear session file");
                    }
                    metrics::record_refresh("failed");
                    self.notifier.session_expired();
                    return Err(ApiError::auth_expired());
                }
            }
        }
    }
}
