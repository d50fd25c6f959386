//! The authenticated request pipeline
//!
//! Every request flows through one loop:
//! 1. Proactive refresh if the stored access token is already expired
//! 2. CSRF token attached for mutating verbs
//! 3. Auth headers assembled, request sent with the configured timeout
//! 4. 401 triggers one coordinated refresh and one replay; a second 401
//!    on the replayed request is terminal (no refresh loop)
//! 5. Transient failures (transport errors, 5xx) retry with bounded
//!    exponential backoff; any other 4xx fails immediately
//!
//! The replay after a reactive refresh keeps its retry count: a replay is
//! a correction of credentials, not a retry of a transient failure.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;
use session_auth::{CredentialStore, CsrfCache, now_millis};
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorKind};
use crate::headers::{build_headers, is_mutating};
use crate::metrics;
use crate::refresh::{NoopNotifier, RefreshCoordinator, SessionNotifier};
use crate::retry::{RetryPolicy, is_transient_status, is_transient_transport};

/// Per-request options: JSON body and query parameters.
#[derive(Debug, Default)]
pub struct RequestOptions {
    pub body: Option<serde_json::Value>,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            query: Vec::new(),
        }
    }
}

/// Authenticated API client.
///
/// Cheap to share behind an `Arc`; all interior state is synchronized.
pub struct ApiClient {
    http: reqwest::Client,
    origin: String,
    timeout: Duration,
    store: Arc<CredentialStore>,
    csrf: CsrfCache,
    coordinator: RefreshCoordinator,
    notifier: Arc<dyn SessionNotifier>,
    policy: RetryPolicy,
}

impl ApiClient {
    /// Build a client from loaded configuration, opening (or creating) the
    /// session file it names.
    pub async fn from_config(
        config: &ClientConfig,
        notifier: Arc<dyn SessionNotifier>,
    ) -> Result<Self, ApiError> {
        let store = Arc::new(
            CredentialStore::load(config.api.session_file.clone())
                .await
                .map_err(ApiError::from)?,
        );
        Ok(Self::with_store(
            config.api.origin.clone(),
            config.timeout(),
            store,
            notifier,
        ))
    }

    /// Convenience constructor resolving and loading config from the default
    /// locations.
    pub async fn from_default_config() -> Result<Self, ApiError> {
        let path = ClientConfig::resolve_path(None);
        let config = ClientConfig::load(Path::new(&path)).map_err(|e| ApiError {
            kind: ErrorKind::Unknown,
            message: e.to_string(),
            code: None,
            http_status: None,
            raw_body: None,
        })?;
        Self::from_config(&config, Arc::new(NoopNotifier)).await
    }

    /// Build a client around an existing credential store.
    pub fn with_store(
        origin: String,
        timeout: Duration,
        store: Arc<CredentialStore>,
        notifier: Arc<dyn SessionNotifier>,
    ) -> Self {
        let http = reqwest::Client::new();
        let policy = RetryPolicy::default();
        let csrf = CsrfCache::new(http.clone(), origin.clone());
        let coordinator = RefreshCoordinator::new(
            http.clone(),
            origin.clone(),
            store.clone(),
            notifier.clone(),
            policy.clone(),
        );
        Self {
            http,
            origin,
            timeout,
            store,
            csrf,
            coordinator,
            notifier,
            policy,
        }
    }

    /// Replace the retry policy on both the request loop and the refresh
    /// coordinator. Primarily for tests that need short backoff delays.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.coordinator = RefreshCoordinator::new(
            self.http.clone(),
            self.origin.clone(),
            self.store.clone(),
            self.notifier.clone(),
            policy.clone(),
        );
        self.policy = policy;
        self
    }

    /// Access the underlying credential store, for login flows that obtain
    /// a token pair out of band and need to install it.
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Send an authenticated request and return the raw response body.
    #[instrument(
        skip_all,
        fields(
            request_id = %uuid::Uuid::new_v4(),
            method = %method,
            path = %path,
        )
    )]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Bytes, ApiError> {
        let url = format!("{}{path}", self.origin.trim_end_matches('/'));
        let mut retry_count: u32 = 0;
        let mut replayed_after_refresh = false;

        loop {
            // Proactive refresh: an access token known to be expired would
            // only earn a 401, so refresh before sending. This path does
            // not mark the request as replayed; the reactive 401 path below
            // still gets its one replay.
            if self.store.get().await.is_some() && self.store.is_expired(now_millis()).await {
                debug!("access token expired, refreshing before send");
                self.coordinator.refresh().await.inspect_err(|e| {
                    metrics::record_error(e.kind.label());
                })?;
            }

            let access = self.store.get().await.map(|c| c.access);

            let csrf = if is_mutating(&method) {
                match self.csrf.get(now_millis()).await {
                    Ok(token) => Some(token),
                    Err(e) => {
                        let err = ApiError::from(e);
                        metrics::record_error(err.kind.label());
                        return Err(err);
                    }
                }
            } else {
                None
            };

            let headers = build_headers(access.as_deref(), csrf.as_deref(), retry_count);

            let mut builder = self
                .http
                .request(method.clone(), &url)
                .headers(headers)
                .timeout(self.timeout);
            if !options.query.is_empty() {
                builder = builder.query(&options.query);
            }
            if let Some(ref body) = options.body {
                builder = builder.json(body);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    metrics::record_request(status, method.as_str());

                    if response.status().is_success() {
                        return response.bytes().await.map_err(|e| {
                            let err = ApiError::from_transport(&e);
                            metrics::record_error(err.kind.label());
                            err
                        });
                    }

                    if status == 401 {
                        if replayed_after_refresh {
                            warn!("replayed request still unauthorized, giving up");
                            metrics::record_error(ErrorKind::AuthExpired.label());
                            return Err(ApiError::auth_expired());
                        }
                        debug!("401 received, refreshing and replaying once");
                        self.coordinator.refresh().await.inspect_err(|e| {
                            metrics::record_error(e.kind.label());
                        })?;
                        replayed_after_refresh = true;
                        // Replay keeps the current retry count; this is a
                        // credential correction, not a transient retry
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();

                    if is_transient_status(status) && self.policy.should_retry(retry_count) {
                        let delay = self.policy.delay(retry_count);
                        warn!(
                            status,
                            retry_count,
                            delay_ms = delay.as_millis() as u64,
                            "server error, backing off"
                        );
                        metrics::record_retry("server_error");
                        tokio::time::sleep(delay).await;
                        retry_count += 1;
                        continue;
                    }

                    // A 5xx that exhausted its retries falls through here
                    // and is classified Server by status
                    let err = ApiError::from_response(status, &body);
                    metrics::record_error(err.kind.label());
                    return Err(err);
                }
                Err(e) => {
                    if is_transient_transport(&e) && self.policy.should_retry(retry_count) {
                        let delay = self.policy.delay(retry_count);
                        warn!(
                            retry_count,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "transport failure, backing off"
                        );
                        metrics::record_retry("transport");
                        tokio::time::sleep(delay).await;
                        retry_count += 1;
                        continue;
                    }
                    let err = ApiError::from_transport(&e);
                    metrics::record_error(err.kind.label());
                    return Err(err);
                }
            }
        }
    }

    /// Send an authenticated request and deserialize the JSON response.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let bytes = self.request(method, path, options).await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError {
            kind: ErrorKind::Unknown,
            message: format!("invalid response body: {e}"),
            code: None,
            http_status: None,
            raw_body: Some(String::from_utf8_lossy(&bytes).into_owned()),
        })
    }

    /// End the session locally: clear the stored credential and drop the
    /// cached CSRF token.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.csrf.invalidate().await;
        self.store.clear().await.map_err(ApiError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use session_auth::Credential;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    const FAR_FUTURE: u64 = 4_102_444_800_000;
    const PAST: u64 = 1_000;

    fn tiny_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base: Duration::from_millis(2),
            cap: Duration::from_millis(5),
        }
    }

    async fn spawn_backend(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Routes for the CSRF and refresh endpoints, counting refresh calls
    /// and issuing `at_b`/`rt_b` as the refreshed pair.
    fn auth_routes(refreshes: Arc<AtomicUsize>) -> axum::Router {
        axum::Router::new()
            .route(
                session_auth::token::CSRF_PATH,
                get(|| async { Json(serde_json::json!({"csrf_token": "csrf_1", "expires_in": 600})) }),
            )
            .route(
                session_auth::token::REFRESH_PATH,
                post(move || {
                    let refreshes = refreshes.clone();
                    async move {
                        refreshes.fetch_add(1, Ordering::SeqCst);
                        Json(serde_json::json!({
                            "access_token": "at_b",
                            "refresh_token": "rt_b",
                            "expires_in": 900
                        }))
                    }
                }),
            )
    }

    async fn client_with_credential(
        origin: String,
        dir: &tempfile::TempDir,
        expires: u64,
    ) -> ApiClient {
        let store = Arc::new(
            CredentialStore::load(dir.path().join("session.json"))
                .await
                .unwrap(),
        );
        store
            .set(Credential {
                access: "at_a".into(),
                refresh: "rt_a".into(),
                expires,
            })
            .await
            .unwrap();
        ApiClient::with_store(
            origin,
            Duration::from_secs(5),
            store,
            Arc::new(NoopNotifier),
        )
        .with_retry_policy(tiny_policy())
    }

    fn auth_header(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn get_sends_bearer_and_retry_count_without_csrf() {
        let seen: Arc<AsyncMutex<Vec<(Option<String>, Option<String>, Option<String>)>>> =
            Arc::new(AsyncMutex::new(Vec::new()));
        let recorder = seen.clone();
        let router = axum::Router::new().route(
            "/api/users",
            get(move |headers: HeaderMap| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().await.push((
                        auth_header(&headers),
                        headers
                            .get("x-csrf-token")
                            .map(|v| v.to_str().unwrap().to_string()),
                        headers
                            .get("x-retry-count")
                            .map(|v| v.to_str().unwrap().to_string()),
                    ));
                    Json(serde_json::json!([]))
                }
            }),
        );
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_with_credential(origin, &dir, FAR_FUTURE).await;
        client
            .request(Method::GET, "/api/users", RequestOptions::default())
            .await
            .unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("Bearer at_a"));
        assert_eq!(seen[0].1, None, "GET must not carry a CSRF token");
        assert_eq!(seen[0].2.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn mutating_request_carries_csrf_token() {
        let seen: Arc<AsyncMutex<Vec<Option<String>>>> = Arc::new(AsyncMutex::new(Vec::new()));
        let recorder = seen.clone();
        let refreshes = Arc::new(AtomicUsize::new(0));
        let router = axum::Router::new()
            .route(
                "/api/users",
                post(
                    move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                        let recorder = recorder.clone();
                        async move {
                            recorder.lock().await.push(
                                headers
                                    .get("x-csrf-token")
                                    .map(|v| v.to_str().unwrap().to_string()),
                            );
                            assert_eq!(body["name"], "Ada");
                            (StatusCode::CREATED, Json(serde_json::json!({"id": 1})))
                        }
                    },
                ),
            )
            .merge(auth_routes(refreshes));
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_with_credential(origin, &dir, FAR_FUTURE).await;
        client
            .request(
                Method::POST,
                "/api/users",
                RequestOptions::json(serde_json::json!({"name": "Ada"})),
            )
            .await
            .unwrap();

        assert_eq!(seen.lock().await[0].as_deref(), Some("csrf_1"));
    }

    #[tokio::test]
    async fn reactive_401_refreshes_and_replays_once() {
        let seen: Arc<AsyncMutex<Vec<(Option<String>, Option<String>)>>> =
            Arc::new(AsyncMutex::new(Vec::new()));
        let recorder = seen.clone();
        let refreshes = Arc::new(AtomicUsize::new(0));
        let router = axum::Router::new()
            .route(
                "/api/users",
                get(move |headers: HeaderMap| {
                    let recorder = recorder.clone();
                    async move {
                        let auth = auth_header(&headers);
                        let retry = headers
                            .get("x-retry-count")
                            .map(|v| v.to_str().unwrap().to_string());
                        recorder.lock().await.push((auth.clone(), retry));
                        if auth.as_deref() == Some("Bearer at_b") {
                            Ok(Json(serde_json::json!([{"id": 1}])))
                        } else {
                            Err(StatusCode::UNAUTHORIZED)
                        }
                    }
                }),
            )
            .merge(auth_routes(refreshes.clone()));
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        // Not locally expired, but the backend rejects it anyway
        let client = client_with_credential(origin, &dir, FAR_FUTURE).await;
        let body: serde_json::Value = client
            .request_json(Method::GET, "/api/users", RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(body[0]["id"], 1);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 2, "original attempt plus one replay");
        assert_eq!(seen[0].0.as_deref(), Some("Bearer at_a"));
        assert_eq!(seen[1].0.as_deref(), Some("Bearer at_b"));
        // The replay corrects credentials, it is not a transient retry
        assert_eq!(seen[0].1.as_deref(), Some("0"));
        assert_eq!(seen[1].1.as_deref(), Some("0"));

        let cred = client.store().get().await.unwrap();
        assert_eq!(cred.access, "at_b");
        assert_eq!(cred.refresh, "rt_b");
    }

    #[tokio::test]
    async fn second_401_after_refresh_is_terminal() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let refreshes = Arc::new(AtomicUsize::new(0));
        let router = axum::Router::new()
            .route(
                "/api/users",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        StatusCode::UNAUTHORIZED
                    }
                }),
            )
            .merge(auth_routes(refreshes.clone()));
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_with_credential(origin, &dir, FAR_FUTURE).await;
        let err = client
            .request(Method::GET, "/api/users", RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::AuthExpired);
        assert_eq!(attempts.load(Ordering::SeqCst), 2, "exactly one replay");
        assert_eq!(refreshes.load(Ordering::SeqCst), 1, "no refresh loop");
    }

    #[tokio::test]
    async fn expired_credential_refreshes_before_send() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let router = axum::Router::new()
            .route(
                "/api/users",
                get(|headers: HeaderMap| async move {
                    // The expired token must never reach the wire
                    assert_eq!(auth_header(&headers).as_deref(), Some("Bearer at_b"));
                    Json(serde_json::json!([]))
                }),
            )
            .merge(auth_routes(refreshes.clone()));
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_with_credential(origin, &dir, PAST).await;
        client
            .request(Method::GET, "/api/users", RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_expired_requests_share_one_refresh() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();
        let router = axum::Router::new()
            .route("/api/users", get(|| async { Json(serde_json::json!([])) }))
            .route(
                session_auth::token::REFRESH_PATH,
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Json(serde_json::json!({
                            "access_token": "at_b",
                            "refresh_token": "rt_b",
                            "expires_in": 900
                        }))
                    }
                }),
            );
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(client_with_credential(origin, &dir, PAST).await);

        let mut handles = vec![];
        for _ in 0..8 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                client
                    .request(Method::GET, "/api/users", RequestOptions::default())
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(
            refreshes.load(Ordering::SeqCst),
            1,
            "concurrent expired requests must share a single refresh"
        );
    }

    #[tokio::test]
    async fn validation_error_is_not_retried_and_not_refreshed() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let refreshes = Arc::new(AtomicUsize::new(0));
        let router = axum::Router::new()
            .route(
                "/api/users",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        (
                            StatusCode::UNPROCESSABLE_ENTITY,
                            Json(serde_json::json!({"detail": "name required", "code": "E_NAME"})),
                        )
                    }
                }),
            )
            .merge(auth_routes(refreshes.clone()));
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_with_credential(origin, &dir, FAR_FUTURE).await;
        let err = client
            .request(
                Method::POST,
                "/api/users",
                RequestOptions::json(serde_json::json!({})),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.message, "name required");
        assert_eq!(err.code.as_deref(), Some("E_NAME"));
        assert_eq!(err.http_status, Some(422));
        assert_eq!(attempts.load(Ordering::SeqCst), 1, "4xx is never retried");
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn server_error_exhausts_retries_then_fails_as_server() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let router = axum::Router::new().route(
            "/api/users",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance")
                }
            }),
        );
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_with_credential(origin, &dir, FAR_FUTURE).await;
        let err = client
            .request(Method::GET, "/api/users", RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Server);
        assert_eq!(err.http_status, Some(503));
        assert_eq!(
            attempts.load(Ordering::SeqCst),
            4,
            "initial attempt plus three retries"
        );
    }

    #[tokio::test]
    async fn timeout_exhausts_retries_then_fails_transient() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let router = axum::Router::new().route(
            "/api/users",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Json(serde_json::json!([]))
                }
            }),
        );
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            CredentialStore::load(dir.path().join("session.json"))
                .await
                .unwrap(),
        );
        store
            .set(Credential {
                access: "at_a".into(),
                refresh: "rt_a".into(),
                expires: FAR_FUTURE,
            })
            .await
            .unwrap();
        let client = ApiClient::with_store(
            origin,
            Duration::from_millis(100),
            store,
            Arc::new(NoopNotifier),
        )
        .with_retry_policy(tiny_policy());

        let err = client
            .request(Method::GET, "/api/users", RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::TransientNetwork);
        assert_eq!(err.http_status, None);
        assert_eq!(
            attempts.load(Ordering::SeqCst),
            4,
            "each timeout counts against the retry bound"
        );
    }

    #[tokio::test]
    async fn server_error_recovers_when_backend_comes_back() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let router = axum::Router::new().route(
            "/api/users",
            get(move |headers: HeaderMap| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    let retry = headers.get("x-retry-count").unwrap().to_str().unwrap();
                    assert_eq!(retry, n.to_string(), "retry count must track attempts");
                    if n < 2 {
                        Err(StatusCode::BAD_GATEWAY)
                    } else {
                        Ok(Json(serde_json::json!([])))
                    }
                }
            }),
        );
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_with_credential(origin, &dir, FAR_FUTURE).await;
        client
            .request(Method::GET, "/api/users", RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn connect_failure_is_transient_network() {
        let dir = tempfile::tempdir().unwrap();
        // Nothing listens on this port
        let client = client_with_credential("http://127.0.0.1:1".into(), &dir, FAR_FUTURE).await;
        let err = client
            .request(Method::GET, "/api/users", RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::TransientNetwork);
        assert_eq!(err.http_status, None);
    }

    #[tokio::test]
    async fn unauthenticated_request_sends_no_bearer() {
        let seen: Arc<AsyncMutex<Vec<Option<String>>>> = Arc::new(AsyncMutex::new(Vec::new()));
        let recorder = seen.clone();
        let router = axum::Router::new().route(
            "/api/health",
            get(move |headers: HeaderMap| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().await.push(auth_header(&headers));
                    Json(serde_json::json!({"ok": true}))
                }
            }),
        );
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            CredentialStore::load(dir.path().join("session.json"))
                .await
                .unwrap(),
        );
        let client = ApiClient::with_store(
            origin,
            Duration::from_secs(5),
            store,
            Arc::new(NoopNotifier),
        );
        client
            .request(Method::GET, "/api/health", RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(seen.lock().await[0], None);
    }

    #[tokio::test]
    async fn query_parameters_are_appended() {
        let router = axum::Router::new().route(
            "/api/users",
            get(
                |axum::extract::Query(q): axum::extract::Query<
                    std::collections::HashMap<String, String>,
                >| async move {
                    assert_eq!(q.get("page").map(String::as_str), Some("2"));
                    Json(serde_json::json!([]))
                },
            ),
        );
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_with_credential(origin, &dir, FAR_FUTURE).await;
        client
            .request(
                Method::GET,
                "/api/users",
                RequestOptions {
                    body: None,
                    query: vec![("page".into(), "2".into())],
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn request_json_rejects_malformed_body() {
        let router = axum::Router::new().route("/api/users", get(|| async { "not json at all" }));
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_with_credential(origin, &dir, FAR_FUTURE).await;
        let err = client
            .request_json::<serde_json::Value>(Method::GET, "/api/users", RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.raw_body.as_deref(), Some("not json at all"));
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let router = axum::Router::new().merge(auth_routes(refreshes));
        let origin = spawn_backend(router).await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_with_credential(origin, &dir, FAR_FUTURE).await;

        assert!(client.store().get().await.is_some());
        client.logout().await.unwrap();
        assert!(client.store().get().await.is_none());

        // The purge survives a restart of the store
        let store2 = CredentialStore::load(dir.path().join("session.json"))
            .await
            .unwrap();
        assert!(store2.get().await.is_none());
    }
}
