//! Authenticated request pipeline for the admin console backend
//!
//! Wraps every API call in the session credential lifecycle:
//!
//! - Bearer token attached from the durable credential store
//! - CSRF token fetched lazily and attached to mutating verbs
//! - Expired credentials refreshed proactively, 401 responses refreshed
//!   reactively with a single replay
//! - Transient failures retried with bounded exponential backoff
//! - Every failure normalized into one `ApiError` taxonomy
//!
//! ```no_run
//! use api_client::{ApiClient, RequestOptions};
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), api_client::ApiError> {
//! let client = ApiClient::from_default_config().await?;
//! let users: serde_json::Value = client
//!     .request_json(Method::GET, "/api/users", RequestOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod metrics;
pub mod refresh;
pub mod retry;

pub use client::{ApiClient, RequestOptions};
pub use config::ClientConfig;
pub use error::{ApiError, ErrorKind};
pub use refresh::{NoopNotifier, RefreshCoordinator, SessionNotifier};
pub use retry::RetryPolicy;
