//! Session credential lifecycle for the admin console API client
//!
//! Provides the durable credential store, the token refresh wire call, and
//! the CSRF token cache. This crate is a standalone library with no
//! dependency on the request pipeline, so it can be tested and used
//! independently.
//!
//! Credential flow:
//! 1. A login flow (outside this crate) obtains a token pair and stores it
//!    via `CredentialStore::set()`
//! 2. The pipeline reads the pair via `CredentialStore::get()` per request
//! 3. On expiry or a 401, the pipeline calls `token::refresh_session()` and
//!    persists the result via `CredentialStore::set()`
//! 4. Mutating requests read the anti-forgery token via `CsrfCache::get()`
//! 5. Logout or a dead refresh token ends in `CredentialStore::clear()`

pub mod credentials;
pub mod csrf;
pub mod error;
pub mod token;

pub use credentials::{Credential, CredentialStore};
pub use csrf::{CsrfCache, CsrfToken};
pub use error::{Error, Result};
pub use token::{TokenResponse, fetch_csrf_token, refresh_session};

/// Current unix time in milliseconds.
///
/// Credential and CSRF expirations are stored as absolute unix millisecond
/// timestamps; every expiry comparison in this workspace goes through this
/// clock.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
