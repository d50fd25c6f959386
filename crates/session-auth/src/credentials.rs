//! Durable storage for the session credential
//!
//! Manages a JSON file holding the current access/refresh token pair and the
//! cached identity profile. All writes use atomic temp-file + rename to
//! prevent corruption on crash. A tokio Mutex serializes writers; readers
//! acquire the lock briefly and clone out, so no caller ever observes a
//! half-written credential.
//!
//! The session file is the single source of truth for token data. A process
//! restart recovers session state by loading the same path.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// The access/refresh token pair identifying an authenticated session.
///
/// `expires` is a unix timestamp in milliseconds (absolute, not a delta).
/// Computed at storage time from `TokenResponse.expires_in` (seconds delta)
/// plus the current time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Current access token (Bearer token for API calls)
    pub access: String,
    /// Refresh token for obtaining new access tokens
    pub refresh: String,
    /// Expiration as unix timestamp in milliseconds
    pub expires: u64,
}

/// Persisted session state: the credential plus any identity data cached
/// alongside it. The profile is purged together with the credential so a
/// logged-out process never holds stale identity data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Session {
    #[serde(skip_serializing_if = "Option::is_none")]
    credential: Option<Credential>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<serde_json::Value>,
}

/// Thread-safe session file manager.
///
/// The Mutex serializes all access; `set` and `clear` hold it across the
/// in-memory update and the disk write, so `get` sees either the old or the
/// new credential, never a mix.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<Session>,
}

impl CredentialStore {
    /// Load session state from the given file path.
    ///
    /// If the file doesn't exist, creates it as an empty session (cold start,
    /// nobody logged in). The pipeline sends unauthenticated requests until a
    /// credential is stored.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let session: Session = serde_json::from_str(&contents)
                .map_err(|e| Error::SessionParse(format!("parsing session file: {e}")))?;
            info!(
                path = %path.display(),
                authenticated = session.credential.is_some(),
                "loaded session"
            );
            session
        } else {
            info!(path = %path.display(), "session file not found, starting logged out");
            let session = Session::default();
            write_atomic(&path, &session).await?;
            session
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get a clone of the current credential, if a session exists.
    pub async fn get(&self) -> Option<Credential> {
        let state = self.state.lock().await;
        state.credential.clone()
    }

    /// Install a credential (login or refresh result) and persist to disk.
    pub async fn set(&self, credential: Credential) -> Result<()> {
        let mut state = self.state.lock().await;
        state.credential = Some(credential);
        debug!("stored credential");
        write_atomic(&self.path, &state).await
    }

    /// Destroy the session: credential and cached profile both cleared, and
    /// the purge persisted so a restart comes up logged out.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.credential = None;
        state.profile = None;
        info!("cleared session");
        write_atomic(&self.path, &state).await
    }

    /// Whether the stored access token has expired as of `now_millis`.
    ///
    /// An empty store counts as expired: there is no token that could be
    /// attached to a request.
    pub async fn is_expired(&self, now_millis: u64) -> bool {
        let state = self.state.lock().await;
        match &state.credential {
            Some(credential) => credential.expires <= now_millis,
            None => true,
        }
    }

    /// Get a clone of the cached identity profile.
    pub async fn profile(&self) -> Option<serde_json::Value> {
        let state = self.state.lock().await;
        state.profile.clone()
    }

    /// Cache identity data tied to the current credential and persist.
    pub async fn set_profile(&self, profile: serde_json::Value) -> Result<()> {
        let mut state = self.state.lock().await;
        state.profile = Some(profile);
        debug!("stored profile");
        write_atomic(&self.path, &state).await
    }
}

/// Write the session to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. This prevents corruption if the process crashes mid-write.
/// Sets file permissions to 0600 (owner read/write only) since the file
/// contains token material.
async fn write_atomic(path: &Path, session: &Session) -> Result<()> {
    let json = serde_json::to_string_pretty(session)
        .map_err(|e| Error::SessionParse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}
