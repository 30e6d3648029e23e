use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::identity::AuthError;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Token endpoint reply (authorization code and refresh grants).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the refresh token in seconds; 0 means it does not expire.
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    /// Fails when a lifetime in the response does not fit a timestamp.
    pub fn from_token_response(response: TokenResponse, now: DateTime<Utc>) -> Result<Self, AuthError> {
        let refresh_expires_at = match response.refresh_expires_in {
            Some(secs) if secs > 0 => Some(expiry_after(now, secs, "refresh_expires_in")?),
            _ => None,
        };
        Ok(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
            expires_at: expiry_after(now, response.expires_in, "expires_in")?,
            refresh_expires_at,
            created_at: now,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Check if the access token expires within `min_validity` and should be refreshed
    pub fn needs_refresh(&self, min_validity: std::time::Duration) -> bool {
        Duration::from_std(min_validity)
            .map(|margin| self.time_until_expiry() < margin)
            .unwrap_or(true)
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Whether a refresh grant can still be attempted with this session
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
            && self
                .refresh_expires_at
                .map(|at| Utc::now() < at)
                .unwrap_or(true)
    }
}

fn expiry_after(now: DateTime<Utc>, secs: i64, field: &str) -> Result<DateTime<Utc>, AuthError> {
    Duration::try_seconds(secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| AuthError::InvalidTokenResponse(format!("{} out of range: {}", field, secs)))
}

/// On-disk session for one realm/client, restored on startup for silent login.
pub struct Session {
    cache_dir: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            data: None,
        }
    }

    /// Load session from disk. Returns whether a usable session was found.
    pub fn load(&mut self) -> Result<bool> {
        let path = self.session_path();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read session file")?;
            let data: SessionData = match serde_json::from_str(&contents) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable session file");
                    self.clear()?;
                    return Ok(false);
                }
            };

            if !data.is_expired() || data.can_refresh() {
                self.data = Some(data);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = self.data {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(&path, contents)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                    .context("Failed to restrict session file permissions")?;
            }
        }
        Ok(())
    }

    /// Clear session data
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Update session with new data
    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    /// Get the bearer token if a session exists
    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.access_token.as_str())
    }

    /// Check if session is valid (exists and not expired)
    pub fn is_valid(&self) -> bool {
        self.data.as_ref().map(|d| !d.is_expired()).unwrap_or(false)
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_data(expires_in: i64, refresh_expires_in: Option<i64>) -> SessionData {
        SessionData::from_token_response(
            TokenResponse {
                access_token: "access".to_string(),
                expires_in,
                refresh_token: refresh_expires_in.map(|_| "refresh".to_string()),
                refresh_expires_in,
                id_token: None,
            },
            Utc::now(),
        )
        .expect("Failed to build session data")
    }

    #[test]
    fn test_needs_refresh_respects_margin() {
        let margin = std::time::Duration::from_secs(5);
        assert!(!session_data(300, None).needs_refresh(margin));
        assert!(session_data(3, None).needs_refresh(margin));
        assert!(session_data(-10, None).needs_refresh(margin));
    }

    #[test]
    fn test_out_of_range_lifetimes_are_rejected() {
        let response = |expires_in, refresh_expires_in| TokenResponse {
            access_token: "access".to_string(),
            expires_in,
            refresh_token: Some("refresh".to_string()),
            refresh_expires_in,
            id_token: None,
        };

        let result = SessionData::from_token_response(response(i64::MAX, None), Utc::now());
        assert!(matches!(result, Err(AuthError::InvalidTokenResponse(ref m)) if m.starts_with("expires_in")));

        let result = SessionData::from_token_response(response(300, Some(i64::MAX)), Utc::now());
        assert!(matches!(result, Err(AuthError::InvalidTokenResponse(ref m)) if m.starts_with("refresh_expires_in")));
    }

    #[test]
    fn test_zero_refresh_expiry_never_expires() {
        let data = session_data(300, Some(0));
        assert_eq!(data.refresh_expires_at, None);
        assert!(data.can_refresh());
    }

    #[test]
    fn test_can_refresh() {
        assert!(!session_data(300, None).can_refresh());
        assert!(session_data(300, Some(1800)).can_refresh());

        let mut expired = session_data(300, Some(1800));
        expired.refresh_expires_at = Some(Utc::now() - Duration::seconds(1));
        assert!(!expired.can_refresh());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(session_data(300, Some(1800)));
        session.save().expect("Failed to save session");

        let mut restored = Session::new(dir.path().to_path_buf());
        assert!(restored.load().expect("Failed to load session"));
        assert_eq!(restored.data, session.data);
        assert_eq!(restored.token(), Some("access"));
        assert!(restored.is_valid());
    }

    #[test]
    fn test_load_keeps_refreshable_session_with_expired_access_token() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(session_data(-60, Some(1800)));
        session.save().expect("Failed to save session");

        let mut restored = Session::new(dir.path().to_path_buf());
        assert!(restored.load().expect("Failed to load session"));
        assert!(!restored.is_valid());
    }

    #[test]
    fn test_load_skips_dead_session() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(session_data(-60, None));
        session.save().expect("Failed to save session");

        let mut restored = Session::new(dir.path().to_path_buf());
        assert!(!restored.load().expect("Failed to load session"));
        assert!(restored.data.is_none());
    }

    #[test]
    fn test_load_discards_corrupt_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join(SESSION_FILE), "{not json").expect("Failed to write session file");

        let mut session = Session::new(dir.path().to_path_buf());
        assert!(!session.load().expect("Corrupt session should not be an error"));
        assert!(session.data.is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(session_data(300, None));
        session.save().expect("Failed to save session");

        session.clear().expect("Failed to clear session");
        assert!(session.data.is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());
    }
}
