//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: where the
//! identity provider lives, which realm and client to use, and where the API is.
//!
//! Configuration is stored at `~/.config/t-hub/config.json`. Every field has a
//! production default, and `THUB_*` environment variables override the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::api::RefreshFailurePolicy;

// ============================================================================
// Constants
// ============================================================================

/// Application name used for config/cache directory paths
const APP_NAME: &str = "t-hub";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_IDENTITY_URL: &str = "https://keycloak.ltu-m7011e-4.se";
const DEFAULT_REALM: &str = "master";
const DEFAULT_CLIENT_ID: &str = "t-hub-frontend";
const DEFAULT_API_BASE_URL: &str = "https://api.ltu-m7011e-4.se";
const DEFAULT_REDIRECT_URI: &str = "https://t-hub.ltu-m7011e-4.se/";

/// HTTP request timeout in seconds for API calls.
pub(crate) const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Tokens expiring within this many seconds are refreshed before use.
const DEFAULT_TOKEN_MIN_VALIDITY_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub identity_url: String,
    pub realm: String,
    pub client_id: String,
    pub api_base_url: String,
    pub redirect_uri: String,
    pub request_timeout_secs: u64,
    pub token_min_validity_secs: u64,
    pub refresh_failure_policy: RefreshFailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            realm: DEFAULT_REALM.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_min_validity_secs: DEFAULT_TOKEN_MIN_VALIDITY_SECS,
            refresh_failure_policy: RefreshFailurePolicy::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Override fields from `THUB_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("THUB_IDENTITY_URL") {
            self.identity_url = v;
        }
        if let Some(v) = var("THUB_REALM") {
            self.realm = v;
        }
        if let Some(v) = var("THUB_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = var("THUB_API_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = var("THUB_REDIRECT_URI") {
            self.redirect_uri = v;
        }
        if let Some(v) = var("THUB_REQUEST_TIMEOUT_SECS") {
            match v.parse() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(e) => warn!(value = %v, error = %e, "Ignoring invalid THUB_REQUEST_TIMEOUT_SECS"),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted session for this realm and client.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(&self.realm).join(&self.client_id))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_min_validity(&self) -> Duration {
        Duration::from_secs(self.token_min_validity_secs)
    }

    /// Whether the redirect URI counts as a secure context: served over https,
    /// or over plain http from a loopback host.
    pub fn is_secure_context(&self) -> bool {
        is_secure_origin(&self.redirect_uri)
    }
}

fn is_secure_origin(uri: &str) -> bool {
    let Ok(url) = Url::parse(uri) else {
        return false;
    };
    match url.scheme() {
        "https" => true,
        "http" => match url.host() {
            Some(url::Host::Domain(host)) => {
                host.eq_ignore_ascii_case("localhost") || host.to_ascii_lowercase().ends_with(".localhost")
            }
            Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.realm, "master");
        assert_eq!(config.client_id, "t-hub-frontend");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.token_min_validity(), Duration::from_secs(5));
        assert_eq!(config.refresh_failure_policy, RefreshFailurePolicy::Proceed);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{"realm": "t-hub"}"#)
            .expect("Failed to parse partial config");
        assert_eq!(config.realm, "t-hub");
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("THUB_REALM", "staging"),
            ("THUB_API_URL", "http://localhost:8080"),
            ("THUB_REQUEST_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.realm, "staging");
        assert_eq!(config.api_base_url, "http://localhost:8080");
        // invalid number is ignored
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.identity_url, DEFAULT_IDENTITY_URL);
    }

    #[test]
    fn test_secure_context() {
        assert!(is_secure_origin("https://t-hub.ltu-m7011e-4.se/"));
        assert!(is_secure_origin("http://localhost:5173/"));
        assert!(is_secure_origin("http://app.localhost/"));
        assert!(is_secure_origin("http://127.0.0.1:3000/callback"));
        assert!(is_secure_origin("http://[::1]:3000/"));

        assert!(!is_secure_origin("http://t-hub.ltu-m7011e-4.se/"));
        assert!(!is_secure_origin("http://192.168.1.20:8080/"));
        assert!(!is_secure_origin("not a url"));
    }
}
