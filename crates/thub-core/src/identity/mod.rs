//! Identity-provider client for the OIDC session.
//!
//! `IdentityProvider` is the session handle the rest of the crate works with:
//! it is created once at startup, initialised by the bootstrapper, and then
//! shared (behind an `Arc`) with every authenticated API client.
//! `KeycloakClient` is the implementation that talks to a Keycloak realm.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::auth::PkceMethod;

pub mod error;
pub mod keycloak;

pub use error::AuthError;
pub use keycloak::{KeycloakClient, LoginRequest};

/// What `init` does when no session can be restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnLoad {
    /// Restore a session silently if there is one, never prompt.
    CheckSso,
    /// Fail initialisation when no session can be restored.
    LoginRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    pub on_load: OnLoad,
    pub check_login_iframe: bool,
    pub pkce_method: Option<PkceMethod>,
}

impl InitOptions {
    /// Options used at application start: silent check, no session polling,
    /// and PKCE only when running in a secure context.
    pub fn for_context(secure_context: bool) -> Self {
        let pkce_method = if secure_context {
            Some(PkceMethod::S256)
        } else {
            warn!("Not a secure context (no HTTPS / localhost). Disabling PKCE.");
            None
        };
        Self {
            on_load: OnLoad::CheckSso,
            check_login_iframe: false,
            pkce_method,
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Try to restore a session. Resolves to whether the user is authenticated.
    async fn init(&self, options: &InitOptions) -> Result<bool, AuthError>;

    fn is_authenticated(&self) -> bool;

    /// Current access token, if any.
    fn token(&self) -> Option<String>;

    /// Refresh the access token if it expires within `min_validity`.
    /// Returns `true` if a refresh took place.
    async fn update_token(&self, min_validity: Duration) -> Result<bool, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_context_enables_pkce() {
        let options = InitOptions::for_context(true);
        assert_eq!(options.on_load, OnLoad::CheckSso);
        assert!(!options.check_login_iframe);
        assert_eq!(options.pkce_method, Some(PkceMethod::S256));
    }

    #[test]
    fn test_insecure_context_omits_pkce() {
        let options = InitOptions::for_context(false);
        assert_eq!(options.on_load, OnLoad::CheckSso);
        assert!(!options.check_login_iframe);
        assert_eq!(options.pkce_method, None);
    }
}
