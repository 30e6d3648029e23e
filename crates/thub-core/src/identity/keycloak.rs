//! Keycloak realm client.
//!
//! Speaks the OpenID Connect endpoints of a single realm:
//! `{identity_url}/realms/{realm}/protocol/openid-connect/{auth,token,logout}`.
//! The session is kept in memory and mirrored to the cache directory so the
//! next start can restore it without user interaction.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::{AuthError, IdentityProvider, InitOptions, OnLoad};
use crate::auth::pkce::random_state;
use crate::auth::{PkceChallenge, PkceMethod, Session, SessionData, TokenResponse};
use crate::config::Config;

/// OAuth scope requested at login
const LOGIN_SCOPE: &str = "openid";

#[derive(Debug, Clone)]
struct Endpoints {
    authorization: Url,
    token: Url,
    logout: Url,
}

impl Endpoints {
    fn for_realm(identity_url: &str, realm: &str) -> Result<Self, AuthError> {
        let base = Url::parse(identity_url)
            .map_err(|e| AuthError::Configuration(format!("{identity_url}: {e}")))?;
        let endpoint = |name: &str| -> Result<Url, AuthError> {
            let mut url = base.clone();
            url.path_segments_mut()
                .map_err(|_| AuthError::Configuration(format!("{identity_url} cannot be a base URL")))?
                .pop_if_empty()
                .extend(["realms", realm, "protocol", "openid-connect", name]);
            Ok(url)
        };
        Ok(Self {
            authorization: endpoint("auth")?,
            token: endpoint("token")?,
            logout: endpoint("logout")?,
        })
    }
}

/// An authorization-code login in progress.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Where to send the user to sign in.
    pub url: Url,
    pub state: String,
    pub nonce: String,
    pub pkce: Option<PkceChallenge>,
}

pub struct KeycloakClient {
    http: Client,
    endpoints: Endpoints,
    client_id: String,
    redirect_uri: String,
    session: RwLock<Session>,
    pkce_method: RwLock<Option<PkceMethod>>,
    /// Held for the duration of a refresh round-trip so concurrent callers share it.
    refresh_lock: Mutex<()>,
}

impl KeycloakClient {
    /// Create a client for the configured realm, persisting into `session`'s directory.
    pub fn new(config: &Config, session: Session) -> Result<Self, AuthError> {
        let endpoints = Endpoints::for_realm(&config.identity_url, &config.realm)?;
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            endpoints,
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            session: RwLock::new(session),
            pkce_method: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn pkce_method(&self) -> Option<PkceMethod> {
        *self.pkce_method.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current session, if any
    pub fn session_data(&self) -> Option<SessionData> {
        self.read_session().data.clone()
    }

    fn store(&self, tokens: TokenResponse) -> Result<(), AuthError> {
        let data = SessionData::from_token_response(tokens, Utc::now())?;
        let mut session = self.write_session();
        session.update(data);
        if let Err(e) = session.save() {
            warn!(error = %e, "Failed to persist session");
        }
        Ok(())
    }

    fn clear_session(&self) {
        if let Err(e) = self.write_session().clear() {
            warn!(error = %e, "Failed to remove persisted session");
        }
    }

    async fn token_response(response: reqwest::Response) -> Result<TokenResponse, AuthError> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::from_status(status, &body))
        }
    }

    /// Exchange the refresh token for a new token set.
    /// A rejected refresh token ends the session.
    async fn refresh(&self) -> Result<(), AuthError> {
        let refresh_token = self
            .read_session()
            .data
            .as_ref()
            .filter(|d| d.can_refresh())
            .and_then(|d| d.refresh_token.clone())
            .ok_or(AuthError::NoRefreshToken)?;

        debug!("Refreshing access token");
        let response = self
            .http
            .post(self.endpoints.token.clone())
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;

        match Self::token_response(response).await {
            Ok(tokens) => {
                self.store(tokens)?;
                debug!("Access token refreshed");
                Ok(())
            }
            Err(e @ AuthError::InvalidGrant(_)) => {
                info!(error = %e, "Refresh token rejected, ending session");
                self.clear_session();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn needs_refresh(&self, min_validity: Duration) -> Result<bool, AuthError> {
        let session = self.read_session();
        let data = session.data.as_ref().ok_or(AuthError::NotAuthenticated)?;
        Ok(data.needs_refresh(min_validity))
    }

    /// Build the authorization URL for an interactive login.
    pub fn create_login_url(&self) -> LoginRequest {
        let state = random_state();
        let nonce = random_state();
        let pkce = self.pkce_method().map(|_| PkceChallenge::generate());

        let mut url = self.endpoints.authorization.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", LOGIN_SCOPE)
                .append_pair("state", &state)
                .append_pair("nonce", &nonce);
            if let Some(ref pkce) = pkce {
                query
                    .append_pair("code_challenge", &pkce.challenge)
                    .append_pair("code_challenge_method", pkce.method.as_str());
            }
        }

        LoginRequest {
            url,
            state,
            nonce,
            pkce,
        }
    }

    /// Finish a login from the URL the provider redirected back to.
    pub async fn complete_login(&self, request: &LoginRequest, callback_url: &str) -> Result<(), AuthError> {
        let callback = Url::parse(callback_url)
            .map_err(|e| AuthError::InvalidCallback(e.to_string()))?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut error_description = None;
        for (key, value) in callback.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => error_description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            let detail = match error_description {
                Some(desc) => format!("{error}: {desc}"),
                None => error,
            };
            return Err(AuthError::InvalidCallback(detail));
        }
        if state.as_deref() != Some(request.state.as_str()) {
            return Err(AuthError::StateMismatch);
        }
        let code = code.ok_or_else(|| AuthError::InvalidCallback("missing code".to_string()))?;

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        if let Some(ref pkce) = request.pkce {
            form.push(("code_verifier", pkce.verifier.as_str()));
        }

        let response = self
            .http
            .post(self.endpoints.token.clone())
            .form(&form)
            .send()
            .await?;
        let tokens = Self::token_response(response).await?;
        self.store(tokens)?;
        info!("Login successful");
        Ok(())
    }

    /// End the session at the provider and forget it locally.
    pub async fn logout(&self) {
        let refresh_token = self.read_session().data.as_ref().and_then(|d| d.refresh_token.clone());

        if let Some(refresh_token) = refresh_token {
            let result = self
                .http
                .post(self.endpoints.logout.clone())
                .form(&[
                    ("client_id", self.client_id.as_str()),
                    ("refresh_token", refresh_token.as_str()),
                ])
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
            }
        }

        self.clear_session();
        info!("Logged out");
    }
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    async fn init(&self, options: &InitOptions) -> Result<bool, AuthError> {
        if options.check_login_iframe {
            warn!("Login iframe session polling is not supported, ignoring");
        }
        *self.pkce_method.write().unwrap_or_else(PoisonError::into_inner) = options.pkce_method;

        let restored = self
            .write_session()
            .load()
            .map_err(|e| AuthError::Storage(format!("{e:#}")))?;

        if restored {
            let expired = self.read_session().data.as_ref().map(|d| d.is_expired()).unwrap_or(true);
            if !expired {
                debug!("Restored session with a valid access token");
                return Ok(true);
            }
            match self.refresh().await {
                Ok(()) => return Ok(true),
                Err(AuthError::InvalidGrant(reason)) => {
                    debug!(%reason, "Stored session is no longer active");
                }
                Err(e) => {
                    // keep the file so the next start can retry the refresh
                    self.write_session().data = None;
                    return Err(e);
                }
            }
        }

        match options.on_load {
            OnLoad::CheckSso => Ok(false),
            OnLoad::LoginRequired => Err(AuthError::LoginRequired),
        }
    }

    fn is_authenticated(&self) -> bool {
        self.read_session().data.is_some()
    }

    fn token(&self) -> Option<String> {
        self.read_session().token().map(str::to_string)
    }

    async fn update_token(&self, min_validity: Duration) -> Result<bool, AuthError> {
        if !self.needs_refresh(min_validity)? {
            return Ok(false);
        }

        let _guard = self.refresh_lock.lock().await;
        // another caller may have refreshed while we waited
        if !self.needs_refresh(min_validity)? {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }
}
