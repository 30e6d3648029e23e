//! t-hub client core.
//!
//! Restores the user's OpenID Connect session at start-up and provides an
//! API client that keeps the access token fresh and attaches it to every
//! request.
//!
//! ```no_run
//! use std::sync::Arc;
//! use thub_core::{bootstrap, Config, InitOptions, KeycloakClient, SecuredApi, Session};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let session = Session::new(config.cache_dir()?);
//! let keycloak = Arc::new(KeycloakClient::new(&config, session)?);
//! let options = InitOptions::for_context(config.is_secure_context());
//!
//! let api = bootstrap(keycloak, &options, |session| SecuredApi::new(&config, session)).await?;
//! let tournaments: serde_json::Value = api.get("/api/tournaments").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod identity;
pub mod utils;

pub use api::{ApiError, RefreshFailurePolicy, SecuredApi};
pub use auth::{Session, SessionData};
pub use bootstrap::bootstrap;
pub use config::Config;
pub use identity::{AuthError, IdentityProvider, InitOptions, KeycloakClient, OnLoad};
