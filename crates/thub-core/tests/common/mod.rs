//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use thub_core::{Config, KeycloakClient, Session, SessionData};

pub const TOKEN_PATH: &str = "/realms/master/protocol/openid-connect/token";
pub const LOGOUT_PATH: &str = "/realms/master/protocol/openid-connect/logout";

pub fn config(identity_url: &str) -> Config {
    Config {
        identity_url: identity_url.to_string(),
        ..Config::default()
    }
}

/// Session whose access token expires in `expires_in_secs`, with a live refresh token
pub fn session_data(access_token: &str, expires_in_secs: i64) -> SessionData {
    let now = Utc::now();
    SessionData {
        access_token: access_token.to_string(),
        refresh_token: Some("refresh-1".to_string()),
        id_token: None,
        expires_at: now + Duration::seconds(expires_in_secs),
        refresh_expires_at: Some(now + Duration::minutes(30)),
        created_at: now,
    }
}

pub fn save_session(dir: &Path, data: SessionData) {
    let mut session = Session::new(dir.to_path_buf());
    session.update(data);
    session.save().expect("Failed to save session");
}

pub fn load_session(dir: &Path) -> Option<SessionData> {
    let mut session = Session::new(dir.to_path_buf());
    session.load().expect("Failed to load session");
    session.data
}

pub fn keycloak(config: &Config, dir: &Path) -> Arc<KeycloakClient> {
    Arc::new(KeycloakClient::new(config, Session::new(dir.to_path_buf())).expect("Failed to create client"))
}

pub fn token_body(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "expires_in": 300,
        "refresh_expires_in": 1800,
        "refresh_token": "refresh-2",
        "token_type": "Bearer",
        "id_token": "id-token",
        "scope": "openid"
    })
}
