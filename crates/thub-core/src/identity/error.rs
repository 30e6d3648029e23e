use thiserror::Error;

use crate::utils::truncate_body;

/// Maximum length for identity-provider response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("No refresh token available - login required")]
    NoRefreshToken,

    #[error("No session could be restored - login required")]
    LoginRequired,

    #[error("Refresh token rejected: {0}")]
    InvalidGrant(String),

    #[error("Identity provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Invalid login callback: {0}")]
    InvalidCallback(String),

    #[error("Login callback state does not match the login request")]
    StateMismatch,

    #[error("Invalid identity provider configuration: {0}")]
    Configuration(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

#[derive(serde::Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl AuthError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        if status == reqwest::StatusCode::BAD_REQUEST {
            if let Ok(err) = serde_json::from_str::<OAuthErrorBody>(body) {
                if err.error == "invalid_grant" {
                    return AuthError::InvalidGrant(err.error_description.unwrap_or(err.error));
                }
            }
        }
        AuthError::Provider {
            status: status.as_u16(),
            body: truncate_body(body, MAX_ERROR_BODY_LENGTH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_invalid_grant_is_recognised() {
        let body = r#"{"error":"invalid_grant","error_description":"Session not active"}"#;
        match AuthError::from_status(StatusCode::BAD_REQUEST, body) {
            AuthError::InvalidGrant(msg) => assert_eq!(msg, "Session not active"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_other_errors_keep_status_and_body() {
        let err = AuthError::from_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, AuthError::Provider { status: 502, ref body } if body == "upstream down"));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let AuthError::Provider { body, .. } = AuthError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body) else {
            panic!("expected provider error");
        };
        assert!(body.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(body.ends_with("(truncated, 2000 total bytes)"));
    }
}
