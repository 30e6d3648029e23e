//! Request decoration applied by `SecuredApi` before each dispatch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::ApiError;
use crate::identity::IdentityProvider;

/// What to do with a request when the access token could not be refreshed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshFailurePolicy {
    /// Log the failure and send the request with whatever headers it already has.
    #[default]
    Proceed,
    /// Fail the request with `ApiError::TokenRefresh` without sending it.
    Reject,
}

#[async_trait]
pub trait RequestDecorator: Send + Sync {
    async fn decorate(&self, request: &mut Request) -> Result<(), ApiError>;
}

/// Attaches the identity session's access token, refreshing it first when it
/// expires within `min_validity`.
pub struct BearerAuth {
    provider: Arc<dyn IdentityProvider>,
    min_validity: Duration,
    policy: RefreshFailurePolicy,
}

impl BearerAuth {
    pub fn new(provider: Arc<dyn IdentityProvider>, min_validity: Duration, policy: RefreshFailurePolicy) -> Self {
        Self {
            provider,
            min_validity,
            policy,
        }
    }
}

#[async_trait]
impl RequestDecorator for BearerAuth {
    async fn decorate(&self, request: &mut Request) -> Result<(), ApiError> {
        if !self.provider.is_authenticated() {
            return Ok(());
        }

        match self.provider.update_token(self.min_validity).await {
            Ok(refreshed) => {
                if refreshed {
                    debug!("Access token refreshed before request");
                }
                let Some(token) = self.provider.token() else {
                    return Ok(());
                };
                match HeaderValue::from_str(&format!("Bearer {}", token)) {
                    Ok(mut value) => {
                        value.set_sensitive(true);
                        request.headers_mut().insert(AUTHORIZATION, value);
                    }
                    Err(e) => warn!(error = %e, "Access token is not a valid header value"),
                }
                Ok(())
            }
            Err(e) => match self.policy {
                RefreshFailurePolicy::Proceed => {
                    error!(error = %e, "Failed to update access token. User may need to re-authenticate.");
                    Ok(())
                }
                RefreshFailurePolicy::Reject => Err(ApiError::TokenRefresh(e)),
            },
        }
    }
}
