//! API client for the t-hub backend.
//!
//! `SecuredApi` is built once with its base URL, timeout and decorators and
//! can then be cloned freely; clones share the connection pool.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{ApiError, BearerAuth, RefreshFailurePolicy, RequestDecorator};
use crate::config::{Config, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::identity::IdentityProvider;

/// API client with a fixed base URL whose requests are decorated before dispatch.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SecuredApi {
    client: Client,
    base_url: String,
    decorators: Arc<[Arc<dyn RequestDecorator>]>,
}

pub struct SecuredApiBuilder {
    base_url: String,
    timeout: Duration,
    decorators: Vec<Arc<dyn RequestDecorator>>,
}

impl SecuredApiBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Append a decorator; decorators run in the order they were added.
    pub fn decorator(mut self, decorator: Arc<dyn RequestDecorator>) -> Self {
        self.decorators.push(decorator);
        self
    }

    pub fn bearer_auth(
        self,
        provider: Arc<dyn IdentityProvider>,
        min_validity: Duration,
        policy: RefreshFailurePolicy,
    ) -> Self {
        self.decorator(Arc::new(BearerAuth::new(provider, min_validity, policy)))
    }

    pub fn build(self) -> Result<SecuredApi, ApiError> {
        url::Url::parse(&self.base_url)
            .map_err(|e| ApiError::Configuration(format!("invalid base URL {}: {}", self.base_url, e)))?;

        let client = Client::builder().timeout(self.timeout).build()?;

        Ok(SecuredApi {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            decorators: self.decorators.into(),
        })
    }
}

impl SecuredApi {
    pub fn builder(base_url: impl Into<String>) -> SecuredApiBuilder {
        SecuredApiBuilder {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            decorators: Vec::new(),
        }
    }

    /// Create the application's API client, authenticated through `provider`.
    pub fn new(config: &Config, provider: Arc<dyn IdentityProvider>) -> Result<Self, ApiError> {
        Self::builder(config.api_base_url.clone())
            .timeout(config.request_timeout())
            .bearer_auth(provider, config.token_min_validity(), config.refresh_failure_policy)
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request relative to the base URL. Send it with [`SecuredApi::send`].
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Decorate and dispatch a request.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let mut request = builder.build()?;
        for decorator in self.decorators.iter() {
            decorator.decorate(&mut request).await?;
        }
        debug!(method = %request.method(), url = %request.url(), "Sending request");
        Ok(self.client.execute(request).await?)
    }

    /// Check if response is successful, returning an error with body if not.
    pub async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = Self::check_response(self.send(builder).await?).await?;
        let url = response.url().to_string();
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e)))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.json(self.request(Method::GET, path)).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.json(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.json(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self.send(self.request(Method::DELETE, path)).await?;
        Self::check_response(response).await?;
        Ok(())
    }
}
