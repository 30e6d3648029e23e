//! Authenticated REST API client for the t-hub backend.
//!
//! This module provides `SecuredApi`, an HTTP client with a fixed base URL
//! and timeout that decorates every outgoing request before dispatch. The
//! standard decoration is `BearerAuth`, which refreshes the access token when
//! it is about to expire and attaches it as `Authorization: Bearer <token>`.

pub mod client;
pub mod decorator;
pub mod error;

pub use client::{SecuredApi, SecuredApiBuilder};
pub use decorator::{BearerAuth, RefreshFailurePolicy, RequestDecorator};
pub use error::ApiError;
