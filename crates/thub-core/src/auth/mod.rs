//! Authentication module for the client-side identity session.
//!
//! This module provides:
//! - `Session`: persisted OIDC tokens, restored on startup for silent login
//! - `PkceChallenge`: code verifier/challenge pairs for the authorization-code flow
//!
//! Sessions are stored per realm and client in the cache directory.

pub mod pkce;
pub mod session;

pub use pkce::{PkceChallenge, PkceMethod};
pub use session::{Session, SessionData, TokenResponse};
