//! Application start-up: restore the identity session, then mount the app.

use std::sync::Arc;

use tracing::{error, info};

use crate::identity::{IdentityProvider, InitOptions};

/// Run one silent-login attempt against `provider`, then hand the session to
/// `mount`. The app is mounted exactly once whatever the outcome of `init`;
/// an initialisation failure is logged and the app starts unauthenticated.
pub async fn bootstrap<P, F, R>(provider: Arc<P>, options: &InitOptions, mount: F) -> R
where
    P: IdentityProvider + ?Sized,
    F: FnOnce(Arc<P>) -> R,
{
    match provider.init(options).await {
        Ok(authenticated) => info!(authenticated, "Identity session initialised"),
        Err(e) => error!(error = %e, "Identity provider initialisation failed"),
    }
    mount(provider)
}
