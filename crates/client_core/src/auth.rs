//! Identity-provider seam: authentication state, bearer tokens, login/logout hand-off.

use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::AuthError;

#[async_trait]
pub trait AuthGateway: Send + Sync {
    fn is_authenticated(&self) -> bool;

    /// True while the identity provider is still restoring a session.
    fn is_loading(&self) -> bool {
        false
    }

    async fn access_token(&self) -> Result<String, AuthError>;

    /// Starts the provider's login redirect.
    async fn login(&self);

    async fn logout(&self);
}

/// Visitor without an account: every gated call is refused.
pub struct AnonymousAuth;

#[async_trait]
impl AuthGateway for AnonymousAuth {
    fn is_authenticated(&self) -> bool {
        false
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        Err(AuthError::NotAuthenticated)
    }

    async fn login(&self) {
        info!("auth: login requested without an identity provider");
    }

    async fn logout(&self) {}
}

/// Pre-issued bearer token, e.g. from configuration.
pub struct StaticTokenAuth {
    token: RwLock<Option<String>>,
}

impl StaticTokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        Self {
            token: RwLock::new(token),
        }
    }

    fn current(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuthGateway for StaticTokenAuth {
    fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        self.current().ok_or(AuthError::NotAuthenticated)
    }

    async fn login(&self) {
        warn!("auth: login redirect requested; supply a fresh access token to continue");
    }

    async fn logout(&self) {
        let mut guard = match self.token.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
        info!("auth: static token discarded");
    }
}
