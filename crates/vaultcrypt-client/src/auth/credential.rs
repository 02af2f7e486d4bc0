//! Credential trait and simple implementations.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use vaultcrypt_core::SecretValue;

use crate::endpoint::InsecureEndpoint;

/// Errors from token acquisition. Raw authority responses are never exposed.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("network error communicating with the token authority")]
    Network(#[source] reqwest::Error),

    #[error("client credentials rejected by the token authority (check client id, secret and tenant)")]
    InvalidClient,

    #[error("invalid tenant id '{0}'")]
    InvalidTenant(String),

    #[error("token authority rate limit exceeded")]
    RateLimited,

    #[error("token authority server error")]
    ServerError,

    #[error("unexpected token authority response: status {0}")]
    UnexpectedStatus(u16),

    #[error("malformed token response: {0}")]
    MalformedResponse(&'static str),

    #[error(transparent)]
    InsecureEndpoint(#[from] InsecureEndpoint),
}

/// A bearer token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub secret: SecretValue,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn new(secret: SecretValue, expires_in: Duration) -> Self {
        Self {
            secret,
            expires_at: Instant::now() + expires_in,
        }
    }

    /// Like [`new`](Self::new), but `None` when `expires_in` overflows the clock.
    pub fn try_new(secret: SecretValue, expires_in: Duration) -> Option<Self> {
        let expires_at = Instant::now().checked_add(expires_in)?;
        Some(Self { secret, expires_at })
    }

    /// True when the token expires within `margin` from now.
    pub fn is_expiring(&self, margin: Duration) -> bool {
        Instant::now() + margin >= self.expires_at
    }

    /// Token text for the `Authorization` header.
    pub fn bearer(&self) -> &str {
        self.secret.as_str().unwrap_or_default()
    }
}

pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken, AuthError>> + Send + 'a>>;

/// Source of bearer tokens scoped to Key Vault.
///
/// Implementations must be safe to call concurrently.
pub trait TokenCredential: Send + Sync + fmt::Debug {
    fn get_token(&self) -> TokenFuture<'_>;
}

impl<T: TokenCredential + ?Sized> TokenCredential for Arc<T> {
    fn get_token(&self) -> TokenFuture<'_> {
        (**self).get_token()
    }
}

/// A credential that always returns the same token.
///
/// Useful for pre-issued tokens (e.g. `az account get-access-token`) and tests.
pub struct StaticTokenCredential {
    token: SecretValue,
}

impl StaticTokenCredential {
    /// Lifetime reported for the static token.
    const LIFETIME: Duration = Duration::from_secs(3600);

    pub fn new(token: impl Into<SecretValue>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenCredential").finish_non_exhaustive()
    }
}

impl TokenCredential for StaticTokenCredential {
    fn get_token(&self) -> TokenFuture<'_> {
        let token = AccessToken::new(self.token.clone(), Self::LIFETIME);
        Box::pin(async move { Ok(token) })
    }
}
