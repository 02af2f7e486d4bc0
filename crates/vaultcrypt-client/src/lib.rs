//! Azure Key Vault client for vaultcrypt.
//!
//! - [`auth`]: bearer-token credentials (client-secret OAuth2 flow, static tokens)
//! - [`vault`]: REST client for the key `encrypt`/`decrypt` operations
//! - [`encryption`]: [`EncryptionClient`], the base64 request shaping on top
//!
//! **Never** surfaces raw service error bodies or token material; every
//! failure is mapped to a sanitized error variant.

pub mod auth;
pub mod encryption;
mod endpoint;
pub mod vault;

pub use auth::{AccessToken, AuthError, ClientSecretCredential, StaticTokenCredential, TokenCredential};
pub use encryption::{BuildError, EncryptionClient, EncryptionError, KeyOperations};
pub use endpoint::InsecureEndpoint;
pub use vault::{KeyOperation, KeyOperationResult, KeyVaultClient, VaultApiError};

/// User-agent sent on every request.
pub(crate) fn user_agent() -> String {
    format!("vaultcrypt/{}", env!("CARGO_PKG_VERSION"))
}

/// Timeout applied to every HTTP request.
pub(crate) const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
