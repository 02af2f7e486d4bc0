//! Bearer-token credentials for Key Vault.
//!
//! The vault client only needs something that hands out bearer tokens; how
//! they are obtained is behind [`TokenCredential`].

pub mod client_secret;
pub mod credential;

pub use client_secret::ClientSecretCredential;
pub use credential::{AccessToken, AuthError, StaticTokenCredential, TokenCredential, TokenFuture};

/// OAuth2 scope granting access to Key Vault data-plane operations.
pub const VAULT_SCOPE: &str = "https://vault.azure.net/.default";
