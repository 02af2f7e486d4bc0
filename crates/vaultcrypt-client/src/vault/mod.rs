//! Azure Key Vault key-operation connector.
//!
//! Exposes the two data-plane RPCs the encryption client needs. Results are
//! opaque service strings; base64 shaping happens in [`crate::encryption`].

pub mod client;

pub use client::{API_VERSION, KeyOperation, KeyOperationResult, KeyVaultClient, VaultApiError};
