//! Encryption client: base64 request shaping over remote key operations.
//!
//! Plaintext is base64url-encoded (unpadded) before it is sent to the vault
//! and the decrypt result is decoded the same way. The ciphertext token is
//! whatever string the service returns; it is passed back to decrypt verbatim.
//! Every non-empty call is one round trip: results are never cached.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use tracing::debug;
use vaultcrypt_core::{AzureConfig, EncryptionAlgorithm, IdentifierError, KeyIdentifier};

use crate::auth::{AuthError, ClientSecretCredential, TokenCredential};
use crate::vault::{KeyOperation, KeyVaultClient, VaultApiError};

pub type OperationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, VaultApiError>> + Send + 'a>>;

/// Transport for remote key operations.
///
/// Implementations return the `value` of the service result. [`KeyVaultClient`]
/// is the production implementation; tests substitute in-memory fakes.
pub trait KeyOperations: Send + Sync {
    fn apply<'a>(
        &'a self,
        key: &'a KeyIdentifier,
        op: KeyOperation,
        alg: EncryptionAlgorithm,
        value: &'a str,
    ) -> OperationFuture<'a>;
}

impl<T: KeyOperations + ?Sized> KeyOperations for Arc<T> {
    fn apply<'a>(
        &'a self,
        key: &'a KeyIdentifier,
        op: KeyOperation,
        alg: EncryptionAlgorithm,
        value: &'a str,
    ) -> OperationFuture<'a> {
        (**self).apply(key, op, alg, value)
    }
}

/// Errors from encrypt/decrypt calls.
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("remote key operation failed")]
    RemoteOperationFailed(#[from] VaultApiError),

    #[error("malformed base64 in decrypt result")]
    EncodingError(#[from] base64::DecodeError),

    #[error("ciphertext token is not valid UTF-8")]
    TokenNotUtf8,
}

/// Errors from building an [`EncryptionClient`] out of configuration.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    InvalidIdentifierFormat(#[from] IdentifierError),

    #[error("failed to set up credential")]
    Credential(#[from] AuthError),

    #[error("failed to set up Key Vault client")]
    Vault(#[from] VaultApiError),
}

/// Encrypts and decrypts payloads with one vault key.
///
/// Holds no mutable state; share it behind an `Arc` to use it from several
/// tasks at once.
#[derive(Debug, Clone)]
pub struct EncryptionClient<T = KeyVaultClient> {
    transport: T,
    key: KeyIdentifier,
    algorithm: EncryptionAlgorithm,
}

impl EncryptionClient<KeyVaultClient> {
    /// Build a client from configuration: parse the key identifier, set up the
    /// client-secret credential, and wire both into a [`KeyVaultClient`].
    pub fn from_config(config: &AzureConfig) -> Result<Self, BuildError> {
        let key = KeyIdentifier::parse(&config.key_identifier)?;
        let credential: Arc<dyn TokenCredential> =
            Arc::new(ClientSecretCredential::from_config(config)?);
        let transport = KeyVaultClient::new(credential)?;
        Ok(Self::new(transport, key, config.algorithm))
    }
}

impl<T: KeyOperations> EncryptionClient<T> {
    pub fn new(transport: T, key: KeyIdentifier, algorithm: EncryptionAlgorithm) -> Self {
        Self {
            transport,
            key,
            algorithm,
        }
    }

    pub fn key(&self) -> &KeyIdentifier {
        &self.key
    }

    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Encrypt `plaintext` and return the service's ciphertext token.
    ///
    /// Empty input returns an empty token without contacting the vault.
    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<String, EncryptionError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let encoded = BASE64URL.encode(plaintext);
        debug!(
            "encrypting {} bytes with {} ({})",
            plaintext.len(),
            self.key,
            self.algorithm
        );
        let token = self
            .transport
            .apply(&self.key, KeyOperation::Encrypt, self.algorithm, &encoded)
            .await?;
        Ok(token)
    }

    /// Decrypt a ciphertext token produced by [`encrypt`](Self::encrypt).
    ///
    /// An empty token returns empty bytes without contacting the vault.
    pub async fn decrypt(&self, token: &str) -> Result<Vec<u8>, EncryptionError> {
        if token.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            "decrypting {} token chars with {} ({})",
            token.len(),
            self.key,
            self.algorithm
        );
        let result = self
            .transport
            .apply(&self.key, KeyOperation::Decrypt, self.algorithm, token)
            .await?;
        Ok(BASE64URL.decode(result.as_bytes())?)
    }

    /// Like [`decrypt`](Self::decrypt), treating an absent token as empty.
    pub async fn decrypt_opt(&self, token: Option<&str>) -> Result<Vec<u8>, EncryptionError> {
        match token {
            Some(token) => self.decrypt(token).await,
            None => Ok(Vec::new()),
        }
    }

    /// Byte-oriented [`encrypt`](Self::encrypt): the token is returned as
    /// UTF-8 bytes.
    pub async fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        self.encrypt(plaintext).await.map(String::into_bytes)
    }

    /// Byte-oriented [`decrypt`](Self::decrypt). The token bytes must be UTF-8.
    pub async fn decrypt_bytes(&self, token: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let token = std::str::from_utf8(token).map_err(|_| EncryptionError::TokenNotUtf8)?;
        self.decrypt(token).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
