//! Key Vault REST client for key `encrypt`/`decrypt` operations.
//!
//! `POST {vault}/keys/{name}[/{version}]/{operation}?api-version=7.4` with a
//! `{"alg", "value"}` JSON body and a bearer token from the configured
//! [`TokenCredential`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vaultcrypt_core::{EncryptionAlgorithm, KeyIdentifier};

use crate::auth::{AuthError, TokenCredential};
use crate::encryption::{KeyOperations, OperationFuture};
use crate::endpoint::{InsecureEndpoint, validate_url_scheme};

/// Key Vault data-plane API version.
pub const API_VERSION: &str = "7.4";

/// Key Vault API error types. Raw API responses are never exposed.
#[derive(Debug, thiserror::Error)]
pub enum VaultApiError {
    #[error("network error communicating with Key Vault")]
    Network(#[source] reqwest::Error),

    #[error("failed to obtain access token")]
    Auth(#[from] AuthError),

    #[error("Key Vault authentication failed (check access policy or RBAC role)")]
    Unauthorized,

    #[error("Key Vault resource not found: {0}")]
    NotFound(String),

    #[error("Key Vault rate limit exceeded")]
    RateLimited,

    #[error("Key Vault server error")]
    ServerError,

    #[error("unexpected Key Vault response: status {0}")]
    UnexpectedStatus(u16),

    #[error("malformed Key Vault response")]
    MalformedResponse,

    #[error(transparent)]
    InsecureEndpoint(#[from] InsecureEndpoint),
}

impl VaultApiError {
    /// Returns `true` if the error is transient and the request may succeed on retry.
    ///
    /// Retrying is left to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VaultApiError::Network(_) | VaultApiError::RateLimited | VaultApiError::ServerError
        )
    }
}

/// The two key operations this client performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOperation {
    Encrypt,
    Decrypt,
}

impl KeyOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyOperation::Encrypt => "encrypt",
            KeyOperation::Decrypt => "decrypt",
        }
    }
}

/// Request body of `POST .../{encrypt|decrypt}`.
#[derive(Debug, Serialize)]
struct KeyOperationRequest<'a> {
    alg: EncryptionAlgorithm,
    value: &'a str,
}

/// Response from `POST .../{encrypt|decrypt}`.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyOperationResult {
    /// Full key id (including version) that performed the operation.
    #[serde(default)]
    pub kid: Option<String>,
    /// Base64url result: ciphertext for encrypt, plaintext for decrypt.
    pub value: String,
}

/// Key Vault REST API client.
///
/// Holds no per-key state; the key is passed on every call.
#[derive(Debug, Clone)]
pub struct KeyVaultClient {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    /// Replaces the identifier's vault URL when set.
    endpoint: Option<String>,
}

impl KeyVaultClient {
    pub fn new(credential: Arc<dyn TokenCredential>) -> Result<Self, VaultApiError> {
        let http = reqwest::Client::builder()
            .user_agent(crate::user_agent())
            .timeout(crate::REQUEST_TIMEOUT)
            .build()
            .map_err(VaultApiError::Network)?;

        Ok(Self {
            http,
            credential,
            endpoint: None,
        })
    }

    /// Send requests to `endpoint` instead of the vault named in the key
    /// identifier (private endpoints, emulators).
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, VaultApiError> {
        validate_url_scheme(endpoint)?;
        self.endpoint = Some(endpoint.trim_end_matches('/').to_owned());
        Ok(self)
    }

    fn operation_url(&self, key: &KeyIdentifier, op: KeyOperation) -> String {
        let base = self.endpoint.as_deref().unwrap_or(key.vault_base_url());
        let mut url = format!("{base}/keys/{}", key.key_name());
        if key.has_version() {
            url.push('/');
            url.push_str(key.key_version());
        }
        format!("{url}/{}?api-version={API_VERSION}", op.as_str())
    }

    /// Run a key operation and return the service's result.
    pub async fn key_operation(
        &self,
        key: &KeyIdentifier,
        op: KeyOperation,
        alg: EncryptionAlgorithm,
        value: &str,
    ) -> Result<KeyOperationResult, VaultApiError> {
        let token = self.credential.get_token().await?;
        let url = self.operation_url(key, op);
        debug!("POST {url} (alg={alg}, {} value chars)", value.len());

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token.bearer())
            .header("Accept", "application/json")
            .json(&KeyOperationRequest { alg, value })
            .send()
            .await
            .map_err(VaultApiError::Network)?;

        let status = resp.status().as_u16();
        if status != 200 {
            warn!("key {} on {key} failed: status {status}", op.as_str());
        }
        match status {
            200 => resp
                .json::<KeyOperationResult>()
                .await
                .map_err(|_| VaultApiError::MalformedResponse),
            401 | 403 => Err(VaultApiError::Unauthorized),
            404 => Err(VaultApiError::NotFound(format!("key '{key}'"))),
            429 => Err(VaultApiError::RateLimited),
            500..=599 => Err(VaultApiError::ServerError),
            other => Err(VaultApiError::UnexpectedStatus(other)),
        }
    }

    pub async fn encrypt(
        &self,
        key: &KeyIdentifier,
        alg: EncryptionAlgorithm,
        value: &str,
    ) -> Result<KeyOperationResult, VaultApiError> {
        self.key_operation(key, KeyOperation::Encrypt, alg, value).await
    }

    pub async fn decrypt(
        &self,
        key: &KeyIdentifier,
        alg: EncryptionAlgorithm,
        value: &str,
    ) -> Result<KeyOperationResult, VaultApiError> {
        self.key_operation(key, KeyOperation::Decrypt, alg, value).await
    }
}

impl KeyOperations for KeyVaultClient {
    fn apply<'a>(
        &'a self,
        key: &'a KeyIdentifier,
        op: KeyOperation,
        alg: EncryptionAlgorithm,
        value: &'a str,
    ) -> OperationFuture<'a> {
        Box::pin(async move {
            self.key_operation(key, op, alg, value)
                .await
                .map(|result| result.value)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
