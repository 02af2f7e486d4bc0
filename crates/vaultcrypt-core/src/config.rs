//! Azure configuration.
//!
//! Settings are read from the environment exactly once, at startup, into an
//! [`AzureConfig`] that is then passed by value to whatever needs it. Nothing
//! below this module reads process-wide state.

use crate::algorithm::{EncryptionAlgorithm, UnknownAlgorithm};
use crate::secret::SecretValue;

pub const CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "AZURE_CLIENT_SECRET";
pub const TENANT_ID_ENV: &str = "AZURE_TENANT_ID";
pub const KEY_IDENTIFIER_ENV: &str = "AZURE_KEY_VAULT_KEY_IDENTIFIER";

/// Optional. Carried for parity with other Azure tooling; not used for key operations.
pub const SUBSCRIPTION_ID_ENV: &str = "AZURE_SUBSCRIPTION_ID";

/// Optional override of the Microsoft Entra ID authority.
pub const AUTHORITY_HOST_ENV: &str = "AZURE_AUTHORITY_HOST";

/// Optional override of the encryption algorithm.
pub const ALGORITHM_ENV: &str = "VAULTCRYPT_ALGORITHM";

/// Default token authority for the public cloud.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Configuration errors. Both are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("expected env var not provided: {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Everything needed to authenticate and address one vault key.
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub client_id: String,
    pub client_secret: SecretValue,
    pub tenant_id: String,
    pub subscription_id: Option<String>,
    /// Unparsed key identifier URL; parsed when the encryption client is built.
    pub key_identifier: String,
    pub authority_host: String,
    pub algorithm: EncryptionAlgorithm,
}

impl AzureConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// Values that are empty or whitespace-only count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let client_id = require(CLIENT_ID_ENV)?;
        let client_secret = SecretValue::from_string(require(CLIENT_SECRET_ENV)?);
        let tenant_id = require(TENANT_ID_ENV)?;
        let key_identifier = require(KEY_IDENTIFIER_ENV)?;

        let authority_host = match get(AUTHORITY_HOST_ENV) {
            Some(host) => {
                if !host.starts_with("https://") {
                    return Err(ConfigError::Invalid {
                        var: AUTHORITY_HOST_ENV,
                        reason: "authority host must use https://".into(),
                    });
                }
                host.trim_end_matches('/').to_owned()
            }
            None => DEFAULT_AUTHORITY_HOST.to_owned(),
        };

        let algorithm = match get(ALGORITHM_ENV) {
            Some(name) => {
                name.parse::<EncryptionAlgorithm>()
                    .map_err(|e: UnknownAlgorithm| ConfigError::Invalid {
                        var: ALGORITHM_ENV,
                        reason: e.to_string(),
                    })?
            }
            None => EncryptionAlgorithm::default(),
        };

        Ok(Self {
            client_id,
            client_secret,
            tenant_id,
            subscription_id: get(SUBSCRIPTION_ID_ENV),
            key_identifier,
            authority_host,
            algorithm,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
