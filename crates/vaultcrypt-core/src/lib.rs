//! Core types for vaultcrypt: key identifiers, algorithms, configuration,
//! and secret handling. Nothing in this crate performs I/O beyond reading the
//! environment in [`config::AzureConfig::from_env`].

pub mod algorithm;
pub mod config;
pub mod identifier;
pub mod secret;

pub use algorithm::EncryptionAlgorithm;
pub use config::{AzureConfig, ConfigError};
pub use identifier::{IdentifierError, KeyIdentifier};
pub use secret::SecretValue;
