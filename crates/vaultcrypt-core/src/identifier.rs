//! Key Vault key identifier parsing.
//!
//! A key identifier is the URL Azure Key Vault hands out for a key:
//! `https://{vault}.vault.azure.net/keys/{name}[/{version}]`. Parsing splits it
//! into the vault base URL, the key name, and the (optional) key version that
//! the REST API takes as separate path parameters.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Example identifier included in every parse error.
pub const EXAMPLE_IDENTIFIER: &str =
    "https://keyvaultname.vault.azure.net/keys/myKey/99d67321dd9841af859129cd5551a871";

/// DNS suffix of Key Vault hosts in the public cloud.
const VAULT_HOST_SUFFIX: &str = ".vault.azure.net";

/// Path prefix of key resources.
const KEYS_SEGMENT: &str = "keys/";

/// Accepted schemes. `http://` is normalised to `https://`.
const SCHEMES: [&str; 2] = ["https://", "http://"];

/// Errors returned by [`KeyIdentifier::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error(
        "invalid key identifier '{input}': {reason}. \
         Expected a key identifier from Key Vault, e.g.: {}",
        EXAMPLE_IDENTIFIER
    )]
    InvalidFormat { input: String, reason: &'static str },
}

impl IdentifierError {
    fn invalid(input: &str, reason: &'static str) -> Self {
        Self::InvalidFormat {
            input: input.to_owned(),
            reason,
        }
    }

    /// The string that failed to parse.
    pub fn input(&self) -> &str {
        match self {
            Self::InvalidFormat { input, .. } => input,
        }
    }

    /// A well-formed identifier to show the caller.
    pub fn example(&self) -> &'static str {
        EXAMPLE_IDENTIFIER
    }
}

/// A parsed Key Vault key identifier.
///
/// `vault_base_url` is always `https://{name}.vault.azure.net` with no trailing
/// slash. `key_version` is empty when the identifier names the current version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct KeyIdentifier {
    vault_base_url: String,
    key_name: String,
    key_version: String,
}

impl KeyIdentifier {
    /// Parse a key identifier URL.
    pub fn parse(input: &str) -> Result<Self, IdentifierError> {
        let rest = strip_scheme(input)
            .ok_or_else(|| IdentifierError::invalid(input, "missing https:// scheme"))?;

        let (host, path) = rest
            .split_once('/')
            .ok_or_else(|| IdentifierError::invalid(input, "missing '/keys/' path segment"))?;

        let vault_name = strip_suffix_ignore_case(host, VAULT_HOST_SUFFIX).ok_or_else(|| {
            IdentifierError::invalid(input, "host must end with '.vault.azure.net'")
        })?;
        if vault_name.is_empty() {
            return Err(IdentifierError::invalid(input, "empty vault name"));
        }
        if !vault_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(IdentifierError::invalid(
                input,
                "vault name may only contain letters, digits and '-'",
            ));
        }

        if path.contains(['?', '#']) {
            return Err(IdentifierError::invalid(
                input,
                "query strings and fragments are not allowed",
            ));
        }

        let key_path = path
            .strip_prefix(KEYS_SEGMENT)
            .ok_or_else(|| IdentifierError::invalid(input, "missing '/keys/' path segment"))?;
        let key_path = key_path.strip_suffix('/').unwrap_or(key_path);

        let mut segments = key_path.split('/');
        let key_name = segments.next().unwrap_or_default();
        let key_version = segments.next().unwrap_or_default();
        if segments.next().is_some() {
            return Err(IdentifierError::invalid(
                input,
                "unexpected path segments after key version",
            ));
        }

        if key_name.is_empty() {
            return Err(IdentifierError::invalid(input, "empty key name"));
        }
        if !key_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(IdentifierError::invalid(
                input,
                "key name may only contain letters, digits and '-'",
            ));
        }
        if key_path.contains('/') && key_version.is_empty() {
            return Err(IdentifierError::invalid(input, "empty key version segment"));
        }
        if !key_version.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdentifierError::invalid(
                input,
                "key version may only contain letters and digits",
            ));
        }

        Ok(Self {
            vault_base_url: format!(
                "https://{}{VAULT_HOST_SUFFIX}",
                vault_name.to_ascii_lowercase()
            ),
            key_name: key_name.to_owned(),
            key_version: key_version.to_owned(),
        })
    }

    pub fn vault_base_url(&self) -> &str {
        &self.vault_base_url
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Key version, or `""` for the current version.
    pub fn key_version(&self) -> &str {
        &self.key_version
    }

    pub fn has_version(&self) -> bool {
        !self.key_version.is_empty()
    }

    /// Vault name, i.e. the first DNS label of the vault host.
    pub fn vault_name(&self) -> &str {
        self.vault_base_url
            .strip_prefix("https://")
            .and_then(|h| h.strip_suffix(VAULT_HOST_SUFFIX))
            .unwrap_or_default()
    }

    /// Canonical key URL: `{vault}/keys/{name}[/{version}]`.
    pub fn key_url(&self) -> String {
        let mut url = format!("{}/keys/{}", self.vault_base_url, self.key_name);
        if self.has_version() {
            url.push('/');
            url.push_str(&self.key_version);
        }
        url
    }
}

impl FromStr for KeyIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key_url())
    }
}

fn strip_scheme(input: &str) -> Option<&str> {
    SCHEMES.iter().find_map(|scheme| {
        let head = input.get(..scheme.len())?;
        if head.eq_ignore_ascii_case(scheme) {
            input.get(scheme.len()..)
        } else {
            None
        }
    })
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    let tail = value.get(split..)?;
    if tail.eq_ignore_ascii_case(suffix) {
        value.get(..split)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
