//! Key Vault RSA encryption algorithms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// RSA encryption algorithm used for both encrypt and decrypt.
///
/// The algorithm is fixed when an encryption client is built and is never
/// negotiated with the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    /// RSAES-OAEP with SHA-256 and MGF1 with SHA-256.
    #[default]
    #[serde(rename = "RSA-OAEP-256")]
    RsaOaep256,
    /// RSAES-OAEP with SHA-1.
    #[serde(rename = "RSA-OAEP")]
    RsaOaep,
    /// RSAES-PKCS1-v1_5.
    #[serde(rename = "RSA1_5")]
    Rsa1_5,
}

/// Error returned when an algorithm name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown encryption algorithm '{0}' (expected RSA-OAEP-256, RSA-OAEP or RSA1_5)")]
pub struct UnknownAlgorithm(pub String);

impl EncryptionAlgorithm {
    pub const ALL: [EncryptionAlgorithm; 3] = [Self::RsaOaep256, Self::RsaOaep, Self::Rsa1_5];

    /// Name used on the wire (`alg` field of key operation requests).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::RsaOaep => "RSA-OAEP",
            Self::Rsa1_5 => "RSA1_5",
        }
    }

    /// Bytes of padding overhead per RSA block.
    fn overhead(self) -> usize {
        match self {
            // 2 * hLen + 2 with SHA-256
            Self::RsaOaep256 => 66,
            // 2 * hLen + 2 with SHA-1
            Self::RsaOaep => 42,
            Self::Rsa1_5 => 11,
        }
    }

    /// Largest plaintext a single operation accepts for an RSA key of
    /// `key_size_bits`. Returns 0 for keys too small for the padding.
    pub fn max_plaintext_len(self, key_size_bits: usize) -> usize {
        (key_size_bits / 8).saturating_sub(self.overhead())
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|alg| alg.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownAlgorithm(s.to_owned()))
    }
}
