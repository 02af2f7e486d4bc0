//! Secret value wrapper with automatic zeroing on drop.
//!
//! Client secrets and bearer tokens are held in a `SecretValue` so they are
//! cleared from memory when dropped and never show up in `Debug` output,
//! tracing fields, or error messages.

use std::fmt;

use zeroize::Zeroizing;

/// A secret value that is automatically zeroed from memory on drop.
///
/// `Debug` and `Display` always render `[REDACTED]`.
#[derive(Clone)]
pub struct SecretValue(Zeroizing<Vec<u8>>);

impl SecretValue {
    /// Create a `SecretValue` from raw bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(Zeroizing::new(data))
    }

    /// Create a `SecretValue` from a String, consuming the String.
    pub fn from_string(s: String) -> Self {
        Self(Zeroizing::new(s.into_bytes()))
    }

    /// Access the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Try to interpret the bytes as a UTF-8 string.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SecretValue {
    fn from(s: &str) -> Self {
        Self::from_string(s.to_owned())
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
