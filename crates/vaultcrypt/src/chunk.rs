//! Splitting payloads into single-operation blocks.
//!
//! An RSA key operation takes at most one block of plaintext, so larger
//! inputs are encrypted block by block, one token per block.

use vaultcrypt_core::EncryptionAlgorithm;

use crate::CliError;

/// Default RSA key size assumed when the caller does not say otherwise.
pub const DEFAULT_KEY_SIZE_BITS: usize = 2048;

/// Resolve the chunk size for `algorithm` on a `key_size_bits` RSA key.
///
/// `requested` may lower the size but never exceed the algorithm's limit.
pub fn chunk_size(
    algorithm: EncryptionAlgorithm,
    key_size_bits: usize,
    requested: Option<usize>,
) -> Result<usize, CliError> {
    let max = algorithm.max_plaintext_len(key_size_bits);
    if max == 0 {
        return Err(CliError::InvalidChunkSize(format!(
            "{key_size_bits}-bit keys are too small for {algorithm}"
        )));
    }
    match requested {
        None => Ok(max),
        Some(0) => Err(CliError::InvalidChunkSize("chunk size must be positive".into())),
        Some(size) if size > max => Err(CliError::InvalidChunkSize(format!(
            "{size} bytes exceeds the {max}-byte limit of {algorithm} on {key_size_bits}-bit keys"
        ))),
        Some(size) => Ok(size),
    }
}

/// Number of chunks `len` bytes split into.
pub fn chunk_count(len: usize, size: usize) -> usize {
    len.div_ceil(size)
}
