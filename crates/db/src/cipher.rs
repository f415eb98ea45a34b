//! Payload encryption hook.
//!
//! The engine treats encryption as an opaque transform applied to a row
//! payload before it is written and after it is read. Failures are
//! reported as [`DbError::Cipher`]; there is no fallback key.

use core::fmt::Debug;

use crate::{DbError, Result};

/// Reversible transform applied to row payloads of encrypted tables
pub trait PayloadCipher: Debug + Send + Sync {
    /// Transforms a serialized row before it is stored
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Reverses [`PayloadCipher::encrypt`]
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Identity transform used by unencrypted tables
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCipher;

impl PayloadCipher for NoCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

/// Refuses every operation; stands in when an encrypted table is opened
/// without a configured cipher
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MissingCipher;

impl PayloadCipher for MissingCipher {
    fn encrypt(&self, _plaintext: &[u8]) -> Result<Vec<u8>> {
        Err(DbError::cipher("table is encrypted but no cipher is configured"))
    }

    fn decrypt(&self, _ciphertext: &[u8]) -> Result<Vec<u8>> {
        Err(DbError::cipher("table is encrypted but no cipher is configured"))
    }
}
