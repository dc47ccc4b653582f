//! Passphrase key derivation.
//!
//! Store passphrases are stretched with Argon2id against a per-store salt.
//! The salt lives in the store's meta tree so the same passphrase derives the
//! same key across sessions.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::symmetric::{SymmetricKey, KEY_SIZE};
use crate::{CryptoError, Result};

/// Salt size in bytes.
pub const SALT_SIZE: usize = 32;

/// Argon2id cost parameters.
///
/// The defaults follow the OWASP minimum for Argon2id (19 MiB, 2 passes,
/// 1 lane). Every passphrase is derived once per session and then cached by
/// the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// A per-store random salt.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generate a new random salt using OS randomness.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create a salt from stored bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SALT_SIZE {
            return Err(CryptoError::InvalidSaltLength {
                expected: SALT_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SALT_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Get the raw bytes of this salt.
    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Salt({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// A key derived from a passphrase.
///
/// The key is automatically zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PassphraseKey {
    key: SymmetricKey,
}

impl std::fmt::Debug for PassphraseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PassphraseKey([REDACTED])")
    }
}

impl PassphraseKey {
    /// Derive a key from a passphrase using Argon2id.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyDerivation` if the parameters are rejected.
    pub fn derive(passphrase: &[u8], salt: &Salt, params: KdfParams) -> Result<Self> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::KeyDerivation(format!("Argon2 params error: {}", e)))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key_bytes = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(passphrase, salt.as_bytes(), &mut key_bytes)
            .map_err(|e| CryptoError::KeyDerivation(format!("Argon2 failed: {}", e)))?;

        let key = SymmetricKey::from_array(key_bytes);
        key_bytes.zeroize();

        Ok(Self { key })
    }

    /// Get the underlying symmetric key.
    pub fn symmetric_key(&self) -> &SymmetricKey {
        &self.key
    }
}

/// Fingerprint a passphrase for use as a cache key.
///
/// The fingerprint is a BLAKE3 keyed hash under the store salt, so it does
/// not reveal the passphrase and differs between stores.
pub fn fingerprint(passphrase: &[u8], salt: &Salt) -> [u8; 32] {
    *blake3::keyed_hash(salt.as_bytes(), passphrase).as_bytes()
}
