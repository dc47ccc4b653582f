//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur while sealing values or deriving keys.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (invalid ciphertext or key).
    #[error("Decryption failed: invalid ciphertext or key")]
    Decryption,

    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Invalid salt length.
    #[error("Invalid salt length: expected {expected}, got {actual}")]
    InvalidSaltLength {
        /// Expected salt length.
        expected: usize,
        /// Actual salt length.
        actual: usize,
    },
}

/// Result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
