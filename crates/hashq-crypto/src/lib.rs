//! # hashq-crypto
//!
//! Cryptographic primitives for the hashq keyed store.
//!
//! - **XChaCha20-Poly1305** sealing of stored values
//! - **Argon2id** passphrase key derivation against a per-store salt
//! - **BLAKE3** passphrase fingerprints for derived-key caching
//!
//! ## Security
//!
//! Keys are zeroized on drop. Nonces come from `OsRng` and are never reused.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod kdf;
pub mod symmetric;

#[cfg(test)]
mod proptests;

pub use error::{CryptoError, Result};
pub use kdf::{fingerprint, KdfParams, PassphraseKey, Salt, SALT_SIZE};
pub use symmetric::{open, seal, SealedValue, SymmetricKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
