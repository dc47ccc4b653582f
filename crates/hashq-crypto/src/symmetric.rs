//! XChaCha20-Poly1305 value sealing.
//!
//! Every stored value that carries a passphrase is sealed with a fresh random
//! 192-bit nonce under a 256-bit key derived from that passphrase.
//!
//! Wire format of a sealed value: `[nonce (24 bytes)][ciphertext + tag]`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

/// Size of symmetric key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of nonce in bytes (192 bits for XChaCha20).
pub const NONCE_SIZE: usize = 24;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A 256-bit sealing key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// A random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Take ownership of derived key material.
    pub(crate) fn from_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.bytes))
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// A sealed value in its stored form.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedValue(Vec<u8>);

impl SealedValue {
    /// Wrap stored bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Decryption` if `bytes` is too short to hold a
    /// nonce and a tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption);
        }
        Ok(Self(bytes.to_vec()))
    }

    /// The nonce prefix.
    pub fn nonce(&self) -> &[u8] {
        &self.0[..NONCE_SIZE]
    }

    /// Ciphertext with the tag appended.
    pub fn ciphertext(&self) -> &[u8] {
        &self.0[NONCE_SIZE..]
    }

    /// Stored size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; a sealed value holds at least a nonce and a tag.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The stored bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into the stored bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl std::fmt::Debug for SealedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedValue")
            .field("nonce", &format_args!("{:02x}{:02x}..", self.0[0], self.0[1]))
            .field("len", &self.0.len())
            .finish()
    }
}

/// Seal plaintext under `key` with a random nonce.
///
/// ```
/// use hashq_crypto::symmetric::{open, seal, SymmetricKey};
///
/// let key = SymmetricKey::generate();
/// let sealed = seal(&key, b"queued payload").unwrap();
/// assert_eq!(open(&key, &sealed).unwrap(), b"queued payload");
/// ```
pub fn seal(key: &SymmetricKey, plaintext: &[u8]) -> Result<SealedValue> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = key
        .cipher()
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption("XChaCha20-Poly1305 encryption failed".into()))?;

    let mut bytes = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    bytes.extend_from_slice(&nonce);
    bytes.extend_from_slice(&ciphertext);
    Ok(SealedValue(bytes))
}

/// Open a sealed value.
///
/// # Errors
///
/// Returns `CryptoError::Decryption` if the key is wrong or the ciphertext
/// has been altered.
pub fn open(key: &SymmetricKey, sealed: &SealedValue) -> Result<Vec<u8>> {
    key.cipher()
        .decrypt(XNonce::from_slice(sealed.nonce()), sealed.ciphertext())
        .map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = SymmetricKey::generate();
        let sealed = seal(&key, b"queued payload").unwrap();

        assert_eq!(open(&key, &sealed).unwrap(), b"queued payload");
    }

    #[test]
    fn test_open_fails_with_wrong_key() {
        let sealed = seal(&SymmetricKey::generate(), b"secret").unwrap();
        let result = open(&SymmetricKey::generate(), &sealed);

        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_open_fails_with_tampered_ciphertext() {
        let key = SymmetricKey::generate();
        let mut bytes = seal(&key, b"secret").unwrap().into_bytes();
        bytes[NONCE_SIZE] ^= 0xFF;
        let tampered = SealedValue::from_bytes(&bytes).unwrap();

        assert!(matches!(open(&key, &tampered), Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_nonces_are_fresh() {
        let key = SymmetricKey::generate();

        let first = seal(&key, b"same").unwrap();
        let second = seal(&key, b"same").unwrap();

        assert_ne!(first.nonce(), second.nonce());
        assert_ne!(first.ciphertext(), second.ciphertext());
    }

    #[test]
    fn test_stored_bytes_reopen() {
        let key = SymmetricKey::generate();
        let sealed = seal(&key, b"bytes").unwrap();

        let restored = SealedValue::from_bytes(sealed.as_bytes()).unwrap();

        assert_eq!(restored, sealed);
        assert_eq!(open(&key, &restored).unwrap(), b"bytes");
    }

    #[test]
    fn test_sealed_value_too_short() {
        let result = SealedValue::from_bytes(&[0u8; NONCE_SIZE + TAG_SIZE - 1]);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = SymmetricKey::from_array([0x42u8; KEY_SIZE]);
        assert_eq!(format!("{:?}", key), "SymmetricKey([REDACTED])");
    }
}
