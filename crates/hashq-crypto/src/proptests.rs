//! Property-based tests for sealing and key derivation.

use proptest::prelude::*;

use crate::kdf::{fingerprint, KdfParams, PassphraseKey, Salt};
use crate::{open, seal, SealedValue, SymmetricKey, NONCE_SIZE, TAG_SIZE};

fn fast_params() -> KdfParams {
    KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}

proptest! {
    /// Sealing followed by opening returns the original plaintext.
    #[test]
    fn seal_open_roundtrip(plaintext: Vec<u8>) {
        let key = SymmetricKey::generate();
        let sealed = seal(&key, &plaintext).unwrap();
        prop_assert_eq!(plaintext, open(&key, &sealed).unwrap());
    }

    /// Sealed output never contains the plaintext verbatim.
    #[test]
    fn sealed_bytes_hide_plaintext(plaintext in prop::collection::vec(any::<u8>(), 8..64)) {
        let key = SymmetricKey::generate();
        let bytes = seal(&key, &plaintext).unwrap().into_bytes();
        prop_assert!(!bytes.windows(plaintext.len()).any(|w| w == plaintext.as_slice()));
    }

    /// Sealed size is always nonce + plaintext + tag.
    #[test]
    fn sealed_size_is_fixed_overhead(plaintext in prop::collection::vec(any::<u8>(), 0..256)) {
        let key = SymmetricKey::generate();
        let sealed = seal(&key, &plaintext).unwrap();
        prop_assert_eq!(sealed.into_bytes().len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    /// Parsing arbitrary bytes never panics.
    #[test]
    fn sealed_value_parse_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
        let parsed = SealedValue::from_bytes(&bytes);
        prop_assert_eq!(parsed.is_ok(), bytes.len() >= NONCE_SIZE + TAG_SIZE);
    }

    /// Flipping any single byte breaks authentication.
    #[test]
    fn any_bit_flip_is_detected(plaintext in prop::collection::vec(any::<u8>(), 1..64), index: prop::sample::Index) {
        let key = SymmetricKey::generate();
        let mut bytes = seal(&key, &plaintext).unwrap().into_bytes();
        let at = index.index(bytes.len());
        bytes[at] ^= 0x01;
        let tampered = SealedValue::from_bytes(&bytes).unwrap();
        prop_assert!(open(&key, &tampered).is_err());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Derivation is deterministic for a passphrase and salt.
    #[test]
    fn derivation_is_deterministic(passphrase in prop::collection::vec(any::<u8>(), 1..32), salt in any::<[u8; 32]>()) {
        let salt = Salt::from_bytes(&salt).unwrap();
        let key1 = PassphraseKey::derive(&passphrase, &salt, fast_params()).unwrap();
        let key2 = PassphraseKey::derive(&passphrase, &salt, fast_params()).unwrap();
        let sealed = seal(key1.symmetric_key(), b"same key").unwrap();
        prop_assert_eq!(open(key2.symmetric_key(), &sealed).unwrap(), b"same key".to_vec());
        prop_assert_eq!(fingerprint(&passphrase, &salt), fingerprint(&passphrase, &salt));
    }
}
