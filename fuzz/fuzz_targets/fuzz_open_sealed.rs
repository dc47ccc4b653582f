//! Fuzz target for opening sealed values.
//!
//! Opening arbitrary ciphertext must fail cleanly, never panic.

#![no_main]

use hashq_crypto::{open, SealedValue, SymmetricKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(sealed) = SealedValue::from_bytes(data) {
        let key = SymmetricKey::generate();
        assert!(open(&key, &sealed).is_err());
    }
});
