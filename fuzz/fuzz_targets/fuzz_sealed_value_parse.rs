//! Fuzz target for SealedValue::from_bytes.
//!
//! Parsing arbitrary bytes as a sealed value must never panic.

#![no_main]

use hashq_crypto::{SealedValue, NONCE_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(sealed) = SealedValue::from_bytes(data) {
        assert_eq!(sealed.nonce().len(), NONCE_SIZE);
        assert_eq!(sealed.len(), data.len());
        assert_eq!(sealed.as_bytes(), data);
    }
});
