//! Fuzz target for Record::decode.
//!
//! Stored bytes come from disk and archives; decoding garbage must return
//! an error without panicking or allocating past the record limit.

#![no_main]

use hashq_engine::Record;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = Record::decode(data) {
        let encoded = record.encode().unwrap();
        assert_eq!(Record::decode(&encoded).unwrap(), record);
    }
});
