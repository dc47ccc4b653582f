//! Fuzz target for reading transaction logs.
//!
//! A damaged log file must be read up to the damage or rejected, never
//! panic.

#![no_main]

use hashq_engine::TxLog;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = tempfile::TempDir::new() else {
        return;
    };
    let path = dir.path().join("tx.log");
    if std::fs::write(&path, data).is_ok() {
        let _ = TxLog::read_all(&path);
    }
});
