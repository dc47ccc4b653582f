//! On-disk record layout.
//!
//! Every store entry and every queue slot holds one bincode-encoded
//! [`Record`]: the (possibly sealed) value, an optional absolute expiry,
//! the entry's attributes and the list of its subkeys.

use std::collections::BTreeMap;
use std::time::Duration;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Largest record the engine will encode or decode (64 MiB).
pub const MAX_RECORD_SIZE: u64 = 64 * 1024 * 1024;

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_RECORD_SIZE)
}

/// A stored value, either in the clear or sealed under a passphrase key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    /// Plaintext bytes.
    Plain(Vec<u8>),
    /// `SealedValue` bytes (nonce || ciphertext).
    Sealed(Vec<u8>),
}

impl Body {
    /// Whether the body is sealed.
    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }
}

/// One stored entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// The value.
    pub body: Body,
    /// Unix milliseconds after which the record is invisible.
    pub expires_at: Option<i64>,
    /// Named attributes attached to this entry.
    pub attrs: BTreeMap<String, Vec<u8>>,
    /// Keys listed under this entry.
    pub subkeys: Vec<Vec<u8>>,
}

impl Record {
    /// A record with no attributes and no subkeys.
    pub fn new(body: Body, expires_at: Option<i64>) -> Self {
        Self {
            body,
            expires_at,
            attrs: BTreeMap::new(),
            subkeys: Vec::new(),
        }
    }

    /// Whether the record has expired at `now` (unix milliseconds). The
    /// deadline millisecond itself is still live.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.map_or(false, |at| now > at)
    }

    /// Encode with the engine's bincode options.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Serialization` if the record exceeds
    /// [`MAX_RECORD_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        codec()
            .serialize(self)
            .map_err(|e| EngineError::Serialization(format!("Failed to encode record: {}", e)))
    }

    /// Decode bytes written by [`Record::encode`].
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Corruption` if the bytes are not a record.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        codec()
            .deserialize(bytes)
            .map_err(|e| EngineError::Corruption(format!("Failed to decode record: {}", e)))
    }
}

/// Current time in unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Unix milliseconds `after` past `from`, saturating. Sub-millisecond
/// remainders round up so a positive `after` never lands on `from`.
pub(crate) fn deadline(from: i64, after: Duration) -> i64 {
    let millis = after.as_nanos().div_ceil(1_000_000);
    from.saturating_add(i64::try_from(millis).unwrap_or(i64::MAX))
}
