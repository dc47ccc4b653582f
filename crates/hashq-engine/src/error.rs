//! Error types for engine operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur inside the keyed store engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] hashq_crypto::CryptoError),

    /// The underlying sled database failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored bytes are not what the engine wrote.
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// A mutating call was made on a store opened read-only.
    #[error("Store is opened read-only")]
    ReadOnly,

    /// No known passphrase opens a sealed value.
    #[error("No passphrase opens the sealed value")]
    Undecryptable,

    /// The queue's sequence space is used up at the insertion end.
    #[error("Queue sequence space exhausted")]
    QueueExhausted,

    /// The queue prefix is longer than a slot key can carry.
    #[error("Queue prefix too long: {0} bytes")]
    InvalidQueuePrefix(usize),

    /// A geometry parameter is zero.
    #[error("Invalid geometry: {0:?}")]
    InvalidGeometry(crate::options::Geometry),

    /// A passphrase file held no usable line.
    #[error("Passphrase file holds no passphrases: {}", .0.display())]
    EmptyPassphraseFile(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Build a `map_err` adapter that tags sled errors with what was being done.
pub(crate) fn db_err(context: &'static str) -> impl Fn(sled::Error) -> EngineError {
    move |e| EngineError::Database(format!("{}: {}", context, e))
}
