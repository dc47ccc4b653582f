//! # hashq-engine
//!
//! Keyed store engine over sled.
//!
//! Provides:
//! - Binary keys and values with attributes, subkeys and expiration
//! - Per-value sealing under passphrase-derived keys
//! - Value and key queues with FIFO or LIFO ordering
//! - Key cursors, a transaction log and archive files
//!
//! ## Sessions
//!
//! An [`Engine`] is one open session. Queue handles borrow it, so they
//! cannot outlive it, and [`Engine::close`] consumes it.
//!
//! ```no_run
//! use hashq_engine::{Engine, EngineConfig, OpenTarget, QueueOrdering, WriteOptions};
//! use std::collections::BTreeMap;
//! use std::time::Duration;
//!
//! let engine = Engine::open(&OpenTarget::Memory, EngineConfig::default()).unwrap();
//! engine.set(b"user:alice", b"profile", WriteOptions::sealed(b"passphrase")).unwrap();
//!
//! let queue = engine.value_queue(QueueOrdering::Fifo, Some(b"jobs")).unwrap();
//! queue.push(b"job-1", BTreeMap::new(), WriteOptions::default()).unwrap();
//! let job = queue.pop(None).unwrap();
//! drop(queue);
//!
//! engine.close(Duration::from_secs(1)).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod options;
pub mod queue;
pub mod record;
pub mod txlog;

pub use cursor::Cursor;
pub use engine::{Engine, StoreStats, MTIME_ATTR};
pub use error::{EngineError, Result};
pub use hashq_crypto::KdfParams;
pub use options::{EngineConfig, Geometry, OpenTarget, WriteOptions};
pub use queue::{KeyQueueHandle, QueueElement, QueueHandle, QueueOrdering, MAX_PREFIX_LEN};
pub use record::{Body, Record, MAX_RECORD_SIZE};
pub use txlog::{TxLog, TxOp, TxRecord};
