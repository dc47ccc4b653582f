//! # hashq
//!
//! Ordered queues, key iteration and store handles over the hashq keyed
//! store engine.
//!
//! ## Quick Start
//!
//! ```
//! use hashq::{PairQueue, QueueConfig, SetOptions, Store, StoreOptions, ValueQueue};
//!
//! let store = Store::open(&StoreOptions::in_memory()).unwrap();
//! store.set("greeting", "hello", SetOptions::default()).unwrap();
//!
//! let queue = ValueQueue::new(&store, QueueConfig::fifo()).unwrap();
//! queue.push("job-1").unwrap();
//! assert_eq!(queue.pop().unwrap().as_deref(), Some("job-1"));
//!
//! let pairs = PairQueue::new(&store, QueueConfig::fifo()).unwrap();
//! pairs.push([("user:1", "alice")]).unwrap();
//!
//! for key in store.keys().unwrap() {
//!     println!("{}", key.unwrap());
//! }
//!
//! // Handles borrow the store, so they go first.
//! queue.close();
//! pairs.close();
//! store.close().unwrap();
//! ```
//!
//! ## Handles
//!
//! - [`Store`] owns the engine session. Closing consumes it.
//! - [`ValueQueue`] and [`PairQueue`] borrow the store.
//! - [`KeyIterator`] walks keys or subkeys once; ask for a new one to restart.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod iter;
pub mod queue;
pub mod store;

pub use config::{ConfigError, OpenMode, StoreOptions, StoreOptionsBuilder};
pub use error::{Error, Result};
pub use hashq_engine::{EngineError, Geometry, KdfParams, StoreStats};
pub use iter::KeyIterator;
pub use queue::{Element, Ordering, PairQueue, QueueConfig, QueueConfigBuilder, ValueQueue};
pub use store::{SetOptions, Store};

/// Engine bytes as text, replacing invalid UTF-8.
pub(crate) fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
