//! Ordered queues.
//!
//! A [`ValueQueue`] holds text payloads with optional attributes. A
//! [`PairQueue`] holds key/value pairs: each value is stored as a regular
//! entry and the queue records its key, so popping a pair also deletes the
//! entry.
//!
//! Both are configured by a [`QueueConfig`], fixed for the queue's lifetime.
//!
//! ```
//! use hashq::{Ordering, QueueConfig, Store, ValueQueue};
//!
//! let store = Store::in_memory().unwrap();
//! let config = QueueConfig::builder()
//!     .ordering(Ordering::Lifo)
//!     .prefix("jobs")
//!     .build()
//!     .unwrap();
//!
//! let queue = ValueQueue::new(&store, config).unwrap();
//! queue.push("first").unwrap();
//! queue.push("second").unwrap();
//! assert_eq!(queue.pop().unwrap().as_deref(), Some("second"));
//! ```

mod pair;
mod value;

use std::time::Duration;

use hashq_engine::{QueueOrdering, WriteOptions};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{Error, Result};

pub use pair::PairQueue;
pub use value::{Element, ValueQueue};

/// Where pushes land. Position 0 is always the next element popped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ordering {
    /// Push at the tail.
    #[default]
    Fifo,
    /// Push at the head.
    Lifo,
}

impl From<Ordering> for QueueOrdering {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Fifo => Self::Fifo,
            Ordering::Lifo => Self::Lifo,
        }
    }
}

/// Validated, immutable queue settings.
#[derive(Clone, Default)]
pub struct QueueConfig {
    ordering: Ordering,
    prefix: Option<String>,
    passphrase: Option<Zeroizing<String>>,
    expire: Option<Duration>,
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("ordering", &self.ordering)
            .field("prefix", &self.prefix)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("expire", &self.expire)
            .finish()
    }
}

impl QueueConfig {
    /// Create a builder.
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }

    /// Unprefixed FIFO queue without sealing or expiration.
    pub fn fifo() -> Self {
        Self::default()
    }

    /// Unprefixed LIFO queue without sealing or expiration.
    pub fn lifo() -> Self {
        Self {
            ordering: Ordering::Lifo,
            ..Self::default()
        }
    }

    /// Push ordering.
    pub fn ordering(&self) -> Ordering {
        self.ordering
    }

    /// Namespace prefix.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Whether elements are sealed.
    pub fn is_sealed(&self) -> bool {
        self.passphrase.is_some()
    }

    /// Element lifetime.
    pub fn expire(&self) -> Option<Duration> {
        self.expire
    }

    pub(crate) fn prefix_bytes(&self) -> Option<&[u8]> {
        self.prefix.as_deref().map(str::as_bytes)
    }

    pub(crate) fn passphrase_bytes(&self) -> Option<&[u8]> {
        self.passphrase.as_ref().map(|p| p.as_bytes())
    }

    pub(crate) fn write_options(&self) -> WriteOptions<'_> {
        WriteOptions {
            passphrase: self.passphrase_bytes(),
            expire: self.expire,
        }
    }
}

/// Builder for [`QueueConfig`].
#[derive(Default)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    /// Set the ordering (FIFO by default).
    pub fn ordering(mut self, ordering: Ordering) -> Self {
        self.config.ordering = ordering;
        self
    }

    /// Scope the queue to `prefix`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = Some(prefix.into());
        self
    }

    /// Seal elements under `passphrase`.
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.config.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }

    /// Expire elements `after` their push.
    pub fn expire(mut self, after: Duration) -> Self {
        self.config.expire = Some(after);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty prefix, an empty
    /// passphrase or a zero expiration.
    pub fn build(self) -> Result<QueueConfig> {
        let config = self.config;
        if config.prefix.as_deref().is_some_and(str::is_empty) {
            return Err(Error::invalid("prefix", "prefix cannot be empty"));
        }
        if config.passphrase.as_ref().is_some_and(|p| p.is_empty()) {
            return Err(Error::invalid("passphrase", "passphrase cannot be empty"));
        }
        if config.expire.is_some_and(|d| d.is_zero()) {
            return Err(Error::invalid("expire", "expiration must be greater than zero"));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::builder().build().unwrap();
        assert_eq!(config.ordering(), Ordering::Fifo);
        assert_eq!(config.prefix(), None);
        assert!(!config.is_sealed());
        assert_eq!(config.expire(), None);
        assert_eq!(QueueConfig::lifo().ordering(), Ordering::Lifo);
    }

    #[test]
    fn test_rejects_empty_values() {
        let fields = [
            (QueueConfig::builder().prefix(""), "prefix"),
            (QueueConfig::builder().passphrase(""), "passphrase"),
            (QueueConfig::builder().expire(Duration::ZERO), "expire"),
        ];
        for (builder, expected) in fields {
            assert!(matches!(
                builder.build(),
                Err(Error::InvalidArgument { field, .. }) if field == expected
            ));
        }
    }

    #[test]
    fn test_debug_hides_passphrase() {
        let config = QueueConfig::builder().passphrase("hunter2").build().unwrap();
        let shown = format!("{:?}", config);
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("REDACTED"));
    }

    #[test]
    fn test_write_options_carry_settings() {
        let config = QueueConfig::builder()
            .passphrase("pw")
            .expire(Duration::from_secs(5))
            .build()
            .unwrap();
        let options = config.write_options();
        assert_eq!(options.passphrase, Some(b"pw".as_slice()));
        assert_eq!(options.expire, Some(Duration::from_secs(5)));
    }
}
