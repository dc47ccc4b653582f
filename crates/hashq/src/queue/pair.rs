use std::io::Write;

use hashq_engine::KeyQueueHandle;
use tracing::{debug, warn};

use super::QueueConfig;
use crate::store::require;
use crate::{text, Error, Result, Store};

/// A queue of key/value pairs.
///
/// Each pushed value is written as a store entry under its key and the key
/// is queued. Popping or removing a pair deletes that entry.
#[derive(Debug)]
pub struct PairQueue<'a> {
    handle: KeyQueueHandle<'a>,
    config: QueueConfig,
}

impl<'a> PairQueue<'a> {
    /// Open the pair queue described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandle` if the engine cannot produce a handle.
    pub fn new(store: &'a Store, config: QueueConfig) -> Result<Self> {
        let handle = store
            .engine()
            .key_queue(config.ordering().into(), config.prefix_bytes())
            .map_err(|e| Error::InvalidHandle(format!("Failed to open pair queue: {}", e)))?;

        debug!(ordering = ?config.ordering(), prefix = ?config.prefix(), "Opened pair queue");
        Ok(Self { handle, config })
    }

    /// The queue's configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Push every pair, in iteration order.
    ///
    /// All pairs are validated before the first push. Pushing stops at the
    /// first engine failure and pairs already pushed stay queued. Returns
    /// the number pushed.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty batch or an empty key
    /// or value, and `Error::BatchInterrupted` if the engine fails midway.
    pub fn push<K, V>(&self, pairs: impl IntoIterator<Item = (K, V)>) -> Result<usize>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let pairs: Vec<(K, V)> = pairs.into_iter().collect();
        if pairs.is_empty() {
            return Err(Error::invalid("pairs", "at least one pair is required"));
        }
        for (key, value) in &pairs {
            require("key", key.as_ref())?;
            require("value", value.as_ref())?;
        }

        let options = self.config.write_options();
        for (pushed, (key, value)) in pairs.iter().enumerate() {
            if let Err(source) =
                self.handle
                    .push(key.as_ref().as_bytes(), value.as_ref().as_bytes(), options)
            {
                warn!(pushed, total = pairs.len(), error = %source, "Pair batch interrupted");
                return Err(Error::BatchInterrupted { pushed, source });
            }
        }
        Ok(pairs.len())
    }

    /// Push one pair.
    pub fn push_pair(&self, key: &str, value: &str) -> Result<()> {
        self.push([(key, value)]).map(|_| ())
    }

    /// Pair at `position` from the head, `None` past the end. A pair whose
    /// entry has vanished has an empty value.
    pub fn peek(&self, position: usize) -> Result<Option<(String, String)>> {
        let pair = self
            .handle
            .read(position, self.config.passphrase_bytes())?;
        Ok(pair.map(|(key, value)| (text(key), text(value))))
    }

    /// Remove the head pair and delete its entry. `None` when empty.
    pub fn pop(&self) -> Result<Option<(String, String)>> {
        let pair = self.handle.pop(self.config.passphrase_bytes())?;
        Ok(pair.map(|(key, value)| (text(key), text(value))))
    }

    /// Number of live pairs.
    pub fn size(&self) -> Result<usize> {
        Ok(self.handle.count()?)
    }

    /// Whether no live pair is queued.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.handle.is_empty()?)
    }

    /// Remove up to `count` pairs and their entries. Returns how many went.
    pub fn remove(&self, count: usize) -> Result<usize> {
        if count == 0 {
            return Err(Error::invalid("count", "count must be at least 1"));
        }
        let removed = self.handle.remove(count)?;
        debug!(requested = count, removed, "Removed queued pairs");
        Ok(removed)
    }

    /// Remove every pair. Returns how many went.
    pub fn clear(&self) -> Result<usize> {
        match self.size()? {
            0 => Ok(0),
            size => self.remove(size),
        }
    }

    /// Write a line per live pair to `out`.
    pub fn dump(&self, out: &mut dyn Write) -> Result<()> {
        Ok(self.handle.dump(out)?)
    }

    /// Release the handle.
    pub fn close(self) {
        debug!(prefix = ?self.config.prefix(), "Closed pair queue");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SetOptions;
    use crate::test_util::fast_options;
    use std::collections::BTreeMap;

    #[test]
    fn test_batch_validation_happens_first() {
        let store = Store::open(&fast_options()).unwrap();
        let queue = PairQueue::new(&store, QueueConfig::fifo()).unwrap();

        let empty: BTreeMap<String, String> = BTreeMap::new();
        assert!(matches!(queue.push(&empty), Err(Error::InvalidArgument { .. })));
        assert!(matches!(
            queue.push([("k1", "v1"), ("k2", "")]),
            Err(Error::InvalidArgument { field, .. }) if field == "value"
        ));
        assert!(queue.is_empty().unwrap());
        assert_eq!(store.get("k1", None).unwrap(), None);
    }

    #[test]
    fn test_batch_interrupted_on_read_only_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store");
        Store::create(&path, hashq_engine::Geometry::default()).unwrap();

        let mut options = fast_options();
        options.path = Some(path);
        options.mode = Some(crate::config::OpenMode::Read);
        let store = Store::open(&options).unwrap();
        let queue = PairQueue::new(&store, QueueConfig::fifo()).unwrap();

        assert!(matches!(
            queue.push([("k1", "v1")]),
            Err(Error::BatchInterrupted { pushed: 0, .. })
        ));
    }

    #[test]
    fn test_pop_deletes_entry() {
        let store = Store::open(&fast_options()).unwrap();
        let queue = PairQueue::new(&store, QueueConfig::fifo()).unwrap();
        queue.push_pair("k1", "v1").unwrap();
        assert_eq!(store.get("k1", None).unwrap().as_deref(), Some("v1"));

        assert_eq!(queue.pop().unwrap(), Some(("k1".into(), "v1".into())));
        assert_eq!(store.get("k1", None).unwrap(), None);
        assert_eq!(queue.pop().unwrap(), None);
    }

    #[test]
    fn test_vanished_entry_reads_empty() {
        let store = Store::open(&fast_options()).unwrap();
        let queue = PairQueue::new(&store, QueueConfig::fifo()).unwrap();
        queue.push_pair("k", "v").unwrap();
        store.remove("k", false).unwrap();

        assert_eq!(queue.peek(0).unwrap(), Some(("k".into(), String::new())));
    }

    #[test]
    fn test_remove_deletes_entries() {
        let store = Store::open(&fast_options()).unwrap();
        let queue = PairQueue::new(&store, QueueConfig::lifo()).unwrap();
        queue.push([("a", "1"), ("b", "2"), ("c", "3")]).unwrap();
        store.set("unrelated", "x", SetOptions::default()).unwrap();

        assert_eq!(queue.remove(2).unwrap(), 2);
        assert_eq!(queue.peek(0).unwrap(), Some(("a".into(), "1".into())));
        assert_eq!(store.get("c", None).unwrap(), None);
        assert_eq!(store.get("b", None).unwrap(), None);
        assert!(store.get("unrelated", None).unwrap().is_some());
        assert!(matches!(queue.remove(0), Err(Error::InvalidArgument { .. })));
    }
}
