//! Store handle.
//!
//! A [`Store`] owns one engine session. Queues and iterators borrow it, so
//! they must be dropped or closed before the store is closed, and
//! [`Store::close`] consumes the handle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hashq_engine::{Engine, EngineConfig, EngineError, Geometry, StoreStats, WriteOptions};
use tracing::{debug, info, warn};

use crate::config::{validate_geometry, OpenMode, StoreOptions};
use crate::iter::KeyIterator;
use crate::{text, Error, Result};

/// Options for a single write through the store.
#[derive(Clone, Copy, Default)]
pub struct SetOptions<'a> {
    /// Seal the value under this passphrase.
    pub passphrase: Option<&'a str>,
    /// Expire the value this long after the write.
    pub expire: Option<Duration>,
}

impl std::fmt::Debug for SetOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetOptions")
            .field("sealed", &self.passphrase.is_some())
            .field("expire", &self.expire)
            .finish()
    }
}

impl<'a> SetOptions<'a> {
    /// Options that seal under `passphrase`.
    pub fn sealed(passphrase: &'a str) -> Self {
        Self {
            passphrase: Some(passphrase),
            expire: None,
        }
    }

    /// Add an expiration.
    pub fn expiring(mut self, after: Duration) -> Self {
        self.expire = Some(after);
        self
    }

    fn validated(self) -> Result<WriteOptions<'a>> {
        if self.passphrase.is_some_and(str::is_empty) {
            return Err(Error::invalid("passphrase", "passphrase cannot be empty"));
        }
        if self.expire.is_some_and(|d| d.is_zero()) {
            return Err(Error::invalid("expire", "expiration must be greater than zero"));
        }
        Ok(WriteOptions {
            passphrase: self.passphrase.map(str::as_bytes),
            expire: self.expire,
        })
    }
}

pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        Err(Error::invalid(field, "cannot be empty"))
    } else {
        Ok(())
    }
}

fn require_path(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::NotFound(path.to_path_buf()))
    }
}

/// An open store.
pub struct Store {
    engine: Engine,
    close_wait: Duration,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("engine", &self.engine)
            .field("close_wait", &self.close_wait)
            .finish()
    }
}

impl Store {
    /// Open a store.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the options are invalid,
    /// `Error::NotFound` if a read-only path holds no store and
    /// `Error::InvalidHandle` if the engine cannot open the store.
    pub fn open(options: &StoreOptions) -> Result<Self> {
        options.validate()?;

        if let (Some(path), Some(OpenMode::Read)) = (&options.path, options.mode) {
            require_path(path)?;
        }

        let config = EngineConfig {
            geometry: options.geometry,
            fullmap: options.fullmap,
            kdf: options.kdf,
        };
        let engine = Engine::open(&options.target(), config).map_err(|e| match (e, &options.path) {
            (EngineError::Io(io), Some(path)) if io.kind() == std::io::ErrorKind::NotFound => {
                Error::NotFound(path.clone())
            }
            (e, _) => Error::InvalidHandle(format!("Failed to open store: {}", e)),
        })?;

        Ok(Self {
            engine,
            close_wait: options.close_wait,
        })
    }

    /// Open an in-memory store with default options.
    pub fn in_memory() -> Result<Self> {
        Self::open(&StoreOptions::in_memory())
    }

    /// Create an empty store at `path` and close it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` before touching the engine if the
    /// path is empty or a geometry value is zero.
    pub fn create(path: impl AsRef<Path>, geometry: Geometry) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::invalid("path", "path cannot be empty"));
        }
        validate_geometry(&geometry)?;

        Engine::create(path, geometry)
            .map_err(|e| Error::InvalidHandle(format!("Failed to create store: {}", e)))?;
        info!(path = %path.display(), "Created store");
        Ok(())
    }

    /// Close, waiting up to the configured close wait for the flush.
    pub fn close(self) -> Result<bool> {
        let wait = self.close_wait;
        self.close_wait(wait)
    }

    /// Close, waiting up to `wait` for the flush. Returns `false` if the
    /// flush was still running when `wait` elapsed.
    pub fn close_wait(self, wait: Duration) -> Result<bool> {
        Ok(self.engine.close(wait)?)
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Whether the store refuses writes.
    pub fn is_read_only(&self) -> bool {
        self.engine.is_read_only()
    }

    /// Store location, `None` for memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.engine.path()
    }

    /// Geometry recorded for the store.
    pub fn geometry(&self) -> Geometry {
        self.engine.geometry()
    }

    /// Iterate over every live key.
    pub fn keys(&self) -> Result<KeyIterator<'_>> {
        KeyIterator::new(self, None)
    }

    /// Iterate over the live subkeys of `key`.
    pub fn subkey_iter(&self, key: &str) -> Result<KeyIterator<'_>> {
        KeyIterator::new(self, Some(key))
    }

    // ===== Entries =====

    /// Write `value` under `key`.
    pub fn set(&self, key: &str, value: &str, options: SetOptions<'_>) -> Result<()> {
        require("key", key)?;
        let options = options.validated()?;
        Ok(self.engine.set(key.as_bytes(), value.as_bytes(), options)?)
    }

    /// Read the value under `key`, opening it with `passphrase` or the
    /// registered passphrases.
    pub fn get(&self, key: &str, passphrase: Option<&str>) -> Result<Option<String>> {
        require("key", key)?;
        let value = self
            .engine
            .get(key.as_bytes(), passphrase.map(str::as_bytes))?;
        Ok(value.map(text))
    }

    /// Remove `key`; with `remove_subkeys`, also every entry below it.
    pub fn remove(&self, key: &str, remove_subkeys: bool) -> Result<bool> {
        require("key", key)?;
        Ok(self.engine.remove(key.as_bytes(), remove_subkeys)?)
    }

    /// Move the entry under `key` to `new_key`.
    pub fn rename(&self, key: &str, new_key: &str) -> Result<bool> {
        require("key", key)?;
        require("new_key", new_key)?;
        Ok(self.engine.rename(key.as_bytes(), new_key.as_bytes())?)
    }

    /// Attach an attribute to an existing entry.
    pub fn set_attribute(&self, key: &str, name: &str, value: &str) -> Result<bool> {
        require("key", key)?;
        require("name", name)?;
        Ok(self
            .engine
            .set_attribute(key.as_bytes(), name, value.as_bytes())?)
    }

    /// Attributes of `key`, `None` if there is no such entry.
    pub fn attributes(&self, key: &str) -> Result<Option<BTreeMap<String, String>>> {
        require("key", key)?;
        Ok(self.engine.attributes(key.as_bytes())?.map(|attrs| {
            attrs
                .into_iter()
                .map(|(name, value)| (name, text(value)))
                .collect()
        }))
    }

    // ===== Subkeys =====

    /// Write `subkey` and list it under `key`.
    pub fn add_subkey(
        &self,
        key: &str,
        subkey: &str,
        value: &str,
        options: SetOptions<'_>,
    ) -> Result<()> {
        require("key", key)?;
        require("subkey", subkey)?;
        let options = options.validated()?;
        Ok(self
            .engine
            .add_subkey(key.as_bytes(), subkey.as_bytes(), value.as_bytes(), options)?)
    }

    /// Write every pair of `subkeys` under `key`.
    ///
    /// Pairs with an empty subkey are skipped. Stops at the first engine
    /// failure; earlier pairs stay written. Returns the number written.
    pub fn set_subkeys<K, V>(
        &self,
        key: &str,
        subkeys: impl IntoIterator<Item = (K, V)>,
        options: SetOptions<'_>,
    ) -> Result<usize>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        require("key", key)?;
        let options = options.validated()?;

        let mut written = 0;
        for (subkey, value) in subkeys {
            let subkey = subkey.as_ref();
            if subkey.is_empty() {
                warn!(key, "Skipping empty subkey");
                continue;
            }
            self.engine
                .add_subkey(key.as_bytes(), subkey.as_bytes(), value.as_ref().as_bytes(), options)
                .map_err(|source| Error::BatchInterrupted {
                    pushed: written,
                    source,
                })?;
            written += 1;
        }
        Ok(written)
    }

    /// Live subkeys of `key`; empty if `key` does not exist.
    pub fn subkeys(&self, key: &str) -> Result<Vec<String>> {
        require("key", key)?;
        Ok(self
            .engine
            .subkeys(key.as_bytes())?
            .unwrap_or_default()
            .into_iter()
            .map(text)
            .collect())
    }

    /// Unlist and remove each of `subkeys` from `key`. Returns how many were
    /// listed.
    pub fn remove_subkeys<S: AsRef<str>>(&self, key: &str, subkeys: &[S]) -> Result<usize> {
        require("key", key)?;
        let mut removed = 0;
        for subkey in subkeys {
            if self
                .engine
                .remove_subkey(key.as_bytes(), subkey.as_ref().as_bytes())?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // ===== Encryption and common attributes =====

    /// Register a passphrase tried when reading sealed values.
    pub fn add_decryption_passphrase(&self, passphrase: &str) -> Result<()> {
        require("passphrase", passphrase)?;
        self.engine.add_decryption_passphrase(passphrase.as_bytes());
        Ok(())
    }

    /// Set the passphrase used when encryption is enabled.
    pub fn set_default_passphrase(&self, passphrase: &str) -> Result<()> {
        require("passphrase", passphrase)?;
        self.engine.set_default_passphrase(passphrase.as_bytes());
        Ok(())
    }

    /// Load passphrases from a file, one per line. Returns how many were
    /// loaded.
    pub fn set_passphrase_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        require_path(path)?;
        Ok(self.engine.load_passphrase_file(path)?)
    }

    /// Seal writes without an explicit passphrase under the default one.
    pub fn enable_encryption(&self, enabled: bool) {
        self.engine.set_encryption(enabled);
    }

    /// Stamp an `mtime` attribute on every write.
    pub fn enable_mtime(&self, enabled: bool) {
        self.engine.set_mtime(enabled);
    }

    /// Keep superseded values for [`Store::history`].
    pub fn enable_history(&self, enabled: bool) {
        self.engine.set_history(enabled);
    }

    /// Expire writes without their own expiration after `after`.
    pub fn set_expiration(&self, after: Duration) -> Result<()> {
        if after.is_zero() {
            return Err(Error::invalid("expire", "expiration must be greater than zero"));
        }
        self.engine.set_expiration(Some(after));
        Ok(())
    }

    /// Stop applying a default expiration.
    pub fn clear_expiration(&self) {
        self.engine.set_expiration(None);
    }

    /// Previous values of `key`, newest first.
    pub fn history(&self, key: &str, passphrase: Option<&str>) -> Result<Vec<String>> {
        require("key", key)?;
        let values = self
            .engine
            .history(key.as_bytes(), passphrase.map(str::as_bytes))?;
        Ok(values.into_iter().map(text).collect())
    }

    // ===== Transaction log =====

    /// Log mutations of keys starting with `prefix` to `path`.
    pub fn begin_transaction(
        &self,
        path: impl AsRef<Path>,
        prefix: Option<&str>,
        param: Option<&str>,
        expire: Option<Duration>,
    ) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::invalid("path", "path cannot be empty"));
        }
        if prefix.is_some_and(str::is_empty) {
            return Err(Error::invalid("prefix", "prefix cannot be empty"));
        }
        if expire.is_some_and(|d| d.is_zero()) {
            return Err(Error::invalid("expire", "expiration must be greater than zero"));
        }

        Ok(self.engine.begin_transaction(
            path,
            prefix.map(str::as_bytes),
            param.map(str::as_bytes),
            expire,
        )?)
    }

    /// Stop logging. Returns whether a log was active.
    pub fn stop_transaction(&self) -> Result<bool> {
        Ok(self.engine.stop_transaction()?)
    }

    /// Path of the active transaction log.
    pub fn transaction_log_path(&self) -> Option<PathBuf> {
        self.engine.transaction_log_path()
    }

    // ===== Archives and stats =====

    /// Write every entry and queue element to an archive file.
    pub fn dump_to_file(&self, path: impl AsRef<Path>, skip_errors: bool) -> Result<usize> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::invalid("path", "path cannot be empty"));
        }
        Ok(self.engine.dump_to_file(path, skip_errors)?)
    }

    /// Load an archive file written by [`Store::dump_to_file`].
    pub fn load_from_file(&self, path: impl AsRef<Path>, skip_errors: bool) -> Result<usize> {
        let path = path.as_ref();
        require_path(path)?;
        Ok(self.engine.load_from_file(path, skip_errors)?)
    }

    /// Live key and queue element counts and disk usage.
    pub fn stats(&self) -> Result<StoreStats> {
        let stats = self.engine.stats()?;
        debug!(?stats, "Read store stats");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::fast_options;

    fn memory() -> Store {
        Store::open(&fast_options()).unwrap()
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let store = memory();
        assert!(matches!(
            store.set("", "v", SetOptions::default()),
            Err(Error::InvalidArgument { field, .. }) if field == "key"
        ));
        assert!(matches!(
            store.get("", None),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_empty_passphrase_is_rejected() {
        let store = memory();
        assert!(matches!(
            store.set("k", "v", SetOptions::sealed("")),
            Err(Error::InvalidArgument { field, .. }) if field == "passphrase"
        ));
        assert!(store.add_decryption_passphrase("").is_err());
        assert!(store.set_default_passphrase("").is_err());
    }

    #[test]
    fn test_zero_expiration_is_rejected() {
        let store = memory();
        assert!(store.set_expiration(Duration::ZERO).is_err());
        assert!(store
            .set("k", "v", SetOptions::default().expiring(Duration::ZERO))
            .is_err());
    }

    #[test]
    fn test_set_subkeys_skips_empty() {
        let store = memory();
        let written = store
            .set_subkeys("parent", [("a", "1"), ("", "skipped"), ("b", "2")], SetOptions::default())
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.subkeys("parent").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_subkeys() {
        let store = memory();
        store
            .set_subkeys("parent", [("a", "1"), ("b", "2")], SetOptions::default())
            .unwrap();
        assert_eq!(store.remove_subkeys("parent", &["a", "missing"]).unwrap(), 1);
        assert_eq!(store.subkeys("parent").unwrap(), vec!["b"]);
        assert_eq!(store.get("a", None).unwrap(), None);
    }

    #[test]
    fn test_missing_passphrase_file() {
        let store = memory();
        assert!(matches!(
            store.set_passphrase_file("/nonexistent/passphrases"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_archive() {
        let store = memory();
        assert!(matches!(
            store.load_from_file("/nonexistent/archive", false),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_create_validates_before_engine() {
        assert!(matches!(
            Store::create("", Geometry::default()),
            Err(Error::InvalidArgument { field, .. }) if field == "path"
        ));

        let geometry = Geometry {
            page_size: 0,
            ..Geometry::default()
        };
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store");
        assert!(matches!(
            Store::create(&path, geometry),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store");
        Store::create(&path, Geometry::default()).unwrap();

        let mut options = fast_options();
        options.path = Some(path);
        options.mode = Some(OpenMode::Read);
        let store = Store::open(&options).unwrap();

        assert!(store.is_read_only());
        assert!(matches!(
            store.set("k", "v", SetOptions::default()),
            Err(Error::Engine(hashq_engine::EngineError::ReadOnly))
        ));
        assert!(store.close().unwrap());
    }

    #[test]
    fn test_read_only_directory_without_store_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();

        let mut options = fast_options();
        options.path = Some(dir.path().to_path_buf());
        options.mode = Some(OpenMode::Read);

        assert!(matches!(Store::open(&options), Err(Error::NotFound(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_sub_millisecond_expiration_is_readable() {
        let store = memory();
        store
            .set("k", "v", SetOptions::default().expiring(Duration::from_micros(500)))
            .unwrap();
        assert_eq!(store.get("k", None).unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_temp_file_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scratch");

        let mut options = fast_options();
        options.path = Some(path.clone());
        options.mode = Some(OpenMode::TempFile);
        let store = Store::open(&options).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        store.set("k", "v", SetOptions::default()).unwrap();
        assert_eq!(store.get("k", None).unwrap().as_deref(), Some("v"));
        assert!(store.close().unwrap());
    }
}
