//! The keyed store engine.
//!
//! An [`Engine`] is one session over a sled database. Store entries live in
//! the `data` tree as bincode [`Record`]s, queue slots in the `queues` tree,
//! superseded values in `history`, and the store's salt and geometry in
//! `__meta__`.
//!
//! ## Sealing
//!
//! Values written with a passphrase are sealed with XChaCha20-Poly1305 under
//! a key derived from the passphrase and the store's salt via Argon2id.
//! Derived keys are cached per passphrase fingerprint for the session.
//! Reading without an explicit passphrase tries the default passphrase, then
//! every registered decryption passphrase.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use hashq_crypto::{fingerprint, open, seal, KdfParams, PassphraseKey, Salt, SealedValue};

use crate::archive::{self, DATA_TAG, QUEUE_TAG};
use crate::cursor::Cursor;
use crate::error::db_err;
use crate::options::{CommonAttrs, EngineConfig, Geometry, OpenTarget, WriteOptions};
use crate::queue::{KeyQueueHandle, QueueHandle, QueueOrdering};
use crate::record::{deadline, now_millis, Body, Record};
use crate::txlog::{TxLog, TxOp};
use crate::{EngineError, Result};

/// Name of the tree holding store entries.
const DATA_TREE: &str = "data";
/// Name of the tree holding queue slots.
const QUEUE_TREE: &str = "queues";
/// Name of the tree holding superseded values.
const HISTORY_TREE: &str = "history";
/// Name of the meta tree for internal storage.
const META_TREE: &str = "__meta__";

/// Key for storing the salt in the meta tree.
const SALT_KEY: &[u8] = b"salt";
/// Key for storing the geometry in the meta tree.
const GEOMETRY_KEY: &[u8] = b"geometry";

/// Attribute holding the last write time when mtime stamping is on.
pub const MTIME_ATTR: &str = "mtime";

/// Files sled writes when it initializes a database directory.
const SLED_FILES: [&str; 2] = ["conf", "db"];

/// Whether `path` holds sled's database files.
fn is_store(path: &Path) -> bool {
    SLED_FILES.iter().all(|name| path.join(name).exists())
}

/// Counts reported by [`Engine::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Live store entries.
    pub keys: usize,
    /// Live queue elements across all queues.
    pub queued: usize,
    /// Bytes used on disk.
    pub size_on_disk: u64,
}

#[derive(Default)]
struct Passphrases {
    default: Option<Zeroizing<Vec<u8>>>,
    decrypt: Vec<Zeroizing<Vec<u8>>>,
}

impl Passphrases {
    /// Default passphrase first, then decryption passphrases in registration order.
    fn candidates(&self) -> Vec<Zeroizing<Vec<u8>>> {
        self.default.iter().chain(self.decrypt.iter()).cloned().collect()
    }
}

/// One open store session.
pub struct Engine {
    db: sled::Db,
    data: sled::Tree,
    pub(crate) queues: sled::Tree,
    history: sled::Tree,
    salt: Salt,
    kdf: KdfParams,
    geometry: Geometry,
    read_only: bool,
    path: Option<PathBuf>,
    keys: Mutex<HashMap<[u8; 32], Arc<PassphraseKey>>>,
    passphrases: RwLock<Passphrases>,
    common: RwLock<CommonAttrs>,
    txlog: Mutex<Option<TxLog>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Open a session.
    ///
    /// A store opened for writing records its salt and `config.geometry` on
    /// first initialization. A read-only session never writes, so a store
    /// without a recorded salt gets a session-local one.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Io` with `NotFound` if a read-only target is not
    /// an existing store, `EngineError::Database` if sled cannot open the store and
    /// `EngineError::Corruption` if the meta tree holds foreign data.
    pub fn open(target: &OpenTarget, config: EngineConfig) -> Result<Self> {
        if let OpenTarget::ReadOnly(path) = target {
            // sled would initialize a fresh database in any directory.
            if !is_store(path) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("No store at {}", path.display()),
                )
                .into());
            }
        }

        let mode = if config.fullmap {
            sled::Mode::HighThroughput
        } else {
            sled::Mode::LowSpace
        };
        let sled_config = sled::Config::new()
            .mode(mode)
            .cache_capacity(config.geometry.cache_capacity());
        let sled_config = match target {
            OpenTarget::Memory => sled_config.temporary(true),
            OpenTarget::ReadOnly(path) | OpenTarget::ReadWrite(path) => sled_config.path(path),
            OpenTarget::Temporary(path) => sled_config.path(path).temporary(true),
        };

        let db = sled_config.open().map_err(db_err("Failed to open store"))?;
        let open_tree = |name: &str| {
            db.open_tree(name)
                .map_err(|e| EngineError::Database(format!("Failed to open {} tree: {}", name, e)))
        };
        let data = open_tree(DATA_TREE)?;
        let queues = open_tree(QUEUE_TREE)?;
        let history = open_tree(HISTORY_TREE)?;
        let meta = open_tree(META_TREE)?;

        let read_only = target.is_read_only();

        let salt = match meta.get(SALT_KEY).map_err(db_err("Failed to read salt"))? {
            Some(bytes) => Salt::from_bytes(&bytes).map_err(|_| {
                EngineError::Corruption(format!("Invalid salt length: {}", bytes.len()))
            })?,
            None => {
                let salt = Salt::generate();
                if !read_only {
                    meta.insert(SALT_KEY, &salt.as_bytes()[..])
                        .map_err(db_err("Failed to store salt"))?;
                }
                salt
            }
        };

        let geometry = match meta.get(GEOMETRY_KEY).map_err(db_err("Failed to read geometry"))? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| EngineError::Corruption(format!("Invalid geometry: {}", e)))?,
            None => {
                if !read_only {
                    let bytes = bincode::serialize(&config.geometry).map_err(|e| {
                        EngineError::Serialization(format!("Failed to encode geometry: {}", e))
                    })?;
                    meta.insert(GEOMETRY_KEY, bytes)
                        .map_err(db_err("Failed to store geometry"))?;
                }
                config.geometry
            }
        };

        info!(
            path = ?target.path(),
            read_only,
            fullmap = config.fullmap,
            "Opened store"
        );

        Ok(Self {
            db,
            data,
            queues,
            history,
            salt,
            kdf: config.kdf,
            geometry,
            read_only,
            path: target.path().cloned(),
            keys: Mutex::new(HashMap::new()),
            passphrases: RwLock::new(Passphrases::default()),
            common: RwLock::new(CommonAttrs::default()),
            txlog: Mutex::new(None),
        })
    }

    /// Create an empty store at `path` and close it again.
    ///
    /// An existing store at `path` keeps its recorded geometry.
    pub fn create(path: &Path, geometry: Geometry) -> Result<()> {
        if !geometry.is_valid() {
            return Err(EngineError::InvalidGeometry(geometry));
        }
        let config = EngineConfig {
            geometry,
            ..EngineConfig::default()
        };
        let engine = Self::open(&OpenTarget::ReadWrite(path.to_path_buf()), config)?;
        engine.close(Duration::ZERO)?;
        Ok(())
    }

    /// End the session.
    ///
    /// Finishes an active transaction log, then flushes. A zero `wait`
    /// flushes on the calling thread. Otherwise the flush runs on a helper
    /// thread and `Ok(false)` is returned if it has not finished after
    /// `wait`; the flush still completes in the background.
    pub fn close(self, wait: Duration) -> Result<bool> {
        if let Some(log) = self.txlog.lock().take() {
            log.finish()?;
        }

        if wait.is_zero() {
            self.db.flush().map_err(db_err("Failed to flush on close"))?;
            info!(path = ?self.path, "Closed store");
            return Ok(true);
        }

        let db = self.db.clone();
        let (done, finished) = mpsc::channel();
        std::thread::spawn(move || {
            let flushed = db.flush();
            // Release the store before reporting so it can be reopened at once.
            drop(db);
            // The receiver is gone if the wait already elapsed.
            let _ = done.send(flushed);
        });

        match finished.recv_timeout(wait) {
            Ok(flushed) => {
                flushed.map_err(db_err("Failed to flush on close"))?;
                info!(path = ?self.path, "Closed store");
                Ok(true)
            }
            Err(_) => {
                warn!(path = ?self.path, ?wait, "Store still flushing when close wait elapsed");
                Ok(false)
            }
        }
    }

    /// Geometry recorded for this store.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// On-disk location, `None` for memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether mutating calls are refused.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            Err(EngineError::ReadOnly)
        } else {
            Ok(())
        }
    }

    // ---------------------------------------------------------------------
    // Sealing
    // ---------------------------------------------------------------------

    fn key_for(&self, passphrase: &[u8]) -> Result<Arc<PassphraseKey>> {
        let id = fingerprint(passphrase, &self.salt);
        let mut keys = self.keys.lock();
        if let Some(key) = keys.get(&id) {
            return Ok(Arc::clone(key));
        }
        let key = Arc::new(PassphraseKey::derive(passphrase, &self.salt, self.kdf)?);
        keys.insert(id, Arc::clone(&key));
        Ok(key)
    }

    /// Seal `plaintext` under `passphrase`, or under the default passphrase
    /// when encryption is enabled and none is given.
    pub(crate) fn seal_body(&self, plaintext: &[u8], passphrase: Option<&[u8]>) -> Result<Body> {
        let fallback = match passphrase {
            None if self.common.read().encrypt => self.passphrases.read().default.clone(),
            _ => None,
        };

        match passphrase.or(fallback.as_ref().map(|p| p.as_slice())) {
            Some(passphrase) => {
                let key = self.key_for(passphrase)?;
                Ok(Body::Sealed(seal(key.symmetric_key(), plaintext)?.into_bytes()))
            }
            None => Ok(Body::Plain(plaintext.to_vec())),
        }
    }

    /// Recover the plaintext of `body`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Undecryptable` if no candidate passphrase opens
    /// a sealed body.
    pub(crate) fn open_body(&self, body: &Body, passphrase: Option<&[u8]>) -> Result<Vec<u8>> {
        let bytes = match body {
            Body::Plain(bytes) => return Ok(bytes.clone()),
            Body::Sealed(bytes) => bytes,
        };

        let sealed = SealedValue::from_bytes(bytes)?;
        let candidates = match passphrase {
            Some(passphrase) => vec![Zeroizing::new(passphrase.to_vec())],
            None => self.passphrases.read().candidates(),
        };

        for candidate in &candidates {
            let key = self.key_for(candidate.as_slice())?;
            if let Ok(plaintext) = open(key.symmetric_key(), &sealed) {
                return Ok(plaintext);
            }
        }
        Err(EngineError::Undecryptable)
    }

    /// Absolute expiry for a write made now.
    pub(crate) fn expiry(&self, explicit: Option<Duration>) -> Option<i64> {
        explicit
            .or(self.common.read().expire)
            .map(|after| deadline(now_millis(), after))
    }

    // ---------------------------------------------------------------------
    // Records
    // ---------------------------------------------------------------------

    fn live_record(&self, key: &[u8]) -> Result<Option<Record>> {
        let Some(bytes) = self.data.get(key).map_err(db_err("Failed to read entry"))? else {
            return Ok(None);
        };
        let record = Record::decode(&bytes)?;
        Ok((!record.is_expired(now_millis())).then_some(record))
    }

    /// Read-modify-write of one entry with compare-and-swap. `f` sees the
    /// stored record, expired or not, and returns the replacement.
    fn modify<F>(&self, key: &[u8], mut f: F) -> Result<(Option<Record>, Option<Record>)>
    where
        F: FnMut(Option<Record>) -> Result<Option<Record>>,
    {
        loop {
            let current = self.data.get(key).map_err(db_err("Failed to read entry"))?;
            let before = current.as_deref().map(Record::decode).transpose()?;
            let after = f(before.clone())?;
            let encoded = after.as_ref().map(Record::encode).transpose()?;

            let swapped = self
                .data
                .compare_and_swap(key, current, encoded)
                .map_err(db_err("Failed to write entry"))?;
            if swapped.is_ok() {
                return Ok((before, after));
            }
        }
    }

    /// Append to the transaction log if one is active and covers `key`.
    pub(crate) fn log(&self, op: TxOp, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        let mut txlog = self.txlog.lock();
        if let Some(log) = txlog.as_mut().filter(|log| log.matches(key)) {
            log.append(op, key, value)?;
        }
        Ok(())
    }

    fn log_record(&self, op: TxOp, key: &[u8], record: Option<&Record>) -> Result<()> {
        let value = record.map(Record::encode).transpose()?;
        self.log(op, key, value.as_deref())
    }

    // ---------------------------------------------------------------------
    // Entries
    // ---------------------------------------------------------------------

    /// Write `value` under `key`.
    ///
    /// Attributes and subkeys of a live previous record are kept.
    pub fn set(&self, key: &[u8], value: &[u8], opts: WriteOptions<'_>) -> Result<()> {
        self.set_until(key, value, opts.passphrase, self.expiry(opts.expire))
    }

    /// [`Engine::set`] with an already computed deadline.
    pub(crate) fn set_until(
        &self,
        key: &[u8],
        value: &[u8],
        passphrase: Option<&[u8]>,
        expires_at: Option<i64>,
    ) -> Result<()> {
        self.ensure_writable()?;

        let body = self.seal_body(value, passphrase)?;
        let common = self.common.read().clone();
        let now = now_millis();

        let (before, after) = self.modify(key, |current| {
            let mut record = Record::new(body.clone(), expires_at);
            if let Some(previous) = current.filter(|r| !r.is_expired(now)) {
                record.attrs = previous.attrs;
                record.subkeys = previous.subkeys;
            }
            if common.mtime {
                record
                    .attrs
                    .insert(MTIME_ATTR.to_string(), Utc::now().to_rfc3339().into_bytes());
            }
            Ok(Some(record))
        })?;

        if common.history {
            if let Some(previous) = before.filter(|r| !r.is_expired(now)) {
                self.keep_history(key, &previous)?;
            }
        }
        self.log_record(TxOp::Set, key, after.as_ref())?;

        debug!(key = %String::from_utf8_lossy(key), sealed = body.is_sealed(), "Set entry");
        Ok(())
    }

    /// Read the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Undecryptable` if the value is sealed and no
    /// candidate passphrase opens it.
    pub fn get(&self, key: &[u8], passphrase: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        match self.live_record(key)? {
            Some(record) => Ok(Some(self.open_body(&record.body, passphrase)?)),
            None => Ok(None),
        }
    }

    /// Whether a live entry exists under `key`.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.live_record(key)?.is_some())
    }

    /// Remove `key`, and with `all_subkeys` every entry reachable through
    /// its subkey lists. Returns whether `key` existed.
    pub fn remove(&self, key: &[u8], all_subkeys: bool) -> Result<bool> {
        self.ensure_writable()?;

        let mut pending = vec![key.to_vec()];
        let mut seen = HashSet::new();
        let mut existed = false;

        while let Some(next) = pending.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            let Some(bytes) = self.data.remove(&next).map_err(db_err("Failed to remove entry"))?
            else {
                continue;
            };
            existed |= next == key;
            self.log(TxOp::Remove, &next, None)?;
            if all_subkeys {
                pending.extend(Record::decode(&bytes)?.subkeys);
            }
        }

        debug!(key = %String::from_utf8_lossy(key), existed, all_subkeys, "Removed entry");
        Ok(existed)
    }

    /// Stored bytes of `key`, expired or not.
    pub(crate) fn snapshot(&self, key: &[u8]) -> Result<Option<sled::IVec>> {
        self.data.get(key).map_err(db_err("Failed to read entry"))
    }

    /// Plaintext of a snapshot, `None` once it has expired.
    pub(crate) fn open_snapshot(
        &self,
        bytes: &[u8],
        passphrase: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>> {
        let record = Record::decode(bytes)?;
        if record.is_expired(now_millis()) {
            return Ok(None);
        }
        Ok(Some(self.open_body(&record.body, passphrase)?))
    }

    /// Remove `key` only while it still holds `expected`. Returns whether
    /// it was removed.
    pub(crate) fn remove_if_unchanged(&self, key: &[u8], expected: &sled::IVec) -> Result<bool> {
        self.ensure_writable()?;

        let swapped = self
            .data
            .compare_and_swap(key, Some(expected), None::<&[u8]>)
            .map_err(db_err("Failed to remove entry"))?;
        if swapped.is_err() {
            debug!(key = %String::from_utf8_lossy(key), "Entry rewritten since read, kept");
            return Ok(false);
        }
        self.log(TxOp::Remove, key, None)?;
        Ok(true)
    }

    /// Move the entry under `key` to `new_key`, replacing any entry there.
    /// Returns whether `key` existed.
    pub fn rename(&self, key: &[u8], new_key: &[u8]) -> Result<bool> {
        self.ensure_writable()?;

        let moved = self
            .data
            .transaction(|tx| -> ConflictableTransactionResult<bool, ()> {
                match tx.remove(key)? {
                    Some(value) => {
                        tx.insert(new_key, value)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            })
            .map_err(|e: TransactionError<()>| {
                EngineError::Database(format!("Failed to rename entry: {:?}", e))
            })?;

        if moved {
            self.log(
                TxOp::Rename {
                    to: new_key.to_vec(),
                },
                key,
                None,
            )?;
        }
        Ok(moved)
    }

    // ---------------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------------

    /// Attach `name = value` to a live entry. Returns `false` if there is no
    /// such entry.
    pub fn set_attribute(&self, key: &[u8], name: &str, value: &[u8]) -> Result<bool> {
        self.ensure_writable()?;

        let now = now_millis();
        let mut found = false;
        let (_, after) = self.modify(key, |current| {
            found = false;
            match current {
                Some(mut record) if !record.is_expired(now) => {
                    found = true;
                    record.attrs.insert(name.to_string(), value.to_vec());
                    Ok(Some(record))
                }
                other => Ok(other),
            }
        })?;

        if found {
            self.log_record(TxOp::Set, key, after.as_ref())?;
        }
        Ok(found)
    }

    /// Attributes of a live entry.
    pub fn attributes(&self, key: &[u8]) -> Result<Option<BTreeMap<String, Vec<u8>>>> {
        Ok(self.live_record(key)?.map(|record| record.attrs))
    }

    // ---------------------------------------------------------------------
    // Subkeys
    // ---------------------------------------------------------------------

    /// Write `subkey` as an entry of its own and list it under `key`.
    ///
    /// A missing parent is created with an empty value.
    pub fn add_subkey(
        &self,
        key: &[u8],
        subkey: &[u8],
        value: &[u8],
        opts: WriteOptions<'_>,
    ) -> Result<()> {
        self.set(subkey, value, opts)?;

        let now = now_millis();
        let (_, after) = self.modify(key, |current| {
            let mut record = current
                .filter(|r| !r.is_expired(now))
                .unwrap_or_else(|| Record::new(Body::Plain(Vec::new()), None));
            if !record.subkeys.iter().any(|s| s.as_slice() == subkey) {
                record.subkeys.push(subkey.to_vec());
            }
            Ok(Some(record))
        })?;
        self.log_record(TxOp::Set, key, after.as_ref())?;

        debug!(
            key = %String::from_utf8_lossy(key),
            subkey = %String::from_utf8_lossy(subkey),
            "Added subkey"
        );
        Ok(())
    }

    /// Live subkeys listed under a live entry.
    pub fn subkeys(&self, key: &[u8]) -> Result<Option<Vec<Vec<u8>>>> {
        let Some(record) = self.live_record(key)? else {
            return Ok(None);
        };
        let mut live = Vec::with_capacity(record.subkeys.len());
        for subkey in record.subkeys {
            if self.live_record(&subkey)?.is_some() {
                live.push(subkey);
            }
        }
        Ok(Some(live))
    }

    /// Unlist `subkey` from `key` and remove its entry. Returns whether it
    /// was listed.
    pub fn remove_subkey(&self, key: &[u8], subkey: &[u8]) -> Result<bool> {
        self.ensure_writable()?;

        let mut listed = false;
        let (_, after) = self.modify(key, |current| {
            listed = false;
            Ok(current.map(|mut record| {
                let before = record.subkeys.len();
                record.subkeys.retain(|s| s.as_slice() != subkey);
                listed = record.subkeys.len() != before;
                record
            }))
        })?;

        if listed {
            self.log_record(TxOp::Set, key, after.as_ref())?;
            self.remove(subkey, false)?;
        }
        Ok(listed)
    }

    // ---------------------------------------------------------------------
    // Cursors
    // ---------------------------------------------------------------------

    /// Cursor on the first live key, `None` for an empty store.
    pub fn first_key(&self) -> Result<Option<Cursor>> {
        Cursor::over_keys(&self.data)
    }

    /// Cursor on the first live subkey of `key`, `None` if `key` is absent
    /// or lists no live subkey.
    pub fn first_subkey(&self, key: &[u8]) -> Result<Option<Cursor>> {
        match self.live_record(key)? {
            Some(record) => Cursor::over_subkeys(&self.data, record.subkeys),
            None => Ok(None),
        }
    }

    // ---------------------------------------------------------------------
    // Queues
    // ---------------------------------------------------------------------

    /// Handle on the value queue with this ordering and prefix.
    pub fn value_queue(
        &self,
        ordering: QueueOrdering,
        prefix: Option<&[u8]>,
    ) -> Result<QueueHandle<'_>> {
        QueueHandle::new(self, ordering, prefix)
    }

    /// Handle on the key queue with this ordering and prefix.
    pub fn key_queue(
        &self,
        ordering: QueueOrdering,
        prefix: Option<&[u8]>,
    ) -> Result<KeyQueueHandle<'_>> {
        KeyQueueHandle::new(self, ordering, prefix)
    }

    // ---------------------------------------------------------------------
    // Passphrases and common attributes
    // ---------------------------------------------------------------------

    /// Register a passphrase tried when reading sealed values.
    pub fn add_decryption_passphrase(&self, passphrase: &[u8]) {
        let mut known = self.passphrases.write();
        if !known.decrypt.iter().any(|p| p.as_slice() == passphrase) {
            known.decrypt.push(Zeroizing::new(passphrase.to_vec()));
        }
    }

    /// Set the passphrase used for encryption-enabled writes. It is also
    /// tried first when reading.
    pub fn set_default_passphrase(&self, passphrase: &[u8]) {
        self.passphrases.write().default = Some(Zeroizing::new(passphrase.to_vec()));
    }

    /// Load passphrases from a file, one per line. The first line becomes
    /// the default passphrase and every line a decryption passphrase.
    /// Returns the number loaded.
    pub fn load_passphrase_file(&self, path: &Path) -> Result<usize> {
        let contents = Zeroizing::new(std::fs::read_to_string(path)?);
        let lines: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let Some(first) = lines.first() else {
            return Err(EngineError::EmptyPassphraseFile(path.to_path_buf()));
        };
        self.set_default_passphrase(first.as_bytes());
        for line in &lines {
            self.add_decryption_passphrase(line.as_bytes());
        }

        info!(path = %path.display(), count = lines.len(), "Loaded passphrase file");
        Ok(lines.len())
    }

    /// Seal writes without an explicit passphrase under the default one.
    pub fn set_encryption(&self, enabled: bool) {
        self.common.write().encrypt = enabled;
    }

    /// Stamp an `mtime` attribute on every write.
    pub fn set_mtime(&self, enabled: bool) {
        self.common.write().mtime = enabled;
    }

    /// Keep superseded values in the history tree.
    pub fn set_history(&self, enabled: bool) {
        self.common.write().history = enabled;
    }

    /// Expire writes without an explicit expiration after `after`.
    pub fn set_expiration(&self, after: Option<Duration>) {
        self.common.write().expire = after;
    }

    fn history_prefix(key: &[u8]) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(4 + key.len());
        prefix.extend_from_slice(&(key.len() as u32).to_be_bytes());
        prefix.extend_from_slice(key);
        prefix
    }

    fn keep_history(&self, key: &[u8], previous: &Record) -> Result<()> {
        let mut history_key = Self::history_prefix(key);
        let id = self.db.generate_id().map_err(db_err("Failed to allocate history id"))?;
        history_key.extend_from_slice(&id.to_be_bytes());
        self.history
            .insert(history_key, previous.encode()?)
            .map_err(db_err("Failed to store history"))?;
        Ok(())
    }

    /// Superseded values of `key`, newest first. Values that cannot be
    /// opened are left out.
    pub fn history(&self, key: &[u8], passphrase: Option<&[u8]>) -> Result<Vec<Vec<u8>>> {
        let mut values = Vec::new();
        for item in self.history.scan_prefix(Self::history_prefix(key)).rev() {
            let (_, bytes) = item.map_err(db_err("Failed to read history"))?;
            match self.open_body(&Record::decode(&bytes)?.body, passphrase) {
                Ok(value) => values.push(value),
                Err(EngineError::Undecryptable) => {
                    debug!(key = %String::from_utf8_lossy(key), "Skipping sealed history value");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(values)
    }

    // ---------------------------------------------------------------------
    // Transaction log
    // ---------------------------------------------------------------------

    /// Start logging mutations of keys under `prefix` to `path`. An active
    /// log is finished first.
    pub fn begin_transaction(
        &self,
        path: &Path,
        prefix: Option<&[u8]>,
        param: Option<&[u8]>,
        expire: Option<Duration>,
    ) -> Result<()> {
        self.ensure_writable()?;

        let log = TxLog::begin(path, prefix, param, expire)?;
        if let Some(previous) = self.txlog.lock().replace(log) {
            previous.finish()?;
        }
        info!(path = %path.display(), "Transaction log started");
        Ok(())
    }

    /// Stop logging. Returns whether a log was active.
    pub fn stop_transaction(&self) -> Result<bool> {
        match self.txlog.lock().take() {
            Some(log) => {
                let path = log.path().to_path_buf();
                log.finish()?;
                info!(path = %path.display(), "Transaction log stopped");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Path of the active transaction log.
    pub fn transaction_log_path(&self) -> Option<PathBuf> {
        self.txlog.lock().as_ref().map(|log| log.path().to_path_buf())
    }

    // ---------------------------------------------------------------------
    // Archives and stats
    // ---------------------------------------------------------------------

    /// Write every entry and queue slot to an archive file. Returns the
    /// number written.
    pub fn dump_to_file(&self, path: &Path, skip_errors: bool) -> Result<usize> {
        let written = archive::dump(
            &[(DATA_TAG, &self.data), (QUEUE_TAG, &self.queues)],
            path,
            skip_errors,
        )?;
        info!(path = %path.display(), written, "Dumped store");
        Ok(written)
    }

    /// Load an archive file written by [`Engine::dump_to_file`]. Returns the
    /// number loaded.
    pub fn load_from_file(&self, path: &Path, skip_errors: bool) -> Result<usize> {
        self.ensure_writable()?;
        let loaded = archive::load(&self.data, &self.queues, path, skip_errors)?;
        info!(path = %path.display(), loaded, "Loaded archive");
        Ok(loaded)
    }

    /// Live entry and queue element counts and disk usage.
    pub fn stats(&self) -> Result<StoreStats> {
        let now = now_millis();
        let count_live = |tree: &sled::Tree| -> Result<usize> {
            let mut live = 0;
            for item in tree.iter() {
                let (_, bytes) = item.map_err(db_err("Failed to count entries"))?;
                if !Record::decode(&bytes)?.is_expired(now) {
                    live += 1;
                }
            }
            Ok(live)
        };

        Ok(StoreStats {
            keys: count_live(&self.data)?,
            queued: count_live(&self.queues)?,
            size_on_disk: self
                .db
                .size_on_disk()
                .map_err(db_err("Failed to read disk usage"))?,
        })
    }
}
