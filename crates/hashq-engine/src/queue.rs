//! Ordered queues over the `queues` tree.
//!
//! Each element occupies one slot whose key is the queue id followed by a
//! big-endian `u64` sequence number, so sled's byte order is queue order and
//! the head is always the lowest sequence. The first element of an empty
//! queue takes the middle of the sequence space; FIFO pushes grow it
//! upwards, LIFO pushes downwards.
//!
//! Queue id layout: `[kind: u8][prefix len: u16 BE][prefix]`. The length
//! field keeps a prefix from matching the slots of a longer prefix.
//!
//! Inserts and pops are compare-and-swap on the slot key, so handles on the
//! same queue never duplicate or lose an element.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::Engine;
use crate::error::db_err;
use crate::options::WriteOptions;
use crate::record::{now_millis, Body, Record};
use crate::txlog::TxOp;
use crate::{EngineError, Result};

/// Longest prefix a queue id can carry.
pub const MAX_PREFIX_LEN: usize = u16::MAX as usize;

/// Sequence number of the first element of an empty queue.
const FIRST_SEQ: u64 = 1 << 63;

/// Where pushes land.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueOrdering {
    /// Push at the tail.
    #[default]
    Fifo,
    /// Push at the head.
    Lifo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueueKind {
    Value,
    Key,
}

impl QueueKind {
    fn tag(self) -> u8 {
        match self {
            Self::Value => b'v',
            Self::Key => b'k',
        }
    }
}

/// A slot as read from the tree.
struct Slot {
    key: sled::IVec,
    raw: sled::IVec,
    record: Record,
}

/// The slots of one queue.
struct Slots<'e> {
    engine: &'e Engine,
    kind: QueueKind,
    ordering: QueueOrdering,
    id: Vec<u8>,
}

impl<'e> Slots<'e> {
    fn new(
        engine: &'e Engine,
        kind: QueueKind,
        ordering: QueueOrdering,
        prefix: Option<&[u8]>,
    ) -> Result<Self> {
        let prefix = prefix.unwrap_or_default();
        if prefix.len() > MAX_PREFIX_LEN {
            return Err(EngineError::InvalidQueuePrefix(prefix.len()));
        }

        let mut id = Vec::with_capacity(3 + prefix.len());
        id.push(kind.tag());
        id.extend_from_slice(&(prefix.len() as u16).to_be_bytes());
        id.extend_from_slice(prefix);

        Ok(Self {
            engine,
            kind,
            ordering,
            id,
        })
    }

    fn tree(&self) -> &sled::Tree {
        &self.engine.queues
    }

    fn slot_key(&self, seq: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.id.len() + 8);
        key.extend_from_slice(&self.id);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn seq_of(&self, key: &[u8]) -> Result<u64> {
        key.get(self.id.len()..)
            .and_then(|tail| <[u8; 8]>::try_from(tail).ok())
            .map(u64::from_be_bytes)
            .ok_or_else(|| EngineError::Corruption("Malformed queue slot key".into()))
    }

    /// Store `record` at the insertion end. Returns the slot key.
    fn insert(&self, record: &Record) -> Result<Vec<u8>> {
        let value = record.encode()?;

        loop {
            let mut slots = self.tree().scan_prefix(&self.id);
            let edge = match self.ordering {
                QueueOrdering::Fifo => slots.next_back(),
                QueueOrdering::Lifo => slots.next(),
            };

            let seq = match edge {
                None => FIRST_SEQ,
                Some(item) => {
                    let (key, _) = item.map_err(db_err("Failed to scan queue"))?;
                    let edge_seq = self.seq_of(&key)?;
                    match self.ordering {
                        QueueOrdering::Fifo => edge_seq.checked_add(1),
                        QueueOrdering::Lifo => edge_seq.checked_sub(1),
                    }
                    .ok_or(EngineError::QueueExhausted)?
                }
            };

            let key = self.slot_key(seq);
            let swapped = self
                .tree()
                .compare_and_swap(&key, None::<&[u8]>, Some(value.clone()))
                .map_err(db_err("Failed to push"))?;
            if swapped.is_ok() {
                self.engine.log(TxOp::QueuePush, &key, Some(value.as_slice()))?;
                return Ok(key);
            }
        }
    }

    /// Live slots from the head.
    fn live(&self) -> impl Iterator<Item = Result<Slot>> + '_ {
        let now = now_millis();
        self.tree()
            .scan_prefix(&self.id)
            .map(|item| -> Result<Slot> {
                let (key, raw) = item.map_err(db_err("Failed to scan queue"))?;
                let record = Record::decode(&raw)?;
                Ok(Slot { key, raw, record })
            })
            .filter(move |slot| !matches!(slot, Ok(slot) if slot.record.is_expired(now)))
    }

    fn count(&self) -> Result<usize> {
        let mut count = 0;
        for slot in self.live() {
            slot?;
            count += 1;
        }
        Ok(count)
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.live().next().transpose()?.is_none())
    }

    fn nth(&self, position: usize) -> Result<Option<Record>> {
        for (index, slot) in self.live().enumerate() {
            let slot = slot?;
            if index == position {
                return Ok(Some(slot.record));
            }
        }
        Ok(None)
    }

    /// Remove the head and return `take(record)`.
    ///
    /// `take` runs before the slot is removed, so an element it rejects
    /// stays queued. Expired slots met on the way are purged.
    fn take_head<T>(&self, mut take: impl FnMut(&Record) -> Result<T>) -> Result<Option<T>> {
        let now = now_millis();

        'scan: loop {
            for item in self.tree().scan_prefix(&self.id) {
                let (key, raw) = item.map_err(db_err("Failed to scan queue"))?;
                let record = Record::decode(&raw)?;

                let taken = if record.is_expired(now) {
                    None
                } else {
                    Some(take(&record)?)
                };

                let swapped = self
                    .tree()
                    .compare_and_swap(&key, Some(&raw), None::<&[u8]>)
                    .map_err(db_err("Failed to pop"))?;
                if swapped.is_err() {
                    // Another handle took this slot first.
                    continue 'scan;
                }

                self.engine.log(TxOp::QueuePop, &key, None)?;
                match taken {
                    Some(value) => return Ok(Some(value)),
                    None => {
                        let seq = self.seq_of(&key)?;
                        debug!(seq, "Purged expired queue slot");
                    }
                }
            }
            return Ok(None);
        }
    }

    fn dump(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(
            out,
            "queue kind={:?} ordering={:?} prefix={:?}",
            self.kind,
            self.ordering,
            String::from_utf8_lossy(&self.id[3..])
        )?;
        for (position, slot) in self.live().enumerate() {
            let Slot { key, raw, record } = slot?;
            let shown = match (&record.body, self.kind) {
                (Body::Plain(stored_key), QueueKind::Key) => {
                    format!("key={:?}", String::from_utf8_lossy(stored_key))
                }
                (Body::Plain(bytes), QueueKind::Value) => format!("bytes={}", bytes.len()),
                (Body::Sealed(bytes), _) => format!("sealed bytes={}", bytes.len()),
            };
            writeln!(
                out,
                "  [{}] seq={:#x} {} attrs={} expires_at={:?} stored={}",
                position,
                self.seq_of(&key)?,
                shown,
                record.attrs.len(),
                record.expires_at,
                raw.len()
            )?;
        }
        Ok(())
    }
}

/// One value queue element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueElement {
    /// The element's bytes.
    pub payload: Vec<u8>,
    /// Attributes pushed with the element.
    pub attributes: BTreeMap<String, Vec<u8>>,
}

/// Handle on a queue of values.
pub struct QueueHandle<'e> {
    slots: Slots<'e>,
}

impl std::fmt::Debug for QueueHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("ordering", &self.slots.ordering)
            .field("id", &String::from_utf8_lossy(&self.slots.id))
            .finish()
    }
}

impl<'e> QueueHandle<'e> {
    pub(crate) fn new(
        engine: &'e Engine,
        ordering: QueueOrdering,
        prefix: Option<&[u8]>,
    ) -> Result<Self> {
        Ok(Self {
            slots: Slots::new(engine, QueueKind::Value, ordering, prefix)?,
        })
    }

    /// The handle's ordering.
    pub fn ordering(&self) -> QueueOrdering {
        self.slots.ordering
    }

    /// Push one element with its attributes in a single insert.
    pub fn push(
        &self,
        payload: &[u8],
        attributes: BTreeMap<String, Vec<u8>>,
        opts: WriteOptions<'_>,
    ) -> Result<()> {
        let engine = self.slots.engine;
        engine.ensure_writable()?;

        let mut record = Record::new(
            engine.seal_body(payload, opts.passphrase)?,
            engine.expiry(opts.expire),
        );
        record.attrs = attributes;

        let key = self.slots.insert(&record)?;
        let seq = self.slots.seq_of(&key)?;
        debug!(
            seq,
            sealed = record.body.is_sealed(),
            "Pushed queue element"
        );
        Ok(())
    }

    fn open(&self, record: &Record, passphrase: Option<&[u8]>) -> Result<QueueElement> {
        Ok(QueueElement {
            payload: self.slots.engine.open_body(&record.body, passphrase)?,
            attributes: record.attrs.clone(),
        })
    }

    /// Element at `position` from the head, without removing it.
    pub fn read(&self, position: usize, passphrase: Option<&[u8]>) -> Result<Option<QueueElement>> {
        match self.slots.nth(position)? {
            Some(record) => Ok(Some(self.open(&record, passphrase)?)),
            None => Ok(None),
        }
    }

    /// Remove and return the head. `None` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Undecryptable` if the head cannot be opened;
    /// the element stays queued.
    pub fn pop(&self, passphrase: Option<&[u8]>) -> Result<Option<QueueElement>> {
        self.slots.engine.ensure_writable()?;
        self.slots.take_head(|record| self.open(record, passphrase))
    }

    /// Remove up to `count` elements from the head. Returns how many went.
    pub fn remove(&self, count: usize) -> Result<usize> {
        self.slots.engine.ensure_writable()?;
        let mut removed = 0;
        while removed < count && self.slots.take_head(|_| Ok(()))?.is_some() {
            removed += 1;
        }
        Ok(removed)
    }

    /// Number of live elements.
    pub fn count(&self) -> Result<usize> {
        self.slots.count()
    }

    /// Whether no live element is queued.
    pub fn is_empty(&self) -> Result<bool> {
        self.slots.is_empty()
    }

    /// Write a description of every live element to `out`.
    pub fn dump(&self, out: &mut dyn Write) -> Result<()> {
        self.slots.dump(out)
    }
}

/// Handle on a queue of keys whose values are ordinary store entries.
pub struct KeyQueueHandle<'e> {
    slots: Slots<'e>,
}

impl std::fmt::Debug for KeyQueueHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyQueueHandle")
            .field("ordering", &self.slots.ordering)
            .field("id", &String::from_utf8_lossy(&self.slots.id))
            .finish()
    }
}

/// A queued key resolved against the data tree.
struct Resolved {
    key: Vec<u8>,
    value: Vec<u8>,
    snapshot: Option<sled::IVec>,
}

fn queued_key(record: &Record) -> Result<Vec<u8>> {
    match &record.body {
        Body::Plain(key) => Ok(key.clone()),
        Body::Sealed(_) => Err(EngineError::Corruption("Sealed key queue slot".into())),
    }
}

impl<'e> KeyQueueHandle<'e> {
    pub(crate) fn new(
        engine: &'e Engine,
        ordering: QueueOrdering,
        prefix: Option<&[u8]>,
    ) -> Result<Self> {
        Ok(Self {
            slots: Slots::new(engine, QueueKind::Key, ordering, prefix)?,
        })
    }

    /// The handle's ordering.
    pub fn ordering(&self) -> QueueOrdering {
        self.slots.ordering
    }

    /// Store `value` under `key`, then queue `key`. Entry and slot share
    /// one deadline.
    pub fn push(&self, key: &[u8], value: &[u8], opts: WriteOptions<'_>) -> Result<()> {
        let engine = self.slots.engine;
        let expires_at = engine.expiry(opts.expire);
        engine.set_until(key, value, opts.passphrase, expires_at)?;

        let record = Record::new(Body::Plain(key.to_vec()), expires_at);
        let slot = self.slots.insert(&record)?;
        let seq = self.slots.seq_of(&slot)?;
        debug!(
            seq,
            key = %String::from_utf8_lossy(key),
            "Pushed queue key"
        );
        Ok(())
    }

    /// Key, value and entry snapshot of a queued key. A vanished entry
    /// reads as an empty value.
    fn resolve(&self, record: &Record, passphrase: Option<&[u8]>) -> Result<Resolved> {
        let engine = self.slots.engine;
        let key = queued_key(record)?;
        let snapshot = engine.snapshot(&key)?;
        let value = match &snapshot {
            Some(bytes) => engine.open_snapshot(bytes, passphrase)?.unwrap_or_default(),
            None => Vec::new(),
        };
        Ok(Resolved {
            key,
            value,
            snapshot,
        })
    }

    /// Delete the entry behind a taken slot unless it was rewritten since.
    fn discard(&self, key: &[u8], snapshot: Option<&sled::IVec>) -> Result<()> {
        if let Some(expected) = snapshot {
            self.slots.engine.remove_if_unchanged(key, expected)?;
        }
        Ok(())
    }

    /// Pair at `position` from the head, without removing it.
    pub fn read(
        &self,
        position: usize,
        passphrase: Option<&[u8]>,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        match self.slots.nth(position)? {
            Some(record) => {
                let Resolved { key, value, .. } = self.resolve(&record, passphrase)?;
                Ok(Some((key, value)))
            }
            None => Ok(None),
        }
    }

    /// Remove the head, delete its entry and return the pair.
    ///
    /// The entry is only deleted if it still holds the value returned.
    pub fn pop(&self, passphrase: Option<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.slots.engine.ensure_writable()?;
        let Some(resolved) = self
            .slots
            .take_head(|record| self.resolve(record, passphrase))?
        else {
            return Ok(None);
        };
        self.discard(&resolved.key, resolved.snapshot.as_ref())?;
        Ok(Some((resolved.key, resolved.value)))
    }

    /// Remove up to `count` heads and their entries. Returns how many went.
    pub fn remove(&self, count: usize) -> Result<usize> {
        let engine = self.slots.engine;
        engine.ensure_writable()?;

        let mut removed = 0;
        while removed < count {
            let taken = self.slots.take_head(|record| {
                let key = queued_key(record)?;
                let snapshot = engine.snapshot(&key)?;
                Ok((key, snapshot))
            })?;
            let Some((key, snapshot)) = taken else {
                break;
            };
            self.discard(&key, snapshot.as_ref())?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Number of live queued keys.
    pub fn count(&self) -> Result<usize> {
        self.slots.count()
    }

    /// Whether no live key is queued.
    pub fn is_empty(&self) -> Result<bool> {
        self.slots.is_empty()
    }

    /// Write a description of every live slot to `out`.
    pub fn dump(&self, out: &mut dyn Write) -> Result<()> {
        self.slots.dump(out)
    }
}
