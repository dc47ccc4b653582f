//! Transaction log.
//!
//! While a log is active every successful mutation of a key under the log's
//! prefix appends one [`TxRecord`] frame to the log file. A frame is a
//! little-endian `u32` length followed by the bincode-encoded record.
//! Values are logged as stored, so sealed values stay sealed in the log.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::record::{deadline, now_millis, MAX_RECORD_SIZE};
use crate::{EngineError, Result};

/// Largest frame accepted when reading a log back.
const MAX_FRAME_SIZE: u64 = 2 * MAX_RECORD_SIZE;

/// Kind of logged mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOp {
    /// A value or its attributes were written.
    Set,
    /// A key was removed.
    Remove,
    /// A key was renamed to `to`.
    Rename {
        /// The new key.
        to: Vec<u8>,
    },
    /// An element was appended to a queue slot.
    QueuePush,
    /// An element was taken from a queue slot.
    QueuePop,
}

/// One logged mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    /// What happened.
    pub op: TxOp,
    /// The affected key (or queue slot key).
    pub key: Vec<u8>,
    /// The stored record bytes after the mutation, if any.
    pub value: Option<Vec<u8>>,
    /// Unix milliseconds of the mutation.
    pub at: i64,
    /// When consumers should stop replaying this record.
    pub expires_at: Option<i64>,
    /// Free-form parameter given when the log was started.
    pub param: Option<Vec<u8>>,
}

/// An open transaction log.
pub struct TxLog {
    path: PathBuf,
    writer: BufWriter<File>,
    prefix: Option<Vec<u8>>,
    param: Option<Vec<u8>>,
    expire: Option<Duration>,
}

impl std::fmt::Debug for TxLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxLog")
            .field("path", &self.path)
            .field("prefix", &self.prefix.as_ref().map(|p| String::from_utf8_lossy(p)))
            .finish_non_exhaustive()
    }
}

impl TxLog {
    /// Open (or create) a log file for appending.
    pub fn begin(
        path: &Path,
        prefix: Option<&[u8]>,
        param: Option<&[u8]>,
        expire: Option<Duration>,
    ) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            prefix: prefix.map(<[u8]>::to_vec),
            param: param.map(<[u8]>::to_vec),
            expire,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether mutations of `key` are logged.
    pub fn matches(&self, key: &[u8]) -> bool {
        self.prefix.as_deref().map_or(true, |prefix| key.starts_with(prefix))
    }

    /// Append one frame and flush it to the file.
    pub fn append(&mut self, op: TxOp, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        let at = now_millis();
        let record = TxRecord {
            op,
            key: key.to_vec(),
            value: value.map(<[u8]>::to_vec),
            at,
            expires_at: self.expire.map(|after| deadline(at, after)),
            param: self.param.clone(),
        };

        let frame = bincode::serialize(&record)
            .map_err(|e| EngineError::Serialization(format!("Failed to encode log record: {}", e)))?;
        let len = u32::try_from(frame.len())
            .map_err(|_| EngineError::Serialization("Log record too large".into()))?;

        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and sync the log file.
    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Read every complete frame from a log file.
    ///
    /// A truncated trailing frame (a crash mid-append) ends the read without
    /// an error.
    pub fn read_all(path: &Path) -> Result<Vec<TxRecord>> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();

        loop {
            let mut len = [0u8; 4];
            match reader.read_exact(&mut len) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u64::from(u32::from_le_bytes(len));
            if len > MAX_FRAME_SIZE {
                return Err(EngineError::Corruption(format!("Log frame of {} bytes", len)));
            }

            let mut frame = vec![0u8; len as usize];
            match reader.read_exact(&mut frame) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let record = bincode::deserialize(&frame)
                .map_err(|e| EngineError::Corruption(format!("Bad log frame: {}", e)))?;
            records.push(record);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tx.log");

        let mut log = TxLog::begin(&path, None, Some(b"replica-1".as_slice()), None).unwrap();
        log.append(TxOp::Set, b"k1", Some(b"v1".as_slice())).unwrap();
        log.append(TxOp::Remove, b"k1", None).unwrap();
        log.finish().unwrap();

        let records = TxLog::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].op, TxOp::Set);
        assert_eq!(records[0].value.as_deref(), Some(b"v1".as_slice()));
        assert_eq!(records[1].op, TxOp::Remove);
        assert_eq!(records[1].param.as_deref(), Some(b"replica-1".as_slice()));
    }

    #[test]
    fn test_prefix_filter() {
        let dir = TempDir::new().unwrap();
        let log = TxLog::begin(&dir.path().join("tx.log"), Some(b"user:".as_slice()), None, None).unwrap();

        assert!(log.matches(b"user:alice"));
        assert!(!log.matches(b"group:admins"));
    }

    #[test]
    fn test_expiry_is_stamped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tx.log");

        let mut log = TxLog::begin(&path, None, None, Some(Duration::from_secs(60))).unwrap();
        log.append(TxOp::Set, b"k", Some(b"v".as_slice())).unwrap();
        log.finish().unwrap();

        let record = &TxLog::read_all(&path).unwrap()[0];
        assert_eq!(record.expires_at, Some(record.at + 60_000));
    }

    #[test]
    fn test_truncated_tail_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tx.log");

        let mut log = TxLog::begin(&path, None, None, None).unwrap();
        log.append(TxOp::Set, b"k", Some(b"v".as_slice())).unwrap();
        log.finish().unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&100u32.to_le_bytes()).unwrap();
        file.write_all(b"partial").unwrap();

        assert_eq!(TxLog::read_all(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tx.log");

        for key in [b"a", b"b"] {
            let mut log = TxLog::begin(&path, None, None, None).unwrap();
            log.append(TxOp::Set, key, None).unwrap();
            log.finish().unwrap();
        }

        let keys: Vec<_> = TxLog::read_all(&path).unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
