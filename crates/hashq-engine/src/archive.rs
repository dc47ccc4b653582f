//! Archive files.
//!
//! An archive is the magic header followed by one frame per stored entry:
//! `[tree tag: u8][key len: u32 LE][key][value len: u32 LE][value]`.
//! Values are raw records, so sealed values stay sealed.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use tracing::warn;

use crate::error::db_err;
use crate::record::{Record, MAX_RECORD_SIZE};
use crate::{EngineError, Result};

const MAGIC: &[u8; 8] = b"HASHQAR1";

/// Tree tag for store entries.
pub(crate) const DATA_TAG: u8 = 0;
/// Tree tag for queue slots.
pub(crate) const QUEUE_TAG: u8 = 1;

/// Write every entry of `trees` to `path`. Returns the number of frames.
pub(crate) fn dump(trees: &[(u8, &sled::Tree)], path: &Path, skip_errors: bool) -> Result<usize> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(MAGIC)?;

    let mut written = 0;
    for (tag, tree) in trees {
        for item in tree.iter() {
            let (key, value) = match item {
                Ok(pair) => pair,
                Err(e) if skip_errors => {
                    warn!(error = %e, "Skipping unreadable entry while dumping");
                    continue;
                }
                Err(e) => return Err(db_err("Failed to iterate for dump")(e)),
            };
            write_frame(&mut out, *tag, &key, &value)?;
            written += 1;
        }
    }

    out.flush()?;
    Ok(written)
}

/// Load frames from `path` into the tree matching each frame's tag.
/// Returns the number of entries loaded.
pub(crate) fn load(
    data: &sled::Tree,
    queues: &sled::Tree,
    path: &Path,
    skip_errors: bool,
) -> Result<usize> {
    let mut input = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 8];
    input.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(EngineError::Corruption("Not an archive file".into()));
    }

    let mut loaded = 0;
    loop {
        let frame = match read_frame(&mut input) {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) if skip_errors => {
                warn!(error = %e, "Stopping at unreadable archive frame");
                break;
            }
            Err(e) => return Err(e),
        };
        let (tag, key, value) = frame;

        let tree = match tag {
            DATA_TAG => data,
            QUEUE_TAG => queues,
            other => {
                if skip_errors {
                    warn!(tag = other, "Skipping archive frame with unknown tag");
                    continue;
                }
                return Err(EngineError::Corruption(format!("Unknown archive tag {}", other)));
            }
        };

        if let Err(e) = Record::decode(&value) {
            if skip_errors {
                warn!(key = %String::from_utf8_lossy(&key), error = %e, "Skipping undecodable archive entry");
                continue;
            }
            return Err(e);
        }

        tree.insert(key, value)
            .map_err(db_err("Failed to load archive entry"))?;
        loaded += 1;
    }

    Ok(loaded)
}

fn write_frame(out: &mut impl Write, tag: u8, key: &[u8], value: &[u8]) -> Result<()> {
    out.write_all(&[tag])?;
    for part in [key, value] {
        let len = u32::try_from(part.len())
            .map_err(|_| EngineError::Serialization("Archive entry too large".into()))?;
        out.write_all(&len.to_le_bytes())?;
        out.write_all(part)?;
    }
    Ok(())
}

fn read_frame(input: &mut impl Read) -> Result<Option<(u8, Vec<u8>, Vec<u8>)>> {
    let mut tag = [0u8; 1];
    match input.read_exact(&mut tag) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let key = read_part(input)?;
    let value = read_part(input)?;
    Ok(Some((tag[0], key, value)))
}

fn read_part(input: &mut impl Read) -> Result<Vec<u8>> {
    let mut len = [0u8; 4];
    input.read_exact(&mut len)?;
    let len = u64::from(u32::from_le_bytes(len));
    if len > MAX_RECORD_SIZE {
        return Err(EngineError::Corruption(format!("Archive part of {} bytes", len)));
    }
    let mut part = vec![0u8; len as usize];
    input.read_exact(&mut part)?;
    Ok(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Body;
    use tempfile::TempDir;

    fn trees() -> (sled::Db, sled::Tree, sled::Tree) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let data = db.open_tree("data").unwrap();
        let queues = db.open_tree("queues").unwrap();
        (db, data, queues)
    }

    fn record(value: &[u8]) -> Vec<u8> {
        Record::new(Body::Plain(value.to_vec()), None).encode().unwrap()
    }

    #[test]
    fn test_dump_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.ar");

        let (_db, data, queues) = trees();
        data.insert(b"a", record(b"1")).unwrap();
        data.insert(b"b", record(b"2")).unwrap();
        queues.insert(b"q", record(b"3")).unwrap();

        let written = dump(&[(DATA_TAG, &data), (QUEUE_TAG, &queues)], &path, false).unwrap();
        assert_eq!(written, 3);

        let (_db2, data2, queues2) = trees();
        assert_eq!(load(&data2, &queues2, &path, false).unwrap(), 3);
        assert_eq!(data2.get(b"a").unwrap().unwrap().to_vec(), record(b"1"));
        assert_eq!(queues2.get(b"q").unwrap().unwrap().to_vec(), record(b"3"));
    }

    #[test]
    fn test_load_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foreign");
        std::fs::write(&path, b"definitely not an archive").unwrap();

        let (_db, data, queues) = trees();
        assert!(matches!(
            load(&data, &queues, &path, true),
            Err(EngineError::Corruption(_))
        ));
    }

    #[test]
    fn test_bad_entry_skipped_or_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.ar");

        let mut out = File::create(&path).unwrap();
        out.write_all(MAGIC).unwrap();
        write_frame(&mut out, DATA_TAG, b"bad", &[0xFF; 6]).unwrap();
        write_frame(&mut out, DATA_TAG, b"good", &record(b"ok")).unwrap();
        drop(out);

        let (_db, data, queues) = trees();
        assert!(load(&data, &queues, &path, false).is_err());

        let (_db2, data2, queues2) = trees();
        assert_eq!(load(&data2, &queues2, &path, true).unwrap(), 1);
        assert!(data2.get(b"good").unwrap().is_some());
        assert!(data2.get(b"bad").unwrap().is_none());
    }

    #[test]
    fn test_truncated_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.ar");

        let mut out = File::create(&path).unwrap();
        out.write_all(MAGIC).unwrap();
        write_frame(&mut out, DATA_TAG, b"good", &record(b"ok")).unwrap();
        out.write_all(&[DATA_TAG, 9, 0]).unwrap();
        drop(out);

        let (_db, data, queues) = trees();
        assert!(load(&data, &queues, &path, false).is_err());

        let (_db2, data2, queues2) = trees();
        assert_eq!(load(&data2, &queues2, &path, true).unwrap(), 1);
    }
}
