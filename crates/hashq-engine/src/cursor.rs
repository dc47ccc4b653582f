//! Key enumeration cursors.
//!
//! A [`Cursor`] always sits on a live key. Advancing consumes it and yields
//! the next cursor, or `None` once the enumeration is exhausted, so a spent
//! cursor cannot be reused.

use crate::error::db_err;
use crate::record::{now_millis, Record};
use crate::Result;

/// What a cursor walks over.
enum Source {
    /// Every key of the data tree, in sled's byte order.
    Keys(sled::Iter),
    /// The subkey list of one parent entry, in insertion order.
    Subkeys {
        tree: sled::Tree,
        rest: std::vec::IntoIter<Vec<u8>>,
    },
}

impl Source {
    /// Next key whose record is present and not expired.
    fn next_live(&mut self) -> Result<Option<Vec<u8>>> {
        let now = now_millis();
        match self {
            Self::Keys(iter) => {
                for item in iter.by_ref() {
                    let (key, value) = item.map_err(db_err("Failed to iterate keys"))?;
                    if !Record::decode(&value)?.is_expired(now) {
                        return Ok(Some(key.to_vec()));
                    }
                }
                Ok(None)
            }
            Self::Subkeys { tree, rest } => {
                for key in rest.by_ref() {
                    let live = match tree.get(&key).map_err(db_err("Failed to read subkey"))? {
                        Some(value) => !Record::decode(&value)?.is_expired(now),
                        None => false,
                    };
                    if live {
                        return Ok(Some(key));
                    }
                }
                Ok(None)
            }
        }
    }
}

/// A position in a key enumeration.
pub struct Cursor {
    key: Vec<u8>,
    source: Source,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("key", &String::from_utf8_lossy(&self.key))
            .finish_non_exhaustive()
    }
}

impl Cursor {
    pub(crate) fn over_keys(tree: &sled::Tree) -> Result<Option<Self>> {
        Self::seek(Source::Keys(tree.iter()))
    }

    pub(crate) fn over_subkeys(tree: &sled::Tree, subkeys: Vec<Vec<u8>>) -> Result<Option<Self>> {
        Self::seek(Source::Subkeys {
            tree: tree.clone(),
            rest: subkeys.into_iter(),
        })
    }

    fn seek(mut source: Source) -> Result<Option<Self>> {
        Ok(source.next_live()?.map(|key| Self { key, source }))
    }

    /// The key under the cursor.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Move to the next live key.
    pub fn advance(self) -> Result<Option<Self>> {
        Self::seek(self.source)
    }
}
