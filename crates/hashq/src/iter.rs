//! Key iteration.

use std::iter::FusedIterator;
use std::marker::PhantomData;

use hashq_engine::{Cursor, EngineError};

use crate::store::require;
use crate::{text, Error, Result, Store};

enum State {
    Positioned(Cursor),
    /// Advancing failed; the error is yielded on the next call.
    Failed(EngineError),
    Exhausted,
}

/// Iterator over the live keys of a store, or the live subkeys of one key.
///
/// Each live key is yielded exactly once. Once `None` is returned the
/// iterator stays exhausted; ask the store for a new one to start over.
pub struct KeyIterator<'a> {
    state: State,
    _store: PhantomData<&'a Store>,
}

impl std::fmt::Debug for KeyIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Positioned(cursor) => format!("{:?}", cursor),
            State::Failed(e) => format!("Failed({})", e),
            State::Exhausted => "Exhausted".into(),
        };
        f.debug_struct("KeyIterator").field("state", &state).finish()
    }
}

impl<'a> KeyIterator<'a> {
    /// Position on the first key, or on the first live subkey of `scope`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandle` if `scope` is absent or lists no live
    /// subkey.
    pub fn new(store: &'a Store, scope: Option<&str>) -> Result<Self> {
        let cursor = match scope {
            None => store.engine().first_key()?,
            Some(key) => {
                require("key", key)?;
                let cursor = store.engine().first_subkey(key.as_bytes())?;
                if cursor.is_none() {
                    return Err(Error::InvalidHandle(format!("No subkeys under '{}'", key)));
                }
                cursor
            }
        };

        Ok(Self {
            state: cursor.map_or(State::Exhausted, State::Positioned),
            _store: PhantomData,
        })
    }
}

impl Iterator for KeyIterator<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, State::Exhausted) {
            State::Exhausted => None,
            State::Failed(e) => Some(Err(e.into())),
            State::Positioned(cursor) => {
                let key = text(cursor.key().to_vec());
                self.state = match cursor.advance() {
                    Ok(Some(next)) => State::Positioned(next),
                    Ok(None) => State::Exhausted,
                    Err(e) => State::Failed(e),
                };
                Some(Ok(key))
            }
        }
    }
}

impl FusedIterator for KeyIterator<'_> {}
