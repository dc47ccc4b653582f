use std::collections::BTreeMap;
use std::io::Write;

use hashq_engine::{QueueElement, QueueHandle};
use tracing::debug;

use super::QueueConfig;
use crate::store::require;
use crate::{text, Error, Result, Store};

/// A value queue element with its attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    /// The payload.
    pub payload: String,
    /// Attributes pushed with the payload.
    pub attributes: BTreeMap<String, String>,
}

impl From<QueueElement> for Element {
    fn from(element: QueueElement) -> Self {
        Self {
            payload: text(element.payload),
            attributes: element
                .attributes
                .into_iter()
                .map(|(name, value)| (name, text(value)))
                .collect(),
        }
    }
}

/// A queue of text payloads.
///
/// Borrows its [`Store`]; other handles with the same prefix address the
/// same elements.
#[derive(Debug)]
pub struct ValueQueue<'a> {
    handle: QueueHandle<'a>,
    config: QueueConfig,
}

impl<'a> ValueQueue<'a> {
    /// Open the value queue described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandle` if the engine cannot produce a handle.
    pub fn new(store: &'a Store, config: QueueConfig) -> Result<Self> {
        let handle = store
            .engine()
            .value_queue(config.ordering().into(), config.prefix_bytes())
            .map_err(|e| Error::InvalidHandle(format!("Failed to open value queue: {}", e)))?;

        debug!(ordering = ?config.ordering(), prefix = ?config.prefix(), "Opened value queue");
        Ok(Self { handle, config })
    }

    /// The queue's configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Push `payload`.
    pub fn push(&self, payload: &str) -> Result<()> {
        self.push_with_attributes(payload, &BTreeMap::new())
    }

    /// Push `payload` together with `attributes` in one insert.
    pub fn push_with_attributes(
        &self,
        payload: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<()> {
        require("payload", payload)?;
        if attributes.keys().any(String::is_empty) {
            return Err(Error::invalid("attributes", "attribute names cannot be empty"));
        }

        let attributes = attributes
            .iter()
            .map(|(name, value)| (name.clone(), value.as_bytes().to_vec()))
            .collect();
        self.handle
            .push(payload.as_bytes(), attributes, self.config.write_options())?;
        Ok(())
    }

    /// Payload at `position` from the head, `None` past the end.
    pub fn peek(&self, position: usize) -> Result<Option<String>> {
        Ok(self.peek_element(position)?.map(|element| element.payload))
    }

    /// Element at `position` from the head, `None` past the end.
    pub fn peek_element(&self, position: usize) -> Result<Option<Element>> {
        let element = self
            .handle
            .read(position, self.config.passphrase_bytes())?;
        Ok(element.map(Element::from))
    }

    /// Remove and return the head payload. `None` when empty.
    pub fn pop(&self) -> Result<Option<String>> {
        Ok(self.pop_element()?.map(|element| element.payload))
    }

    /// Remove and return the head element. `None` when empty.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the head cannot be opened with the
    /// configured passphrase; the element stays queued.
    pub fn pop_element(&self) -> Result<Option<Element>> {
        let element = self.handle.pop(self.config.passphrase_bytes())?;
        Ok(element.map(Element::from))
    }

    /// Number of live elements.
    pub fn size(&self) -> Result<usize> {
        Ok(self.handle.count()?)
    }

    /// Whether no live element is queued.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.handle.is_empty()?)
    }

    /// Remove up to `count` elements from the head. Returns how many went.
    pub fn remove(&self, count: usize) -> Result<usize> {
        if count == 0 {
            return Err(Error::invalid("count", "count must be at least 1"));
        }
        let removed = self.handle.remove(count)?;
        debug!(requested = count, removed, "Removed queue elements");
        Ok(removed)
    }

    /// Remove every element. Returns how many went.
    pub fn clear(&self) -> Result<usize> {
        match self.size()? {
            0 => Ok(0),
            size => self.remove(size),
        }
    }

    /// Write a line per live element to `out`.
    pub fn dump(&self, out: &mut dyn Write) -> Result<()> {
        Ok(self.handle.dump(out)?)
    }

    /// Release the handle.
    pub fn close(self) {
        debug!(prefix = ?self.config.prefix(), "Closed value queue");
    }
}
