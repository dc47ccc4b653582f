//! Session parameters and per-write options.

use std::path::PathBuf;
use std::time::Duration;

use hashq_crypto::KdfParams;
use serde::{Deserialize, Serialize};

/// Where a session lives and how it may be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenTarget {
    /// Anonymous store in a temporary location, gone when the session ends.
    Memory,
    /// Existing store opened without write access.
    ReadOnly(PathBuf),
    /// Store opened for reading and writing, created if missing.
    ReadWrite(PathBuf),
    /// Store at a path that is deleted when the session ends.
    Temporary(PathBuf),
}

impl OpenTarget {
    /// The on-disk location, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Memory => None,
            Self::ReadOnly(path) | Self::ReadWrite(path) | Self::Temporary(path) => Some(path),
        }
    }

    /// Whether mutating calls are refused.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly(_))
    }
}

/// Store sizing parameters.
///
/// Recorded in the store's meta tree when the store is first initialized;
/// later opens keep the recorded values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    /// Bits of the primary hash mask.
    pub mask_bits: u32,
    /// Bits of the collision hash mask.
    pub cmask_bits: u32,
    /// Elements per collision bucket.
    pub max_elements: u32,
    /// Page size in bytes.
    pub page_size: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            mask_bits: 8,
            cmask_bits: 4,
            max_elements: 1024,
            page_size: 512,
        }
    }
}

impl Geometry {
    /// Smallest page cache handed to sled.
    const MIN_CACHE_BYTES: u64 = 1 << 20;
    /// Largest page cache handed to sled.
    const MAX_CACHE_BYTES: u64 = 1 << 30;

    /// Whether every parameter is strictly positive.
    pub fn is_valid(&self) -> bool {
        self.mask_bits > 0 && self.cmask_bits > 0 && self.max_elements > 0 && self.page_size > 0
    }

    /// Page cache size derived from the geometry.
    pub fn cache_capacity(&self) -> u64 {
        let buckets = 1u64 << self.mask_bits.min(20);
        (u64::from(self.max_elements) * u64::from(self.page_size))
            .saturating_mul(buckets)
            .clamp(Self::MIN_CACHE_BYTES, Self::MAX_CACHE_BYTES)
    }
}

/// Everything needed to open a session besides its target.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineConfig {
    /// Sizing parameters for a newly initialized store.
    pub geometry: Geometry,
    /// Favor throughput over space (sled `HighThroughput` mode).
    pub fullmap: bool,
    /// Argon2id cost for passphrase keys.
    pub kdf: KdfParams,
}

/// Options applied to a single write.
#[derive(Clone, Copy, Default)]
pub struct WriteOptions<'a> {
    /// Seal the value under this passphrase.
    pub passphrase: Option<&'a [u8]>,
    /// Expire the value this long after the write.
    pub expire: Option<Duration>,
}

impl<'a> WriteOptions<'a> {
    /// Options that seal under `passphrase`.
    pub fn sealed(passphrase: &'a [u8]) -> Self {
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
}

impl std::fmt::Debug for WriteOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteOptions")
            .field("sealed", &self.passphrase.is_some())
            .field("expire", &self.expire)
            .finish()
    }
}

/// Store-wide defaults applied to writes.
#[derive(Clone, Debug, Default)]
pub(crate) struct CommonAttrs {
    pub mtime: bool,
    pub history: bool,
    pub encrypt: bool,
    pub expire: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry_is_valid() {
        assert!(Geometry::default().is_valid());
    }

    #[test]
    fn test_zero_geometry_is_invalid() {
        let geometry = Geometry {
            page_size: 0,
            ..Geometry::default()
        };
        assert!(!geometry.is_valid());
    }

    #[test]
    fn test_cache_capacity_is_clamped() {
        let tiny = Geometry {
            mask_bits: 1,
            cmask_bits: 1,
            max_elements: 1,
            page_size: 1,
        };
        let huge = Geometry {
            mask_bits: 32,
            cmask_bits: 32,
            max_elements: u32::MAX,
            page_size: u32::MAX,
        };
        assert_eq!(tiny.cache_capacity(), 1 << 20);
        assert_eq!(huge.cache_capacity(), 1 << 30);
    }

    #[test]
    fn test_target_paths() {
        assert_eq!(OpenTarget::Memory.path(), None);
        assert!(OpenTarget::ReadOnly(PathBuf::from("/tmp/x")).is_read_only());
        assert!(!OpenTarget::ReadWrite(PathBuf::from("/tmp/x")).is_read_only());
    }
}
