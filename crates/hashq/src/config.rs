//! Configuration for opening a store.
//!
//! # Example
//!
//! ```
//! use hashq::config::{OpenMode, StoreOptions};
//! use std::time::Duration;
//!
//! // In-memory store with defaults
//! let options = StoreOptions::default();
//!
//! // Or use the builder
//! let options = StoreOptions::builder()
//!     .with_path("/var/lib/app/store")
//!     .with_mode(OpenMode::Edit)
//!     .with_close_wait(Duration::from_secs(2))
//!     .build_validated()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use hashq_engine::{Geometry, KdfParams, OpenTarget};

/// How a store is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    /// Existing store, no writes.
    Read,
    /// Read and write, creating the store if missing.
    Edit,
    /// Read and write; the store is deleted when the session ends.
    TempFile,
    /// Anonymous in-memory store.
    Memory,
}

/// Options for [`Store::open`](crate::Store::open).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Store location. `None` opens an in-memory store.
    pub path: Option<PathBuf>,

    /// Open mode. `None` means `Edit` with a path and `Memory` without.
    pub mode: Option<OpenMode>,

    /// Favor throughput over space.
    pub fullmap: bool,

    /// Sizing for a newly initialized store.
    pub geometry: Geometry,

    /// How long `close` waits for the final flush.
    #[serde(with = "duration_serde")]
    pub close_wait: Duration,

    /// Argon2id cost for passphrase keys.
    #[serde(skip)]
    pub kdf: KdfParams,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            path: None,
            mode: None,
            fullmap: true,
            geometry: Geometry::default(),
            close_wait: Duration::ZERO,
            kdf: KdfParams::default(),
        }
    }
}

impl StoreOptions {
    /// Create a builder.
    pub fn builder() -> StoreOptionsBuilder {
        StoreOptionsBuilder::new()
    }

    /// Options for an in-memory store.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Options for a read/write store at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        StoreOptionsBuilder::new().with_path(path).build()
    }

    /// Validate the options.
    ///
    /// Returns an error if any value is invalid or the path and mode
    /// contradict each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_geometry(&self.geometry)?;

        match (&self.path, self.mode) {
            (Some(path), _) if path.as_os_str().is_empty() => Err(ConfigError::InvalidValue {
                field: "path".into(),
                reason: "path cannot be empty".into(),
            }),
            (Some(_), Some(OpenMode::Memory)) => Err(ConfigError::InvalidValue {
                field: "mode".into(),
                reason: "memory mode cannot be combined with a path".into(),
            }),
            (None, Some(mode)) if mode != OpenMode::Memory => Err(ConfigError::InvalidValue {
                field: "mode".into(),
                reason: format!("{:?} mode requires a path", mode),
            }),
            _ => Ok(()),
        }
    }

    /// The engine target these options describe. Call after `validate`.
    pub(crate) fn target(&self) -> OpenTarget {
        match (&self.path, self.mode) {
            (None, _) | (Some(_), Some(OpenMode::Memory)) => OpenTarget::Memory,
            (Some(path), Some(OpenMode::Read)) => OpenTarget::ReadOnly(path.clone()),
            (Some(path), Some(OpenMode::TempFile)) => OpenTarget::Temporary(path.clone()),
            (Some(path), Some(OpenMode::Edit) | None) => OpenTarget::ReadWrite(path.clone()),
        }
    }
}

/// Check that every geometry value is strictly positive.
pub fn validate_geometry(geometry: &Geometry) -> Result<(), ConfigError> {
    let fields = [
        ("geometry.mask_bits", geometry.mask_bits),
        ("geometry.cmask_bits", geometry.cmask_bits),
        ("geometry.max_elements", geometry.max_elements),
        ("geometry.page_size", geometry.page_size),
    ];
    for (field, value) in fields {
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                field: field.into(),
                reason: "must be greater than zero".into(),
            });
        }
    }
    Ok(())
}

/// Builder for [`StoreOptions`].
#[derive(Clone, Debug, Default)]
pub struct StoreOptionsBuilder {
    options: StoreOptions,
}

impl StoreOptionsBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self {
            options: StoreOptions::default(),
        }
    }

    /// Build the options.
    pub fn build(self) -> StoreOptions {
        self.options
    }

    /// Build and validate the options.
    pub fn build_validated(self) -> Result<StoreOptions, ConfigError> {
        let options = self.build();
        options.validate()?;
        Ok(options)
    }

    /// Set the store location.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.path = Some(path.into());
        self
    }

    /// Set the open mode.
    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.options.mode = Some(mode);
        self
    }

    /// Open read-only.
    pub fn read_only(self) -> Self {
        self.with_mode(OpenMode::Read)
    }

    /// Delete the store when the session ends.
    pub fn temporary(self) -> Self {
        self.with_mode(OpenMode::TempFile)
    }

    /// Favor throughput (default).
    pub fn with_fullmap(mut self) -> Self {
        self.options.fullmap = true;
        self
    }

    /// Favor space.
    pub fn without_fullmap(mut self) -> Self {
        self.options.fullmap = false;
        self
    }

    /// Set the store geometry.
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.options.geometry = geometry;
        self
    }

    /// Set how long `close` waits for the final flush.
    pub fn with_close_wait(mut self, wait: Duration) -> Self {
        self.options.close_wait = wait;
        self
    }

    /// Set the Argon2id cost for passphrase keys.
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.options.kdf = kdf;
        self
    }
}

/// Configuration error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The field name.
        field: String,
        /// The reason it's invalid.
        reason: String,
    },
}

/// Serde support for Duration serialization.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct DurationRepr {
        secs: u64,
        nanos: u32,
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        DurationRepr {
            secs: duration.as_secs(),
            nanos: duration.subsec_nanos(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let repr = DurationRepr::deserialize(deserializer)?;
        Ok(Duration::new(repr.secs, repr.nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = StoreOptions::default();
        assert!(options.path.is_none());
        assert!(options.mode.is_none());
        assert!(options.fullmap);
        assert_eq!(options.geometry, Geometry::default());
        assert_eq!(options.close_wait, Duration::ZERO);
        assert!(options.validate().is_ok());
        assert_eq!(options.target(), OpenTarget::Memory);
    }

    #[test]
    fn test_targets() {
        let path = PathBuf::from("/tmp/store");
        let target = |mode| StoreOptions {
            path: Some(path.clone()),
            mode,
            ..StoreOptions::default()
        }
        .target();

        assert_eq!(target(None), OpenTarget::ReadWrite(path.clone()));
        assert_eq!(target(Some(OpenMode::Edit)), OpenTarget::ReadWrite(path.clone()));
        assert_eq!(target(Some(OpenMode::Read)), OpenTarget::ReadOnly(path.clone()));
        assert_eq!(target(Some(OpenMode::TempFile)), OpenTarget::Temporary(path.clone()));
    }

    #[test]
    fn test_mode_without_path_is_invalid() {
        for mode in [OpenMode::Read, OpenMode::Edit, OpenMode::TempFile] {
            let result = StoreOptions::builder().with_mode(mode).build_validated();
            assert!(matches!(
                result,
                Err(ConfigError::InvalidValue { field, .. }) if field == "mode"
            ));
        }
        assert!(StoreOptions::builder()
            .with_mode(OpenMode::Memory)
            .build_validated()
            .is_ok());
    }

    #[test]
    fn test_memory_mode_with_path_is_invalid() {
        let result = StoreOptions::builder()
            .with_path("/tmp/store")
            .with_mode(OpenMode::Memory)
            .build_validated();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, .. }) if field == "mode"
        ));
    }

    #[test]
    fn test_empty_path_is_invalid() {
        let result = StoreOptions::builder().with_path("").build_validated();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, .. }) if field == "path"
        ));
    }

    #[test]
    fn test_zero_geometry_is_invalid() {
        let geometry = Geometry {
            max_elements: 0,
            ..Geometry::default()
        };
        let result = StoreOptions::builder().with_geometry(geometry).build_validated();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, .. }) if field == "geometry.max_elements"
        ));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let original = StoreOptions::builder()
            .with_path("/tmp/store")
            .read_only()
            .without_fullmap()
            .with_close_wait(Duration::from_millis(1500))
            .build();

        let json = serde_json::to_string(&original).expect("serialize");
        assert!(json.contains("\"read\""));
        let restored: StoreOptions = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(restored.path, original.path);
        assert_eq!(restored.mode, Some(OpenMode::Read));
        assert!(!restored.fullmap);
        assert_eq!(restored.close_wait, Duration::from_millis(1500));
        assert_eq!(restored.kdf, KdfParams::default());
    }
}
