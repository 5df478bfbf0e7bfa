//! Error types for the SIREN engine and its collaborators.
//!
//! [`SirenError`] covers the CPU engine, the file and config collaborators,
//! and (with the `gpu` feature) the wgpu backend. Construction-time problems
//! are carried as [`ConfigError`] and converted through `#[from]`.
//!
//! ```rust
//! use sirensdf::SirenError;
//!
//! fn check_len(expected: usize, got: usize) -> Result<(), SirenError> {
//!     if expected != got {
//!         return Err(SirenError::shape_mismatch(&[expected], &[got]));
//!     }
//!     Ok(())
//! }
//! assert!(check_len(3, 4).is_err());
//! ```

use thiserror::Error;

use crate::config::ConfigError;

/// Unified error type for every fallible operation in the crate.
#[derive(Error, Debug)]
pub enum SirenError {
    /// A buffer handed to the engine has the wrong length.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Shape received.
        got: Vec<usize>,
    },

    /// Requested batch size exceeds the capacity the buffers were sized for.
    #[error("Batch size {0} exceeds capacity {1}")]
    BatchTooLarge(usize, usize),

    /// Operation called out of the forward -> backward -> step order.
    #[error("Invalid network state: {0}")]
    InvalidState(String),

    /// Invalid architecture or unparsable configuration text.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Integer overflow while deriving buffer sizes.
    #[error("Integer overflow: {0}")]
    Overflow(String),

    /// Underlying read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A weight, point or snapshot file does not follow its format.
    #[error("Malformed data: {0}")]
    MalformedData(String),

    /// Snapshot encoding or decoding failed.
    #[cfg(feature = "serde")]
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// No adapter matched the requested options.
    #[cfg(feature = "gpu")]
    #[error("Failed to find suitable GPU adapter: {0}")]
    AdapterNotFound(String),

    /// Device creation failed.
    #[cfg(feature = "gpu")]
    #[error("Failed to create GPU device: {0}")]
    DeviceRequestFailed(#[from] wgpu::RequestDeviceError),

    /// Adapter limits are too small for the requested network.
    #[cfg(feature = "gpu")]
    #[error("Unsupported GPU limits: {0}")]
    UnsupportedLimits(String),

    /// Mapping or copying a GPU buffer failed.
    #[cfg(feature = "gpu")]
    #[error("Buffer operation failed: {0}")]
    BufferError(String),
}

/// Result alias used throughout the crate.
pub type SirenResult<T> = Result<T, SirenError>;

impl SirenError {
    /// Creates a shape mismatch error.
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        SirenError::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Creates a batch too large error.
    pub fn batch_too_large(requested: usize, limit: usize) -> Self {
        SirenError::BatchTooLarge(requested, limit)
    }

    /// Creates an invalid state error.
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        SirenError::InvalidState(msg.into())
    }

    /// Creates an overflow error.
    pub fn overflow<S: Into<String>>(msg: S) -> Self {
        SirenError::Overflow(msg.into())
    }

    /// Creates a malformed data error.
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        SirenError::MalformedData(msg.into())
    }

    #[cfg(feature = "gpu")]
    pub fn adapter_not_found<S: Into<String>>(msg: S) -> Self {
        SirenError::AdapterNotFound(msg.into())
    }

    #[cfg(feature = "gpu")]
    pub fn unsupported_limits<S: Into<String>>(msg: S) -> Self {
        SirenError::UnsupportedLimits(msg.into())
    }

    #[cfg(feature = "gpu")]
    pub fn buffer<S: Into<String>>(msg: S) -> Self {
        SirenError::BufferError(msg.into())
    }
}
