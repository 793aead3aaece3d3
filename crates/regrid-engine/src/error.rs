//! Error types for the regrid engine.

use regrid_common::DatasetError;
use thiserror::Error;

/// Errors that can occur during grid normalization, caching and dispatch.
#[derive(Error, Debug)]
pub enum RegridError {
    /// A grid reference pointed at a file that does not exist.
    #[error("grid not found: {0}")]
    GridNotFound(String),

    /// No grid could be derived and no sample dataset was supplied.
    ///
    /// Callers should treat this as "no regridding or area capability
    /// available" for the source in question, not as a crash.
    #[error("grid undefined: no grid path could be derived and no sample dataset was supplied")]
    GridUndefined,

    /// Horizontal coordinates could not be identified in a dataset.
    #[error("unknown grid: {0}")]
    UnknownGrid(String),

    /// More than one candidate horizontal structure exists in one dataset.
    #[error("multiple grid types present: {0}")]
    MultipleGridTypes(String),

    /// Alignment failure from the shared dataset model
    /// (dimension or coordinate mismatch).
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// The external weight/area generator failed. The message is opaque and
    /// is not interpreted by this subsystem.
    #[error("generator failed: {0}")]
    Generator(String),

    /// A weight table could not be applied to a variable.
    #[error("weight application failed: {0}")]
    Apply(String),

    /// Cache I/O or payload decoding error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    InvalidConfig(String),
}

impl RegridError {
    /// Create a GridNotFound error.
    pub fn grid_not_found(msg: impl Into<String>) -> Self {
        Self::GridNotFound(msg.into())
    }

    /// Create a Generator error.
    pub fn generator(msg: impl Into<String>) -> Self {
        Self::Generator(msg.into())
    }

    /// Create an Apply error.
    pub fn apply(msg: impl Into<String>) -> Self {
        Self::Apply(msg.into())
    }

    /// Create a Cache error.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<std::io::Error> for RegridError {
    fn from(err: std::io::Error) -> Self {
        Self::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for RegridError {
    fn from(err: serde_json::Error) -> Self {
        Self::Cache(format!("payload decode error: {}", err))
    }
}

/// Result type for regrid engine operations.
pub type Result<T> = std::result::Result<T, RegridError>;
