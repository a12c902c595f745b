//! Common utilities and data structures shared by the navigation mesh crates

mod geometry;

pub use geometry::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The mesh folder or file for an area does not exist
    #[error("navigation mesh asset missing: {0}")]
    MissingAsset(String),

    /// Header mismatch, truncated or corrupt tile data
    #[error("malformed navigation mesh asset: {0}")]
    MalformedAsset(String),

    /// Mesh or query context storage could not be allocated
    #[error("allocation failed: {0}")]
    AllocationFailure(String),

    /// A query was issued against a service without a loaded mesh
    #[error("query misuse: {0}")]
    QueryMisuse(String),

    /// Configuration could not be parsed or holds unusable values
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("detour error: {0}")]
    Detour(String),
}

impl From<std::collections::TryReserveError> for Error {
    fn from(err: std::collections::TryReserveError) -> Self {
        Error::AllocationFailure(err.to_string())
    }
}

/// Result type for navigation operations
pub type Result<T> = std::result::Result<T, Error>;
