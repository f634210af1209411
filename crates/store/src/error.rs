//! Store errors

use thiserror::Error;

/// Errors that can occur in a store provider.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Create collided with an existing record
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Record missing a required field (name, owner)
    #[error("invalid resource: {0}")]
    Invalid(String),

    /// Filesystem failure in a disk-backed provider
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource on disk could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
}
