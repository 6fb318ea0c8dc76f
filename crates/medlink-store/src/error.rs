//! Error types for medlink-store.

use std::path::PathBuf;

use medlink_types::StoreError;

/// Result type for medlink-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in medlink-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The database was written by a newer version.
    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i32, supported: i32 },
}

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}
