//! Error types for league stores.

use league_types::{EntityRef, TypesError};
use std::path::PathBuf;

/// Store layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] TypesError),

    /// The write was based on a stale copy of the entity.
    #[error("stale write to {entity}: expected version {expected}, found {found}")]
    Conflict {
        /// The entity written.
        entity: EntityRef,
        /// Version the writer read.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A row holds data that cannot be interpreted.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

impl StoreError {
    /// Whether this is a stale-write conflict that a re-read may resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
