//! Error types for league records.

use thiserror::Error;

/// Errors that can occur encoding or decoding league records.
#[derive(Debug, Error)]
pub enum TypesError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
