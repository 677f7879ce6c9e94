//! Engine error type.

use crate::config::ConfigError;
use crate::relay::RelayError;
use league_core::{IdentityError, TournamentError};
use league_store::StoreError;
use league_types::EntityRef;
use std::future::Future;
use thiserror::Error;
use tracing::warn;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error. Only raised while starting up.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reading history or the history token failed. Retried on the next trigger.
    #[error("sync fetch failed: {0}")]
    SyncFetch(#[source] StoreError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Relay error.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// The identity graph is inconsistent.
    #[error("identity conflict: {0}")]
    Identity(#[from] IdentityError),

    /// A tournament precondition does not hold.
    #[error("tournament precondition failed: {0}")]
    Tournament(#[from] TournamentError),

    /// An entity the operation needs does not exist.
    #[error("{0} not found")]
    NotFound(EntityRef),

    /// The history worker is no longer running.
    #[error("history worker stopped")]
    WorkerStopped,
}

impl ClientError {
    /// Whether retrying later may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClientError::SyncFetch(_) | ClientError::Store(_) | ClientError::Relay(_)
        )
    }

    /// Whether the store rejected a stale write.
    pub fn is_save_conflict(&self) -> bool {
        matches!(self, ClientError::Store(err) if err.is_conflict())
    }
}

/// Run `attempt`, and run it once more if it hit a stale write.
///
/// Every attempt must re-read what it writes.
pub(crate) async fn retry_on_conflict<T, F, Fut>(
    operation: &str,
    mut attempt: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    match attempt().await {
        Err(err) if err.is_save_conflict() => {
            warn!("{} hit a stale write, retrying once: {}", operation, err);
            attempt().await
        }
        other => other,
    }
}
