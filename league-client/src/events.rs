//! Broadcast channels observers subscribe to.
//!
//! Publishing never fails: an event nobody listens to is dropped, and a
//! subscriber that falls behind skips what it missed.

use league_core::{GameState, IdentityError};
use league_types::{GameId, Scope, StoreId, Transaction};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events kept per channel for slow subscribers.
pub const EVENT_CAPACITY: usize = 256;

/// A store reported a remote change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChanged {
    /// The store.
    pub store_id: StoreId,
    /// Its scope.
    pub scope: Scope,
}

/// Transactions from other authors that were just processed.
#[derive(Debug, Clone)]
pub struct RelevantTransactions {
    /// The store they came from.
    pub store_id: StoreId,
    /// Its scope.
    pub scope: Scope,
    /// Ascending by token.
    pub transactions: Arc<[Transaction]>,
}

/// Background sync outcomes worth surfacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Reading history failed; the batch is retried on the next trigger.
    FetchFailed {
        /// The store.
        store_id: StoreId,
        /// What went wrong.
        error: String,
    },
    /// A league was skipped because its identity graph is inconsistent.
    IdentityConflict(IdentityError),
    /// A round was completed.
    RoundAdvanced {
        /// The game.
        game_id: GameId,
        /// Its state afterwards.
        state: GameState,
    },
}

/// The three broadcast channels of a client.
#[derive(Debug, Clone)]
pub struct EventBus {
    store_changed: broadcast::Sender<StoreChanged>,
    transactions: broadcast::Sender<RelevantTransactions>,
    sync: broadcast::Sender<SyncEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create channels keeping `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        let (store_changed, _) = broadcast::channel(capacity);
        let (transactions, _) = broadcast::channel(capacity);
        let (sync, _) = broadcast::channel(capacity);
        Self {
            store_changed,
            transactions,
            sync,
        }
    }

    /// Receive every remote-change notification.
    pub fn subscribe_store_changed(&self) -> broadcast::Receiver<StoreChanged> {
        self.store_changed.subscribe()
    }

    /// Receive every processed batch of relevant transactions.
    pub fn subscribe_transactions(&self) -> broadcast::Receiver<RelevantTransactions> {
        self.transactions.subscribe()
    }

    /// Receive sync outcomes.
    pub fn subscribe_sync_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.sync.subscribe()
    }

    pub(crate) fn publish_store_changed(&self, event: StoreChanged) {
        let _ = self.store_changed.send(event);
    }

    pub(crate) fn publish_transactions(&self, event: RelevantTransactions) {
        let _ = self.transactions.send(event);
    }

    pub(crate) fn publish_sync(&self, event: SyncEvent) {
        let _ = self.sync.send(event);
    }
}
