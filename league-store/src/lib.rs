//! # league-store
//!
//! Scoped object stores with durable change history.
//!
//! Every store keeps the current version of each entity plus an append-only
//! log of the transactions that produced it. Two backends are provided:
//! - [`SqliteStore`] / [`SqliteTokenStore`] - durable, one database per scope
//! - [`MemoryStore`] / [`MemoryTokenStore`] - in-process, with failure hooks for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

mod apply;
mod error;
mod memory;
mod sqlite;

pub use error::StoreError;
pub use memory::{MemoryStore, MemoryTokenStore};
pub use sqlite::{SqliteStore, SqliteTokenStore};

use async_trait::async_trait;
use league_types::{
    Author, Entity, EntityRef, HistoryToken, Query, Record, Scope, StoreId, Transaction,
};

/// One write inside a [`Commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Insert or update an entity.
    Put(Entity),
    /// Remove an entity.
    Delete(EntityRef),
}

impl Write {
    /// The entity the write touches.
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            Write::Put(entity) => entity.entity_ref(),
            Write::Delete(entity_ref) => *entity_ref,
        }
    }
}

/// An atomic set of writes tagged with the author committing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Recorded on the resulting transaction.
    pub author: Author,
    /// Applied in order, all or nothing.
    pub writes: Vec<Write>,
}

impl Commit {
    /// An empty commit by `author`.
    pub fn new(author: Author) -> Self {
        Self {
            author,
            writes: Vec::new(),
        }
    }

    /// Add a put.
    pub fn put(mut self, entity: impl Into<Entity>) -> Self {
        self.writes.push(Write::Put(entity.into()));
        self
    }

    /// Add a put for every entity.
    pub fn put_all<T: Into<Entity>>(mut self, entities: impl IntoIterator<Item = T>) -> Self {
        self.writes
            .extend(entities.into_iter().map(|e| Write::Put(e.into())));
        self
    }

    /// Add a delete.
    pub fn delete(mut self, entity: impl Into<EntityRef>) -> Self {
        self.writes.push(Write::Delete(entity.into()));
        self
    }

    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// A visibility-scoped store of league entities.
///
/// Writes through [`commit`](ObjectStore::commit) are version checked: a put
/// must carry the version it read, or the whole commit fails with
/// [`StoreError::Conflict`]. A commit that changes nothing records no
/// transaction.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stable identifier of this store.
    fn id(&self) -> StoreId;

    /// Visibility scope of this store.
    fn scope(&self) -> Scope;

    /// Every entity matching `query`.
    async fn fetch(&self, query: &Query) -> Result<Vec<Entity>, StoreError>;

    /// Number of entities matching `query`.
    async fn count(&self, query: &Query) -> Result<usize, StoreError> {
        Ok(self.fetch(query).await?.len())
    }

    /// Apply a version-checked commit.
    ///
    /// Returns the token of the recorded transaction, or `None` when
    /// nothing changed.
    async fn commit(&self, commit: Commit) -> Result<Option<HistoryToken>, StoreError>;

    /// Put one entity.
    async fn save(
        &self,
        entity: Entity,
        author: &Author,
    ) -> Result<Option<HistoryToken>, StoreError> {
        self.commit(Commit::new(author.clone()).put(entity)).await
    }

    /// Delete one entity.
    async fn delete(
        &self,
        entity: EntityRef,
        author: &Author,
    ) -> Result<Option<HistoryToken>, StoreError> {
        self.commit(Commit::new(author.clone()).delete(entity)).await
    }

    /// Transactions after `after` (all when `None`), ascending by token,
    /// at most `limit` of them.
    async fn fetch_history(
        &self,
        after: Option<HistoryToken>,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Apply writes made elsewhere, last writer wins, without version checks.
    async fn import(
        &self,
        author: &Author,
        writes: Vec<Write>,
    ) -> Result<Option<HistoryToken>, StoreError>;
}

/// Durable per-store history tokens, kept outside the object graph.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// The last processed token of `store`, if any.
    async fn load(&self, store: StoreId) -> Result<Option<HistoryToken>, StoreError>;

    /// Record `token` as the last processed token of `store`.
    async fn save(&self, store: StoreId, token: HistoryToken) -> Result<(), StoreError>;
}

/// Fetch records of type `T` matching `query`.
pub async fn fetch_records<T: Record>(
    store: &dyn ObjectStore,
    query: &Query,
) -> Result<Vec<T>, StoreError> {
    Ok(store
        .fetch(query)
        .await?
        .into_iter()
        .filter_map(T::from_entity)
        .collect())
}

/// Fetch one record by id.
pub async fn fetch_record<T: Record>(
    store: &dyn ObjectStore,
    id: impl Into<EntityRef>,
) -> Result<Option<T>, StoreError> {
    let query = Query::ById(id.into());
    Ok(fetch_records(store, &query).await?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use league_types::{GameId, LeagueId, Round};

    #[test]
    fn commit_builder_keeps_order() {
        let round = Round::new(GameId::new(), 0);
        let league = LeagueId::new();
        let commit = Commit::new(Author::new("a"))
            .put(round.clone())
            .delete(league);
        assert_eq!(commit.writes.len(), 2);
        assert_eq!(commit.writes[0].entity_ref(), round.entity_ref());
        assert_eq!(commit.writes[1], Write::Delete(league.into()));
    }

    #[tokio::test]
    async fn typed_fetch_helpers() {
        let store = MemoryStore::new(Scope::LeagueShared);
        let game = GameId::new();
        let author = Author::new("a");
        store
            .commit(Commit::new(author).put_all([Round::new(game, 0), Round::new(game, 1)]))
            .await
            .unwrap();

        let rounds: Vec<Round> = fetch_records(&store, &Query::RoundsInGame(game))
            .await
            .unwrap();
        assert_eq!(rounds.len(), 2);

        let second: Option<Round> = fetch_record(&store, league_types::RoundId::for_index(game, 1))
            .await
            .unwrap();
        assert_eq!(second.map(|r| r.index), Some(1));
    }
}
