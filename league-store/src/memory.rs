//! In-memory store backends.
//!
//! Behave like the SQLite backends and additionally allow forcing failures,
//! so callers can test how they react to an unavailable store or a stale
//! write.

use crate::apply::{now_millis, stage, ApplyMode, Staged};
use crate::error::StoreError;
use crate::{Commit, ObjectStore, TokenStore, Write};
use async_trait::async_trait;
use league_types::{
    Author, Entity, EntityRef, HistoryToken, Query, Scope, StoreId, Transaction,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// In-memory object store.
///
/// Clones share the same underlying state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    id: StoreId,
    scope: Scope,
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    entities: BTreeMap<EntityRef, Entity>,
    history: Vec<Transaction>,
    last_token: u64,
    fail_next_commit: Option<String>,
    fail_next_history: Option<String>,
    conflict_next_commit: bool,
}

impl MemoryStore {
    /// Create an empty store for `scope`.
    pub fn new(scope: Scope) -> Self {
        Self {
            id: StoreId::new(),
            scope,
            inner: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cause the next commit to fail with the given error.
    pub fn fail_next_commit(&self, error: &str) {
        self.lock().fail_next_commit = Some(error.to_string());
    }

    /// Cause the next `fetch_history()` to fail with the given error.
    pub fn fail_next_history(&self, error: &str) {
        self.lock().fail_next_history = Some(error.to_string());
    }

    /// Cause the next commit to be rejected as a stale write, as if another
    /// writer got there first.
    pub fn conflict_next_commit(&self) {
        self.lock().conflict_next_commit = true;
    }

    /// Number of recorded transactions.
    pub fn transaction_count(&self) -> usize {
        self.lock().history.len()
    }
}

impl MemoryStoreInner {
    fn apply(
        &mut self,
        store_id: StoreId,
        author: &Author,
        writes: Vec<Write>,
        mode: ApplyMode,
    ) -> Result<Option<HistoryToken>, StoreError> {
        // Writes are staged first so a failing write leaves nothing behind.
        let mut staged: BTreeMap<EntityRef, Option<Entity>> = BTreeMap::new();
        let mut changes = Vec::new();
        for write in writes {
            let entity_ref = write.entity_ref();
            let current = match staged.get(&entity_ref) {
                Some(pending) => pending.as_ref(),
                None => self.entities.get(&entity_ref),
            };
            match stage(current, write, mode)? {
                Staged::Unchanged => {}
                Staged::Put(entity, change) => {
                    staged.insert(entity_ref, Some(entity));
                    changes.push(change);
                }
                Staged::Removed(entity_ref, change) => {
                    staged.insert(entity_ref, None);
                    changes.push(change);
                }
            }
        }
        if changes.is_empty() {
            return Ok(None);
        }

        for (entity_ref, entity) in staged {
            match entity {
                Some(entity) => {
                    self.entities.insert(entity_ref, entity);
                }
                None => {
                    self.entities.remove(&entity_ref);
                }
            }
        }
        self.last_token += 1;
        let token = HistoryToken::new(self.last_token);
        self.history.push(Transaction {
            token,
            store_id,
            author: author.clone(),
            timestamp: now_millis(),
            changes,
        });
        Ok(Some(token))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn id(&self) -> StoreId {
        self.id
    }

    fn scope(&self) -> Scope {
        self.scope
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Entity>, StoreError> {
        let inner = self.lock();
        if let Query::ById(entity_ref) = query {
            return Ok(inner.entities.get(entity_ref).cloned().into_iter().collect());
        }
        Ok(inner
            .entities
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect())
    }

    async fn commit(&self, commit: Commit) -> Result<Option<HistoryToken>, StoreError> {
        let mut inner = self.lock();

        // Check for forced failures
        if let Some(error) = inner.fail_next_commit.take() {
            return Err(StoreError::Unavailable(error));
        }
        if std::mem::take(&mut inner.conflict_next_commit) {
            if let Some(write) = commit.writes.first() {
                let entity = write.entity_ref();
                let found = inner.entities.get(&entity).map_or(0, Entity::version);
                return Err(StoreError::Conflict {
                    entity,
                    expected: found,
                    found: found + 1,
                });
            }
        }

        let token = inner.apply(self.id, &commit.author, commit.writes, ApplyMode::Checked)?;
        if let Some(token) = token {
            debug!("{} store committed transaction {}", self.scope, token);
        }
        Ok(token)
    }

    async fn fetch_history(
        &self,
        after: Option<HistoryToken>,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_history.take() {
            return Err(StoreError::Unavailable(error));
        }
        Ok(inner
            .history
            .iter()
            .filter(|tx| after.map_or(true, |after| tx.token > after))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn import(
        &self,
        author: &Author,
        writes: Vec<Write>,
    ) -> Result<Option<HistoryToken>, StoreError> {
        let mut inner = self.lock();
        inner.apply(self.id, author, writes, ApplyMode::LastWriterWins)
    }
}

/// In-memory token store.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    inner: Arc<Mutex<MemoryTokenStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryTokenStoreInner {
    tokens: HashMap<StoreId, HistoryToken>,
    fail_next_save: Option<String>,
}

impl MemoryTokenStore {
    /// Create an empty token store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTokenStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cause the next `save()` to fail with the given error.
    pub fn fail_next_save(&self, error: &str) {
        self.lock().fail_next_save = Some(error.to_string());
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self, store: StoreId) -> Result<Option<HistoryToken>, StoreError> {
        Ok(self.lock().tokens.get(&store).copied())
    }

    async fn save(&self, store: StoreId, token: HistoryToken) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_save.take() {
            return Err(StoreError::Unavailable(error));
        }
        inner.tokens.insert(store, token);
        Ok(())
    }
}
