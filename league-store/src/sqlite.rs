//! SQLite store backends.

use crate::apply::{now_millis, stage, ApplyMode, Staged};
use crate::error::StoreError;
use crate::{Commit, ObjectStore, TokenStore, Write};
use async_trait::async_trait;
use league_types::{
    Author, Entity, EntityRef, HistoryToken, Query, Scope, StoreId, Transaction,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

async fn connect(path: Option<&Path>) -> Result<SqlitePool, StoreError> {
    let (options, max_connections) = match path {
        Some(path) => (
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(Duration::from_secs(5)),
            5,
        ),
        // One connection: every new in-memory connection is a new database.
        None => (
            SqliteConnectOptions::from_str(":memory:")
                .map_err(StoreError::Database)?
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
            1,
        ),
    };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(StoreError::Database)
}

/// SQLite-based object store.
///
/// One database per scope. Uses WAL mode for concurrent reads/writes.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    id: StoreId,
    scope: Scope,
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the store database at `path`.
    ///
    /// The store id is generated on first open and persisted.
    pub async fn open(path: &Path, scope: Scope) -> Result<Self, StoreError> {
        if path.as_os_str().is_empty() {
            return Err(StoreError::InvalidPath {
                path: path.to_path_buf(),
            });
        }
        let store = Self::from_pool(connect(Some(path)).await?, scope).await?;
        info!(
            "Opened {} store {} at {}",
            store.scope,
            store.id,
            path.display()
        );
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory(scope: Scope) -> Result<Self, StoreError> {
        Self::from_pool(connect(None).await?, scope).await
    }

    async fn from_pool(pool: SqlitePool, scope: Scope) -> Result<Self, StoreError> {
        Self::run_migrations(&pool).await?;
        let id = Self::load_store_id(&pool).await?;
        Ok(Self { id, scope, pool })
    }

    /// Run database migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                kind TEXT NOT NULL,
                id BLOB NOT NULL,
                version INTEGER NOT NULL,
                payload BLOB NOT NULL,
                PRIMARY KEY (kind, id)
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                token INTEGER PRIMARY KEY AUTOINCREMENT,
                author TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                changes BLOB NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_author ON transactions(author)")
            .execute(pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn load_store_id(pool: &SqlitePool) -> Result<StoreId, StoreError> {
        sqlx::query("INSERT OR IGNORE INTO store_meta (key, value) VALUES ('store_id', ?1)")
            .bind(StoreId::new().as_bytes())
            .execute(pool)
            .await
            .map_err(StoreError::Database)?;

        let bytes: Vec<u8> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'store_id'")
                .fetch_one(pool)
                .await
                .map_err(StoreError::Database)?;

        StoreId::from_bytes(&bytes)
            .ok_or_else(|| StoreError::Corrupt(format!("store id of {} bytes", bytes.len())))
    }

    async fn load_entity(
        conn: &mut SqliteConnection,
        entity_ref: &EntityRef,
    ) -> Result<Option<Entity>, StoreError> {
        let row = sqlx::query_as::<_, EntityRow>(
            "SELECT payload FROM entities WHERE kind = ?1 AND id = ?2",
        )
        .bind(entity_ref.kind.as_str())
        .bind(entity_ref.id.as_bytes().as_slice())
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::Database)?;

        row.map(EntityRow::decode).transpose()
    }

    async fn apply(
        &self,
        author: &Author,
        writes: Vec<Write>,
        mode: ApplyMode,
    ) -> Result<Option<HistoryToken>, StoreError> {
        // Dropping the transaction without commit rolls every write back.
        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;
        let mut changes = Vec::new();

        for write in writes {
            let current = Self::load_entity(&mut *tx, &write.entity_ref()).await?;
            match stage(current.as_ref(), write, mode)? {
                Staged::Unchanged => {}
                Staged::Put(entity, change) => {
                    let entity_ref = entity.entity_ref();
                    sqlx::query(
                        r#"
                        INSERT INTO entities (kind, id, version, payload)
                        VALUES (?1, ?2, ?3, ?4)
                        ON CONFLICT(kind, id) DO UPDATE SET version = ?3, payload = ?4
                        "#,
                    )
                    .bind(entity_ref.kind.as_str())
                    .bind(entity_ref.id.as_bytes().as_slice())
                    .bind(entity.version() as i64)
                    .bind(entity.to_bytes()?)
                    .execute(&mut *tx)
                    .await
                    .map_err(StoreError::Database)?;
                    changes.push(change);
                }
                Staged::Removed(entity_ref, change) => {
                    sqlx::query("DELETE FROM entities WHERE kind = ?1 AND id = ?2")
                        .bind(entity_ref.kind.as_str())
                        .bind(entity_ref.id.as_bytes().as_slice())
                        .execute(&mut *tx)
                        .await
                        .map_err(StoreError::Database)?;
                    changes.push(change);
                }
            }
        }

        if changes.is_empty() {
            return Ok(None);
        }

        let token: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO transactions (author, timestamp, changes)
            VALUES (?1, ?2, ?3)
            RETURNING token
            "#,
        )
        .bind(author.as_str())
        .bind(now_millis() as i64)
        .bind(Transaction::encode_changes(&changes)?)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::Database)?;

        tx.commit().await.map_err(StoreError::Database)?;
        debug!("{} store committed transaction {}", self.scope, token);
        Ok(Some(HistoryToken::new(token as u64)))
    }
}

#[async_trait]
impl ObjectStore for SqliteStore {
    fn id(&self) -> StoreId {
        self.id
    }

    fn scope(&self) -> Scope {
        self.scope
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Entity>, StoreError> {
        if let Query::ById(entity_ref) = query {
            let mut conn = self.pool.acquire().await.map_err(StoreError::Database)?;
            return Ok(Self::load_entity(&mut *conn, entity_ref)
                .await?
                .into_iter()
                .collect());
        }

        let rows = sqlx::query_as::<_, EntityRow>(
            "SELECT payload FROM entities WHERE kind = ?1 ORDER BY id",
        )
        .bind(query.kind().as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        let mut entities = Vec::new();
        for row in rows {
            let entity = row.decode()?;
            if query.matches(&entity) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn count(&self, query: &Query) -> Result<usize, StoreError> {
        if let Query::All(kind) = query {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE kind = ?1")
                .bind(kind.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::Database)?;
            return Ok(count as usize);
        }
        Ok(self.fetch(query).await?.len())
    }

    async fn commit(&self, commit: Commit) -> Result<Option<HistoryToken>, StoreError> {
        self.apply(&commit.author, commit.writes, ApplyMode::Checked)
            .await
    }

    async fn fetch_history(
        &self,
        after: Option<HistoryToken>,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, StoreError> {
        // SQLite treats a negative LIMIT as no limit.
        let limit = limit.map_or(-1, |l| l as i64);
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT token, author, timestamp, changes
            FROM transactions
            WHERE token > ?1
            ORDER BY token ASC
            LIMIT ?2
            "#,
        )
        .bind(after.map_or(0, |t| t.value() as i64))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.into_iter()
            .map(|row| row.into_transaction(self.id))
            .collect()
    }

    async fn import(
        &self,
        author: &Author,
        writes: Vec<Write>,
    ) -> Result<Option<HistoryToken>, StoreError> {
        self.apply(author, writes, ApplyMode::LastWriterWins).await
    }
}

/// Internal row type for entity queries.
#[derive(sqlx::FromRow)]
struct EntityRow {
    payload: Vec<u8>,
}

impl EntityRow {
    fn decode(self) -> Result<Entity, StoreError> {
        Ok(Entity::from_bytes(&self.payload)?)
    }
}

/// Internal row type for history queries.
#[derive(sqlx::FromRow)]
struct TransactionRow {
    token: i64,
    author: String,
    timestamp: i64,
    changes: Vec<u8>,
}

impl TransactionRow {
    fn into_transaction(self, store_id: StoreId) -> Result<Transaction, StoreError> {
        Ok(Transaction {
            token: HistoryToken::new(self.token as u64),
            store_id,
            author: Author::new(self.author),
            timestamp: self.timestamp as u64,
            changes: Transaction::decode_changes(&self.changes)?,
        })
    }
}

/// SQLite-based history token store.
#[derive(Debug, Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    /// Open (or create) the token database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let store = Self {
            pool: connect(Some(path)).await?,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory token store (for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let store = Self {
            pool: connect(None).await?,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history_tokens (
                store_id BLOB PRIMARY KEY,
                token INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn load(&self, store: StoreId) -> Result<Option<HistoryToken>, StoreError> {
        let token: Option<i64> =
            sqlx::query_scalar("SELECT token FROM history_tokens WHERE store_id = ?1")
                .bind(store.as_bytes())
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::Database)?;
        Ok(token.map(|t| HistoryToken::new(t as u64)))
    }

    async fn save(&self, store: StoreId, token: HistoryToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO history_tokens (store_id, token, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(store_id) DO UPDATE SET token = ?2, updated_at = ?3
            "#,
        )
        .bind(store.as_bytes())
        .bind(token.value() as i64)
        .bind(now_millis() as i64)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;
        Ok(())
    }
}
