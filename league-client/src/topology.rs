//! Store topology: one object store per visibility scope.

use crate::config::{ConfigError, StoresConfig};
use league_store::{MemoryStore, ObjectStore, SqliteStore};
use league_types::{Scope, StoreId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// The three stores of a device, keyed by scope.
///
/// Built once at startup and read-only afterwards.
#[derive(Clone)]
pub struct StoreTopology {
    private: Arc<dyn ObjectStore>,
    shared: Arc<dyn ObjectStore>,
    public: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for StoreTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreTopology")
            .field("private", &self.private.id())
            .field("shared", &self.shared.id())
            .field("public", &self.public.id())
            .finish()
    }
}

/// Location of the database of `scope` below `base_dir`.
pub fn store_path(base_dir: &Path, scope: Scope) -> PathBuf {
    base_dir.join(scope.name()).join("database.sqlite")
}

impl StoreTopology {
    /// Open every store described by `config`.
    ///
    /// # Errors
    ///
    /// Any store that cannot be opened is fatal.
    pub async fn provision(config: &StoresConfig) -> Result<Self, ConfigError> {
        if config.in_memory {
            return Ok(Self::in_memory());
        }

        let mut stores: Vec<Arc<dyn ObjectStore>> = Vec::with_capacity(Scope::ALL.len());
        for scope in Scope::ALL {
            let path = store_path(&config.base_dir, scope);
            if let Some(folder) = path.parent() {
                std::fs::create_dir_all(folder).map_err(|source| ConfigError::CreateDir {
                    path: folder.to_path_buf(),
                    source,
                })?;
            }
            let store = SqliteStore::open(&path, scope)
                .await
                .map_err(|source| ConfigError::Provision { scope, source })?;
            stores.push(Arc::new(store));
        }

        let topology = Self::from_stores(stores)?;
        info!(
            "Provisioned stores for {} under {}",
            config.container_identifier,
            config.base_dir.display()
        );
        Ok(topology)
    }

    /// Three fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            private: Arc::new(MemoryStore::new(Scope::OwnerPrivate)),
            shared: Arc::new(MemoryStore::new(Scope::LeagueShared)),
            public: Arc::new(MemoryStore::new(Scope::DiscoveryPublic)),
        }
    }

    /// Assemble a topology from existing stores, exactly one per scope.
    pub fn from_stores(stores: Vec<Arc<dyn ObjectStore>>) -> Result<Self, ConfigError> {
        let mut private = None;
        let mut shared = None;
        let mut public = None;
        for store in stores {
            let scope = store.scope();
            let slot = match scope {
                Scope::OwnerPrivate => &mut private,
                Scope::LeagueShared => &mut shared,
                Scope::DiscoveryPublic => &mut public,
            };
            if slot.replace(store).is_some() {
                return Err(ConfigError::DuplicateScope(scope));
            }
        }
        Ok(Self {
            private: private.ok_or(ConfigError::MissingScope(Scope::OwnerPrivate))?,
            shared: shared.ok_or(ConfigError::MissingScope(Scope::LeagueShared))?,
            public: public.ok_or(ConfigError::MissingScope(Scope::DiscoveryPublic))?,
        })
    }

    /// The store of `scope`.
    pub fn store_for(&self, scope: Scope) -> Arc<dyn ObjectStore> {
        match scope {
            Scope::OwnerPrivate => self.private.clone(),
            Scope::LeagueShared => self.shared.clone(),
            Scope::DiscoveryPublic => self.public.clone(),
        }
    }

    /// The scope of the store identified by `store_id`.
    pub fn scope_for(&self, store_id: StoreId) -> Option<Scope> {
        self.store_by_id(store_id).map(|store| store.scope())
    }

    /// The store identified by `store_id`.
    pub fn store_by_id(&self, store_id: StoreId) -> Option<Arc<dyn ObjectStore>> {
        self.stores().find(|store| store.id() == store_id).cloned()
    }

    /// Every store, private first.
    pub fn stores(&self) -> impl Iterator<Item = &Arc<dyn ObjectStore>> {
        [&self.private, &self.shared, &self.public].into_iter()
    }

    /// Whether remote changes to `store_id` are processed.
    pub fn is_history_tracked(&self, store_id: StoreId) -> bool {
        self.scope_for(store_id)
            .map_or(false, |scope| scope.tracks_history())
    }
}
