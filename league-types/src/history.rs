//! Change history records.

use crate::entity::{EntityKind, EntityRef};
use crate::error::TypesError;
use crate::ids::{Author, HistoryToken, StoreId};
use serde::{Deserialize, Serialize};

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Created.
    Insert,
    /// Modified.
    Update,
    /// Removed.
    Delete,
}

/// One entity change inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// The entity changed.
    pub entity: EntityRef,
    /// How it changed.
    pub kind: ChangeKind,
    /// Changed field names. Empty for inserts and deletes.
    pub updated_fields: Vec<String>,
}

impl ChangeRecord {
    /// An insert of `entity`.
    pub fn insert(entity: EntityRef) -> Self {
        Self {
            entity,
            kind: ChangeKind::Insert,
            updated_fields: Vec::new(),
        }
    }

    /// An update of `fields` on `entity`.
    pub fn update(entity: EntityRef, fields: &[&str]) -> Self {
        Self {
            entity,
            kind: ChangeKind::Update,
            updated_fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// A deletion of `entity`.
    pub fn delete(entity: EntityRef) -> Self {
        Self {
            entity,
            kind: ChangeKind::Delete,
            updated_fields: Vec::new(),
        }
    }

    /// Whether this is an update that changed `field`.
    pub fn updated(&self, field: &str) -> bool {
        self.kind == ChangeKind::Update && self.updated_fields.iter().any(|f| f == field)
    }

    /// Whether this change is of `kind` on an entity of `entity_kind`.
    pub fn is(&self, kind: ChangeKind, entity_kind: EntityKind) -> bool {
        self.kind == kind && self.entity.kind == entity_kind
    }
}

/// An atomic set of changes committed to one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Position in the store's change log.
    pub token: HistoryToken,
    /// The store the transaction was committed to.
    pub store_id: StoreId,
    /// The write path that committed it.
    pub author: Author,
    /// Commit time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// What changed, in commit order.
    pub changes: Vec<ChangeRecord>,
}

impl Transaction {
    /// Whether `author` committed this transaction.
    pub fn is_authored_by(&self, author: &Author) -> bool {
        &self.author == author
    }

    /// Whether the transaction changed anything.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Serialize a change list to MessagePack bytes.
    pub fn encode_changes(changes: &[ChangeRecord]) -> Result<Vec<u8>, TypesError> {
        rmp_serde::to_vec_named(changes).map_err(TypesError::Serialization)
    }

    /// Deserialize a change list from MessagePack bytes.
    pub fn decode_changes(bytes: &[u8]) -> Result<Vec<ChangeRecord>, TypesError> {
        rmp_serde::from_slice(bytes).map_err(TypesError::Deserialization)
    }
}
