//! Version checking and change detection shared by every store backend.

use crate::error::StoreError;
use crate::Write;
use league_types::{ChangeRecord, Entity, EntityRef};
use std::time::{SystemTime, UNIX_EPOCH};

/// How incoming writes are checked against stored versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyMode {
    /// The writer must have read the stored version.
    Checked,
    /// Imported writes overwrite whatever is stored.
    LastWriterWins,
}

/// The effect of one write on the stored state.
#[derive(Debug)]
pub(crate) enum Staged {
    /// Nothing to store.
    Unchanged,
    /// Store the entity, already carrying its new version.
    Put(Entity, ChangeRecord),
    /// Remove the entity.
    Removed(EntityRef, ChangeRecord),
}

/// Decide what `write` does to the entity currently stored (`current`).
pub(crate) fn stage(
    current: Option<&Entity>,
    write: Write,
    mode: ApplyMode,
) -> Result<Staged, StoreError> {
    match write {
        Write::Put(mut entity) => {
            let entity_ref = entity.entity_ref();
            let found = current.map_or(0, Entity::version);
            if mode == ApplyMode::Checked && entity.version() != found {
                return Err(StoreError::Conflict {
                    entity: entity_ref,
                    expected: entity.version(),
                    found,
                });
            }
            match current {
                None => {
                    entity.set_version(1);
                    Ok(Staged::Put(entity, ChangeRecord::insert(entity_ref)))
                }
                Some(existing) => {
                    let fields = existing.changed_fields(&entity);
                    if fields.is_empty() {
                        return Ok(Staged::Unchanged);
                    }
                    entity.set_version(found + 1);
                    Ok(Staged::Put(entity, ChangeRecord::update(entity_ref, &fields)))
                }
            }
        }
        Write::Delete(entity_ref) => Ok(match current {
            Some(_) => Staged::Removed(entity_ref, ChangeRecord::delete(entity_ref)),
            None => Staged::Unchanged,
        }),
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
