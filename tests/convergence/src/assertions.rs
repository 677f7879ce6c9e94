//! Convergence assertions.
//!
//! Versions are local to each store, so entities are compared with their
//! version cleared.

use crate::harness::{Device, HarnessError};
use league_types::{Entity, EntityKind, EntityRef, GameId, LeagueId, Query, Scope};
use std::collections::BTreeMap;

/// Every entity kind that lives in the league-shared store.
pub const SHARED_KINDS: [EntityKind; 5] = [
    EntityKind::Participant,
    EntityKind::League,
    EntityKind::Game,
    EntityKind::Round,
    EntityKind::Move,
];

/// The league-shared content of `device`, versions cleared.
pub async fn shared_view(device: &Device) -> Result<BTreeMap<EntityRef, Entity>, HarnessError> {
    let store = device.store(Scope::LeagueShared);
    let mut view = BTreeMap::new();
    for kind in SHARED_KINDS {
        for mut entity in store.fetch(&Query::All(kind)).await? {
            entity.set_version(0);
            view.insert(entity.entity_ref(), entity);
        }
    }
    Ok(view)
}

/// Assert that two devices hold the same league-shared content.
pub async fn assert_converged(a: &Device, b: &Device) -> Result<(), HarnessError> {
    let left = shared_view(a).await?;
    let right = shared_view(b).await?;

    let only_left: Vec<_> = left.keys().filter(|k| !right.contains_key(k)).collect();
    let only_right: Vec<_> = right.keys().filter(|k| !left.contains_key(k)).collect();
    assert!(
        only_left.is_empty() && only_right.is_empty(),
        "{} only: {:?}, {} only: {:?}",
        a.name,
        only_left,
        b.name,
        only_right
    );
    for (entity_ref, entity) in &left {
        assert_eq!(
            Some(entity),
            right.get(entity_ref),
            "{} and {} disagree on {:?}",
            a.name,
            b.name,
            entity_ref
        );
    }
    Ok(())
}

/// Assert that `device` sees `count` members in the league.
pub async fn assert_members(
    device: &Device,
    league_id: LeagueId,
    count: usize,
) -> Result<(), HarnessError> {
    let league = device.client.league(league_id).await?;
    assert_eq!(
        league.participant_ids.len(),
        count,
        "{} sees members {:?}",
        device.name,
        league.participant_ids
    );
    Ok(())
}

/// Assert that `device` sees `count` rounds in the game.
pub async fn assert_rounds(
    device: &Device,
    game_id: GameId,
    count: usize,
) -> Result<(), HarnessError> {
    let rounds = device.client.rounds(game_id).await?;
    assert_eq!(rounds.len(), count, "{} sees {:?}", device.name, rounds);
    Ok(())
}
