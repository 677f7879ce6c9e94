//! Predicate queries over stored entities.

use crate::entity::{AccountScope, Entity, EntityKind, EntityRef};
use crate::identity::ExternalIdentity;
use crate::ids::{GameId, LeagueId, ParticipantId, RoundId};

/// A predicate over the entities of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Every entity of a kind.
    All(EntityKind),
    /// One entity by kind and id.
    ById(EntityRef),
    /// Accounts with scope `owner`.
    OwnerAccounts,
    /// Accounts sharing any stable identifier with an identity.
    AccountsMatching(ExternalIdentity),
    /// Accounts that list a participant.
    AccountsClaiming(ParticipantId),
    /// Participants of a league.
    ParticipantsInLeague(LeagueId),
    /// Games of a league.
    GamesInLeague(LeagueId),
    /// Rounds of a game.
    RoundsInGame(GameId),
    /// Moves of a round.
    MovesInRound(RoundId),
    /// Moves made by a participant in any round.
    MovesOfParticipant(ParticipantId),
}

impl Query {
    /// The kind of entity the query selects.
    pub fn kind(&self) -> EntityKind {
        match self {
            Query::All(kind) => *kind,
            Query::ById(entity) => entity.kind,
            Query::OwnerAccounts | Query::AccountsMatching(_) | Query::AccountsClaiming(_) => {
                EntityKind::Account
            }
            Query::ParticipantsInLeague(_) => EntityKind::Participant,
            Query::GamesInLeague(_) => EntityKind::Game,
            Query::RoundsInGame(_) => EntityKind::Round,
            Query::MovesInRound(_) | Query::MovesOfParticipant(_) => EntityKind::Move,
        }
    }

    /// Whether `entity` satisfies the query.
    pub fn matches(&self, entity: &Entity) -> bool {
        match (self, entity) {
            (Query::All(kind), entity) => entity.kind() == *kind,
            (Query::ById(wanted), entity) => entity.entity_ref() == *wanted,
            (Query::OwnerAccounts, Entity::Account(a)) => a.scope == AccountScope::Owner,
            (Query::AccountsMatching(identity), Entity::Account(a)) => a.matches(identity),
            (Query::AccountsClaiming(p), Entity::Account(a)) => a.claims(*p),
            (Query::ParticipantsInLeague(l), Entity::Participant(p)) => p.league_id == *l,
            (Query::GamesInLeague(l), Entity::Game(g)) => g.league_id == *l,
            (Query::RoundsInGame(g), Entity::Round(r)) => r.game_id == *g,
            (Query::MovesInRound(r), Entity::Move(m)) => m.round_id == *r,
            (Query::MovesOfParticipant(p), Entity::Move(m)) => m.participant_id == *p,
            _ => false,
        }
    }
}
