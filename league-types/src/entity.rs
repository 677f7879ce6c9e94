//! Stored entities of the league graph.
//!
//! Entities only hold ids of their relations. Every entity carries a
//! `version` that the owning store bumps on each write and checks on the
//! next one, so a stale copy can never overwrite a newer record.

use crate::error::TypesError;
use crate::identity::ExternalIdentity;
use crate::ids::{AccountId, GameId, LeagueId, MoveId, ParticipantId, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Collect the names of the listed fields that differ between two values.
macro_rules! changed_fields {
    ($old:expr, $new:expr, $($field:ident),+ $(,)?) => {{
        let mut fields = Vec::new();
        $(
            if $old.$field != $new.$field {
                fields.push(stringify!($field));
            }
        )+
        fields
    }};
}

/// How an Account came to exist on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountScope {
    /// The person using this device.
    Owner,
    /// Another person who has an account with the relay.
    LinkedUser,
    /// Someone known only by contact details.
    ContactOnly,
}

/// A person across all of their devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable cross-device id.
    pub id: AccountId,
    /// Name shown in the UI.
    pub display_name: String,
    /// Relay account record id.
    pub record_id: Option<String>,
    /// Phone number.
    pub phone_number: Option<String>,
    /// Email address.
    pub email_address: Option<String>,
    /// How the account came to exist.
    pub scope: AccountScope,
    /// Participants this account controls.
    pub participant_ids: BTreeSet<ParticipantId>,
    /// Leagues this account belongs to.
    pub league_ids: BTreeSet<LeagueId>,
    /// Store-managed write version.
    pub version: u64,
}

impl Account {
    fn blank(id: AccountId, display_name: String, scope: AccountScope) -> Self {
        Self {
            id,
            display_name,
            record_id: None,
            phone_number: None,
            email_address: None,
            scope,
            participant_ids: BTreeSet::new(),
            league_ids: BTreeSet::new(),
            version: 0,
        }
    }

    /// The account of the person using this device.
    ///
    /// When the relay knows the person's record id the account id is derived
    /// from it, so every device of the same person agrees on it.
    pub fn owner(display_name: impl Into<String>, identity: &ExternalIdentity) -> Self {
        let id = identity
            .record_id
            .as_deref()
            .map(AccountId::for_record)
            .unwrap_or_default();
        let mut account = Self::blank(id, display_name.into(), AccountScope::Owner);
        account.absorb(identity);
        account
    }

    /// A linked-user account re-created from an id seen on a Participant.
    pub fn linked(id: AccountId, display_name: impl Into<String>) -> Self {
        Self::blank(id, display_name.into(), AccountScope::LinkedUser)
    }

    /// An account for a person the relay reported as a share participant.
    pub fn from_identity(identity: &ExternalIdentity) -> Self {
        let id = identity
            .record_id
            .as_deref()
            .map(AccountId::for_record)
            .unwrap_or_default();
        let scope = if identity.has_relay_account {
            AccountScope::LinkedUser
        } else {
            AccountScope::ContactOnly
        };
        let display_name = identity
            .display_name
            .clone()
            .or_else(|| identity.email_address.clone())
            .or_else(|| identity.phone_number.clone())
            .unwrap_or_else(|| "Player".to_string());
        let mut account = Self::blank(id, display_name, scope);
        account.absorb(identity);
        account
    }

    /// Fill identifiers this account lacks from `identity`. Returns whether
    /// anything changed.
    pub fn absorb(&mut self, identity: &ExternalIdentity) -> bool {
        let before = (
            self.record_id.clone(),
            self.phone_number.clone(),
            self.email_address.clone(),
        );
        if self.record_id.is_none() {
            self.record_id = identity.record_id.clone();
        }
        if self.phone_number.is_none() {
            self.phone_number = identity.phone_number.clone();
        }
        if self.email_address.is_none() {
            self.email_address = identity.email_address.clone();
        }
        before
            != (
                self.record_id.clone(),
                self.phone_number.clone(),
                self.email_address.clone(),
            )
    }

    /// Whether this account and `identity` share any stable identifier.
    pub fn matches(&self, identity: &ExternalIdentity) -> bool {
        identity.matches_any(
            self.record_id.as_deref(),
            self.phone_number.as_deref(),
            self.email_address.as_deref(),
        )
    }

    /// Whether this is the device owner's account.
    pub fn is_owner(&self) -> bool {
        self.scope == AccountScope::Owner
    }

    /// Whether this account controls `participant`.
    pub fn claims(&self, participant: ParticipantId) -> bool {
        self.participant_ids.contains(&participant)
    }

    /// Record that this account controls `participant` in `league`.
    /// Returns whether anything changed.
    pub fn link(&mut self, participant: ParticipantId, league: LeagueId) -> bool {
        let added_participant = self.participant_ids.insert(participant);
        let added_league = self.league_ids.insert(league);
        added_participant || added_league
    }

    /// Forget `participant`. Returns whether it was listed.
    pub fn unlink(&mut self, participant: ParticipantId) -> bool {
        self.participant_ids.remove(&participant)
    }

    /// Names of the fields that differ from `other`.
    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(
            self,
            other,
            display_name,
            record_id,
            phone_number,
            email_address,
            scope,
            participant_ids,
            league_ids
        )
    }
}

/// An Account's membership inside exactly one League.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Stable id.
    pub id: ParticipantId,
    /// Copied from the account at creation.
    pub display_name: String,
    /// The owning account. May be absent until reconciled.
    pub account_id: Option<AccountId>,
    /// The league this membership belongs to.
    pub league_id: LeagueId,
    /// Store-managed write version.
    pub version: u64,
}

impl Participant {
    /// The membership of `account` in `league`.
    pub fn for_account(account: &Account, league_id: LeagueId) -> Self {
        Self {
            id: ParticipantId::for_membership(account.id, league_id),
            display_name: account.display_name.clone(),
            account_id: Some(account.id),
            league_id,
            version: 0,
        }
    }

    /// A participant not yet attached to any account.
    pub fn unlinked(display_name: impl Into<String>, league_id: LeagueId) -> Self {
        Self {
            id: ParticipantId::new(),
            display_name: display_name.into(),
            account_id: None,
            league_id,
            version: 0,
        }
    }

    /// Names of the fields that differ from `other`.
    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(self, other, display_name, account_id, league_id)
    }
}

/// A named group of Participants that owns Games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct League {
    /// Stable id.
    pub id: LeagueId,
    /// Name, also used as the share title.
    pub name: String,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
    /// The participant that created the league. Always a member.
    pub owner_participant_id: ParticipantId,
    /// Members.
    pub participant_ids: BTreeSet<ParticipantId>,
    /// Games played in this league.
    pub game_ids: BTreeSet<GameId>,
    /// Store-managed write version.
    pub version: u64,
}

impl League {
    /// A league whose only member is `owner`.
    pub fn new(name: impl Into<String>, owner: &Participant, created_at: u64) -> Self {
        Self {
            id: owner.league_id,
            name: name.into(),
            created_at,
            owner_participant_id: owner.id,
            participant_ids: BTreeSet::from([owner.id]),
            game_ids: BTreeSet::new(),
            version: 0,
        }
    }

    /// Whether `participant` is a member.
    pub fn has_member(&self, participant: ParticipantId) -> bool {
        self.participant_ids.contains(&participant)
    }

    /// Add a member. Returns whether it was new.
    pub fn add_member(&mut self, participant: ParticipantId) -> bool {
        self.participant_ids.insert(participant)
    }

    /// Names of the fields that differ from `other`.
    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(
            self,
            other,
            name,
            created_at,
            owner_participant_id,
            participant_ids,
            game_ids
        )
    }
}

/// One elimination tournament within a League.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    /// Stable id.
    pub id: GameId,
    /// The league the game is played in.
    pub league_id: LeagueId,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
    /// Participants taking part.
    pub participant_ids: BTreeSet<ParticipantId>,
    /// Rounds in index order.
    pub round_ids: Vec<RoundId>,
    /// Set at most once.
    pub winner: Option<ParticipantId>,
    /// Store-managed write version.
    pub version: u64,
}

impl Game {
    /// A new game with its first round id already allocated.
    pub fn new(
        league_id: LeagueId,
        participant_ids: BTreeSet<ParticipantId>,
        created_at: u64,
    ) -> Self {
        let id = GameId::new();
        Self {
            id,
            league_id,
            created_at,
            participant_ids,
            round_ids: vec![RoundId::for_index(id, 0)],
            winner: None,
            version: 0,
        }
    }

    /// The last (open or deciding) round.
    pub fn current_round(&self) -> Option<RoundId> {
        self.round_ids.last().copied()
    }

    /// Index of the last round.
    pub fn current_index(&self) -> u32 {
        self.round_ids.len().saturating_sub(1) as u32
    }

    /// Allocate the next round id and append it.
    pub fn push_round(&mut self) -> RoundId {
        let id = RoundId::for_index(self.id, self.round_ids.len() as u32);
        self.round_ids.push(id);
        id
    }

    /// Set the winner unless one is already set. Returns whether it was set.
    pub fn declare_winner(&mut self, participant: ParticipantId) -> bool {
        if self.winner.is_some() {
            return false;
        }
        self.winner = Some(participant);
        true
    }

    /// Names of the fields that differ from `other`.
    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(
            self,
            other,
            league_id,
            created_at,
            participant_ids,
            round_ids,
            winner
        )
    }
}

/// One simultaneous-move cycle within a Game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Derived from game and index.
    pub id: RoundId,
    /// The game this round belongs to.
    pub game_id: GameId,
    /// 0-based position in the game.
    pub index: u32,
    /// Store-managed write version.
    pub version: u64,
}

impl Round {
    /// Round `index` of `game_id`.
    pub fn new(game_id: GameId, index: u32) -> Self {
        Self {
            id: RoundId::for_index(game_id, index),
            game_id,
            index,
            version: 0,
        }
    }

    /// Names of the fields that differ from `other`.
    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(self, other, game_id, index)
    }
}

/// A move's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Not chosen yet.
    Undecided,
    /// Beats scissors.
    Rock,
    /// Beats rock.
    Paper,
    /// Beats paper.
    Scissors,
    /// Out of the game.
    Eliminated,
}

impl Shape {
    /// Rock, paper or scissors.
    pub fn is_played(&self) -> bool {
        matches!(self, Shape::Rock | Shape::Paper | Shape::Scissors)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::Undecided => "undecided",
            Shape::Rock => "rock",
            Shape::Paper => "paper",
            Shape::Scissors => "scissors",
            Shape::Eliminated => "eliminated",
        };
        f.write_str(name)
    }
}

/// One participant's input for one Round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    /// Derived from round and participant.
    pub id: MoveId,
    /// The round the move belongs to.
    pub round_id: RoundId,
    /// Who moves.
    pub participant_id: ParticipantId,
    /// What they chose.
    pub shape: Shape,
    /// Store-managed write version.
    pub version: u64,
}

impl Move {
    /// `participant`'s move in `round_id`.
    pub fn new(round_id: RoundId, participant_id: ParticipantId, shape: Shape) -> Self {
        Self {
            id: MoveId::for_round(round_id, participant_id),
            round_id,
            participant_id,
            shape,
            version: 0,
        }
    }

    /// Names of the fields that differ from `other`.
    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        changed_fields!(self, other, round_id, participant_id, shape)
    }
}

/// The kind of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// [`Account`]
    Account,
    /// [`Participant`]
    Participant,
    /// [`League`]
    League,
    /// [`Game`]
    Game,
    /// [`Round`]
    Round,
    /// [`Move`]
    Move,
}

impl EntityKind {
    /// Stable name used as the storage discriminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::Participant => "participant",
            EntityKind::League => "league",
            EntityKind::Game => "game",
            EntityKind::Round => "round",
            EntityKind::Move => "move",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account" => Ok(EntityKind::Account),
            "participant" => Ok(EntityKind::Participant),
            "league" => Ok(EntityKind::League),
            "game" => Ok(EntityKind::Game),
            "round" => Ok(EntityKind::Round),
            "move" => Ok(EntityKind::Move),
            other => Err(TypesError::InvalidData(format!(
                "unknown entity kind: {other}"
            ))),
        }
    }
}

/// Kind and id of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// What kind of entity.
    pub kind: EntityKind,
    /// Its id.
    pub id: Uuid,
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Any stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entity {
    /// An account.
    Account(Account),
    /// A participant.
    Participant(Participant),
    /// A league.
    League(League),
    /// A game.
    Game(Game),
    /// A round.
    Round(Round),
    /// A move.
    Move(Move),
}

impl Entity {
    /// The entity's kind.
    pub fn kind(&self) -> EntityKind {
        self.entity_ref().kind
    }

    /// The entity's kind and id.
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            Entity::Account(e) => e.entity_ref(),
            Entity::Participant(e) => e.entity_ref(),
            Entity::League(e) => e.entity_ref(),
            Entity::Game(e) => e.entity_ref(),
            Entity::Round(e) => e.entity_ref(),
            Entity::Move(e) => e.entity_ref(),
        }
    }

    /// The store-managed write version.
    pub fn version(&self) -> u64 {
        match self {
            Entity::Account(e) => e.version,
            Entity::Participant(e) => e.version,
            Entity::League(e) => e.version,
            Entity::Game(e) => e.version,
            Entity::Round(e) => e.version,
            Entity::Move(e) => e.version,
        }
    }

    /// Overwrite the write version. Only stores call this.
    pub fn set_version(&mut self, version: u64) {
        match self {
            Entity::Account(e) => e.version = version,
            Entity::Participant(e) => e.version = version,
            Entity::League(e) => e.version = version,
            Entity::Game(e) => e.version = version,
            Entity::Round(e) => e.version = version,
            Entity::Move(e) => e.version = version,
        }
    }

    /// Names of the fields that differ between `self` and `newer`.
    ///
    /// Versions are ignored. Entities of different kinds or ids differ in
    /// every field, reported as a single `"*"`.
    pub fn changed_fields(&self, newer: &Entity) -> Vec<&'static str> {
        match (self, newer) {
            (Entity::Account(a), Entity::Account(b)) if a.id == b.id => a.changed_fields(b),
            (Entity::Participant(a), Entity::Participant(b)) if a.id == b.id => {
                a.changed_fields(b)
            }
            (Entity::League(a), Entity::League(b)) if a.id == b.id => a.changed_fields(b),
            (Entity::Game(a), Entity::Game(b)) if a.id == b.id => a.changed_fields(b),
            (Entity::Round(a), Entity::Round(b)) if a.id == b.id => a.changed_fields(b),
            (Entity::Move(a), Entity::Move(b)) if a.id == b.id => a.changed_fields(b),
            _ => vec!["*"],
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypesError> {
        rmp_serde::to_vec_named(self).map_err(TypesError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        rmp_serde::from_slice(bytes).map_err(TypesError::Deserialization)
    }
}

/// A concrete entity type that can be stored and fetched.
pub trait Record: Clone + Into<Entity> + Send + Sync + 'static {
    /// The kind stored for this type.
    const KIND: EntityKind;

    /// Unwrap an [`Entity`] of this kind.
    fn from_entity(entity: Entity) -> Option<Self>;

    /// Kind and id of this record.
    fn entity_ref(&self) -> EntityRef;
}

macro_rules! record {
    ($ty:ident, $id:ident) => {
        impl Record for $ty {
            const KIND: EntityKind = EntityKind::$ty;

            fn from_entity(entity: Entity) -> Option<Self> {
                match entity {
                    Entity::$ty(record) => Some(record),
                    _ => None,
                }
            }

            fn entity_ref(&self) -> EntityRef {
                self.id.into()
            }
        }

        impl From<$ty> for Entity {
            fn from(record: $ty) -> Self {
                Entity::$ty(record)
            }
        }

        impl From<$id> for EntityRef {
            fn from(id: $id) -> Self {
                EntityRef {
                    kind: EntityKind::$ty,
                    id: *id.as_uuid(),
                }
            }
        }
    };
}

record!(Account, AccountId);
record!(Participant, ParticipantId);
record!(League, LeagueId);
record!(Game, GameId);
record!(Round, RoundId);
record!(Move, MoveId);
