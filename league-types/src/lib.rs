//! # league-types
//!
//! Entity, identity and history types for the JanKenPon league tracker.
//!
//! This crate provides the foundational types used across all league crates:
//! - [`AccountId`], [`LeagueId`], [`GameId`], ... - Identity types, some derived from natural keys
//! - [`Account`], [`Participant`], [`League`], [`Game`], [`Round`], [`Move`] - Stored entities
//! - [`Transaction`], [`ChangeRecord`], [`HistoryToken`] - Change history
//! - [`Query`] - Predicate queries over stored entities
//! - [`Scope`] - Visibility scopes of the object stores
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod entity;
mod error;
mod history;
mod identity;
mod ids;
mod query;
mod scope;

pub use entity::{
    Account, AccountScope, Entity, EntityKind, EntityRef, Game, League, Move, Participant,
    Record, Round, Shape,
};
pub use error::TypesError;
pub use history::{ChangeKind, ChangeRecord, Transaction};
pub use identity::{ExternalIdentity, Role};
pub use ids::{
    AccountId, Author, DeviceId, GameId, HistoryToken, LeagueId, MoveId, ParticipantId, RoundId,
    StoreId,
};
pub use query::Query;
pub use scope::Scope;
