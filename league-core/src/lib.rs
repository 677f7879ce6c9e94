//! # league-core
//!
//! Pure logic for the JanKenPon league tracker (no I/O, instant tests).
//!
//! This crate implements the tournament state machine and the identity
//! reconciliation planner without any store or relay access.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take a snapshot of entities
//! and produce new state plus the writes to perform. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same snapshot → same plan)
//! - Easy reasoning about round transitions
//!
//! The actual reads and writes are performed by `league-client`, which
//! interprets the actions and plans produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod reconcile;
pub mod tournament;

pub use reconcile::{
    check_memberships, owner_account, plan_league, plan_seating, IdentityError, LeagueSnapshot,
    ReconcilePlan,
};
pub use tournament::{
    duel, resolve_round, round_progress, seed_moves, validate_entrants, GameState, Outcome,
    RoundProgress, RoundResolution, Standing, TournamentAction, TournamentError,
};
