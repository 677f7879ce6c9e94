//! Tournament service: leagues, games, rounds and moves on the shared store.
//!
//! Decisions come from `league_core`; this module reads the entities they
//! need and commits the result.

use crate::error::{retry_on_conflict, ClientError};
use crate::events::{EventBus, SyncEvent};
use crate::reconcile::IdentityReconciler;
use crate::topology::StoreTopology;
use league_core::{
    plan_seating, resolve_round, round_progress, seed_moves, validate_entrants, GameState,
    RoundProgress, TournamentAction, TournamentError,
};
use league_store::{fetch_record, fetch_records, Commit, ObjectStore};
use league_types::{
    Account, Author, EntityKind, EntityRef, Game, GameId, League, LeagueId, Move, MoveId,
    Participant, ParticipantId, Query, Record, Round, RoundId, Scope, Shape,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Result of [`TournamentService::complete_round_if_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundCompletion {
    /// Some participants have not played yet.
    AwaitingMoves {
        /// How many.
        remaining: usize,
    },
    /// The next round was opened.
    Advanced {
        /// The game.
        game_id: GameId,
        /// The new round.
        round_id: RoundId,
        /// Its index.
        index: u32,
    },
    /// The round produced the game's winner.
    Won {
        /// The game.
        game_id: GameId,
        /// The winner.
        winner: ParticipantId,
    },
    /// The game was already won.
    AlreadyWon {
        /// The winner.
        winner: ParticipantId,
    },
    /// The round is no longer the game's current one.
    Superseded,
}

/// Seconds since the Unix epoch.
fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn load<T: Record>(store: &dyn ObjectStore, id: impl Into<EntityRef>) -> Result<T, ClientError> {
    let id = id.into();
    fetch_record(store, id)
        .await?
        .ok_or(ClientError::NotFound(id))
}

/// League, game and move operations.
pub struct TournamentService {
    topology: Arc<StoreTopology>,
    reconciler: Arc<IdentityReconciler>,
    author: Author,
    events: EventBus,
}

impl TournamentService {
    /// Create a service writing as `author`.
    pub fn new(
        topology: Arc<StoreTopology>,
        reconciler: Arc<IdentityReconciler>,
        author: Author,
        events: EventBus,
    ) -> Self {
        Self {
            topology,
            reconciler,
            author,
            events,
        }
    }

    fn shared(&self) -> Arc<dyn ObjectStore> {
        self.topology.store_for(Scope::LeagueShared)
    }

    // =========================================================================
    // Leagues
    // =========================================================================

    /// Create a league with `owner` as its first participant.
    pub async fn create_league(&self, name: &str, owner: &Account) -> Result<League, ClientError> {
        let shared = self.shared();
        let league_id = LeagueId::new();
        let seat = Participant::for_account(owner, league_id);
        let league = League::new(name, &seat, now_secs());
        let seat_id = seat.id;

        shared
            .commit(Commit::new(self.author.clone()).put(seat).put(league))
            .await?;
        retry_on_conflict("link league owner", || {
            self.link_account(owner, seat_id, league_id)
        })
        .await?;

        info!("Created league {} ({})", league_id, name);
        load(shared.as_ref(), league_id).await
    }

    async fn link_account(
        &self,
        account: &Account,
        participant: ParticipantId,
        league: LeagueId,
    ) -> Result<(), ClientError> {
        let private = self.topology.store_for(Scope::OwnerPrivate);
        let mut current: Account = load(private.as_ref(), account.id).await?;
        if current.link(participant, league) {
            private.save(current.into(), &self.author).await?;
        }
        Ok(())
    }

    /// Seat `account` in the league. Returns its existing participant when
    /// it is already a member.
    pub async fn add_participant(
        &self,
        league_id: LeagueId,
        account: &Account,
    ) -> Result<Participant, ClientError> {
        retry_on_conflict("add participant", || {
            self.try_add_participant(league_id, account)
        })
        .await
    }

    async fn try_add_participant(
        &self,
        league_id: LeagueId,
        account: &Account,
    ) -> Result<Participant, ClientError> {
        let state = self
            .reconciler
            .load(league_id)
            .await?
            .ok_or(ClientError::NotFound(league_id.into()))?;
        if !state.accounts.iter().any(|a| a.id == account.id) {
            return Err(ClientError::NotFound(account.id.into()));
        }
        let plan = plan_seating(state.snapshot(), &[account.id])?;
        self.reconciler.apply_plan(plan).await?;

        let league: League = load(self.shared().as_ref(), league_id).await?;
        self.participants(league_id)
            .await?
            .into_iter()
            .find(|p| p.account_id == Some(account.id) && league.has_member(p.id))
            .ok_or(ClientError::NotFound(account.id.into()))
    }

    /// One league.
    pub async fn league(&self, league_id: LeagueId) -> Result<League, ClientError> {
        load(self.shared().as_ref(), league_id).await
    }

    /// Every league in the shared store, by name.
    pub async fn leagues(&self) -> Result<Vec<League>, ClientError> {
        let mut leagues: Vec<League> =
            fetch_records(self.shared().as_ref(), &Query::All(EntityKind::League)).await?;
        leagues.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(leagues)
    }

    /// Participants stored for a league, members or not.
    pub async fn participants(&self, league_id: LeagueId) -> Result<Vec<Participant>, ClientError> {
        Ok(fetch_records(self.shared().as_ref(), &Query::ParticipantsInLeague(league_id)).await?)
    }

    // =========================================================================
    // Games
    // =========================================================================

    /// Start a game between `participants`, with round 0 open.
    pub async fn create_game(
        &self,
        league_id: LeagueId,
        participants: &[ParticipantId],
    ) -> Result<Game, ClientError> {
        let entrants: BTreeSet<ParticipantId> = participants.iter().copied().collect();
        let game_id =
            retry_on_conflict("create game", || self.try_create_game(league_id, &entrants)).await?;
        load(self.shared().as_ref(), game_id).await
    }

    async fn try_create_game(
        &self,
        league_id: LeagueId,
        entrants: &BTreeSet<ParticipantId>,
    ) -> Result<GameId, ClientError> {
        let shared = self.shared();
        let mut league: League = load(shared.as_ref(), league_id).await?;
        validate_entrants(&league, entrants)?;

        let game = Game::new(league_id, entrants.clone(), now_secs());
        let round = Round::new(game.id, 0);
        let undecided: Vec<(ParticipantId, Shape)> =
            entrants.iter().map(|p| (*p, Shape::Undecided)).collect();
        let moves = seed_moves(round.id, &undecided);
        league.game_ids.insert(game.id);
        let game_id = game.id;

        shared
            .commit(
                Commit::new(self.author.clone())
                    .put(league)
                    .put(game)
                    .put(round)
                    .put_all(moves),
            )
            .await?;
        info!(
            "Created game {} in league {} with {} participants",
            game_id,
            league_id,
            entrants.len()
        );
        Ok(game_id)
    }

    /// Games of a league, oldest first.
    pub async fn games(&self, league_id: LeagueId) -> Result<Vec<Game>, ClientError> {
        let mut games: Vec<Game> =
            fetch_records(self.shared().as_ref(), &Query::GamesInLeague(league_id)).await?;
        games.sort_by_key(|g| (g.created_at, g.id));
        Ok(games)
    }

    /// State of a stored game.
    pub async fn game_state(&self, game_id: GameId) -> Result<GameState, ClientError> {
        let game: Game = load(self.shared().as_ref(), game_id).await?;
        Ok(GameState::of(&game))
    }

    /// Rounds of a game in index order.
    pub async fn rounds(&self, game_id: GameId) -> Result<Vec<Round>, ClientError> {
        let mut rounds: Vec<Round> =
            fetch_records(self.shared().as_ref(), &Query::RoundsInGame(game_id)).await?;
        rounds.sort_by_key(|r| r.index);
        Ok(rounds)
    }

    /// Moves of a round.
    pub async fn moves(&self, round_id: RoundId) -> Result<Vec<Move>, ClientError> {
        Ok(fetch_records(self.shared().as_ref(), &Query::MovesInRound(round_id)).await?)
    }

    // =========================================================================
    // Moves
    // =========================================================================

    /// Record `participant`'s shape for `round_id`.
    pub async fn set_move(
        &self,
        round_id: RoundId,
        participant: ParticipantId,
        shape: Shape,
    ) -> Result<Move, ClientError> {
        retry_on_conflict("set move", || self.try_set_move(round_id, participant, shape)).await
    }

    async fn try_set_move(
        &self,
        round_id: RoundId,
        participant: ParticipantId,
        shape: Shape,
    ) -> Result<Move, ClientError> {
        let shared = self.shared();
        let round: Round = load(shared.as_ref(), round_id).await?;
        let game: Game = load(shared.as_ref(), round.game_id).await?;
        if !game.participant_ids.contains(&participant) {
            return Err(TournamentError::NotInGame(participant).into());
        }
        let move_id = MoveId::for_round(round_id, participant);
        let mut current: Move = load(shared.as_ref(), move_id).await?;
        GameState::of(&game).check_move(&round, current.shape, shape)?;

        current.shape = shape;
        shared.save(current.into(), &self.author).await?;
        debug!("Participant {} played {} in round {}", participant, shape, round.index);
        load(shared.as_ref(), move_id).await
    }

    /// Resolve `round_id` once every participant of its game has played.
    ///
    /// Participants whose move has not arrived on this device yet count as
    /// not having played.
    ///
    /// Opens the next round or declares the winner. Safe to call on any
    /// round at any time: stale rounds and finished games change nothing.
    pub async fn complete_round_if_ready(
        &self,
        round_id: RoundId,
    ) -> Result<RoundCompletion, ClientError> {
        retry_on_conflict("complete round", || self.try_complete_round(round_id)).await
    }

    async fn try_complete_round(&self, round_id: RoundId) -> Result<RoundCompletion, ClientError> {
        let shared = self.shared();
        let round: Round = load(shared.as_ref(), round_id).await?;
        let mut game: Game = load(shared.as_ref(), round.game_id).await?;
        if let Some(winner) = game.winner {
            return Ok(RoundCompletion::AlreadyWon { winner });
        }
        if game.current_round() != Some(round.id) {
            return Ok(RoundCompletion::Superseded);
        }

        let moves = self.moves(round_id).await?;
        let played = match round_progress(&game, &moves) {
            RoundProgress::Decided(played) => played,
            RoundProgress::Awaiting { remaining } => {
                return Ok(RoundCompletion::AwaitingMoves { remaining });
            }
        };
        let resolution = resolve_round(round.index, &played)?;
        let (state, actions) = GameState::of(&game).on_resolution(resolution);
        if actions.is_empty() {
            return Ok(RoundCompletion::Superseded);
        }

        let mut commit = Commit::new(self.author.clone());
        let mut completion = RoundCompletion::Superseded;
        for action in actions {
            match action {
                TournamentAction::DeclareWinner { winner } => {
                    game.declare_winner(winner);
                    completion = RoundCompletion::Won {
                        game_id: game.id,
                        winner,
                    };
                }
                TournamentAction::OpenRound { index, moves } => {
                    let next_id = game.push_round();
                    commit = commit
                        .put(Round::new(game.id, index))
                        .put_all(seed_moves(next_id, &moves));
                    completion = RoundCompletion::Advanced {
                        game_id: game.id,
                        round_id: next_id,
                        index,
                    };
                }
            }
        }
        let game_id = game.id;
        shared.commit(commit.put(game)).await?;

        match completion {
            RoundCompletion::Won { winner, .. } => {
                info!("Game {} won by participant {}", game_id, winner)
            }
            _ => info!("Game {} advanced to {:?}", game_id, state),
        }
        self.events
            .publish_sync(SyncEvent::RoundAdvanced { game_id, state });
        Ok(completion)
    }
}
