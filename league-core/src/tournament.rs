//! Tournament state machine for a single game.
//!
//! This module is pure: the client reads a round's moves from the store,
//! asks [`resolve_round`] for the classification, feeds it to
//! [`GameState::on_resolution`] and writes back whatever
//! [`TournamentAction`]s come out.

use league_types::{Game, League, Move, ParticipantId, Round, RoundId, Shape};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Result of one shape played against another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The first shape beats the second.
    Win,
    /// Same shape.
    Draw,
    /// The second shape beats the first.
    Loss,
}

/// Play `shape` against `other`.
///
/// Returns `None` unless both are rock, paper or scissors.
pub fn duel(shape: Shape, other: Shape) -> Option<Outcome> {
    use Shape::{Paper, Rock, Scissors};

    if !shape.is_played() || !other.is_played() {
        return None;
    }
    Some(match (shape, other) {
        (a, b) if a == b => Outcome::Draw,
        (Rock, Scissors) | (Scissors, Paper) | (Paper, Rock) => Outcome::Win,
        _ => Outcome::Loss,
    })
}

/// Where a participant stands after a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    /// Still in the game.
    Pending,
    /// Lost at least once and won nothing this round.
    LosesOut,
    /// Was already out before this round.
    Eliminated,
}

/// Classification of every participant of a fully decided round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResolution {
    /// Index of the resolved round.
    pub index: u32,
    /// Standing of every participant with a move in the round.
    pub standings: BTreeMap<ParticipantId, Standing>,
}

impl RoundResolution {
    /// Participants still in the game.
    pub fn pending(&self) -> Vec<ParticipantId> {
        self.standings
            .iter()
            .filter(|(_, s)| **s == Standing::Pending)
            .map(|(p, _)| *p)
            .collect()
    }

    /// The winner, if exactly one participant is still pending.
    pub fn sole_survivor(&self) -> Option<ParticipantId> {
        match self.pending().as_slice() {
            [winner] => Some(*winner),
            _ => None,
        }
    }
}

/// Classify a round whose moves are all decided.
///
/// Active participants (not eliminated) play everyone else active. Anyone
/// with at least one loss and no win loses out; everyone else stays pending.
pub fn resolve_round(
    index: u32,
    moves: &[(ParticipantId, Shape)],
) -> Result<RoundResolution, TournamentError> {
    if moves.is_empty() {
        return Err(TournamentError::EmptyRound { index });
    }
    let remaining = moves
        .iter()
        .filter(|(_, shape)| *shape == Shape::Undecided)
        .count();
    if remaining > 0 {
        return Err(TournamentError::RoundUndecided { index, remaining });
    }

    let active: Vec<(ParticipantId, Shape)> = moves
        .iter()
        .copied()
        .filter(|(_, shape)| shape.is_played())
        .collect();
    if active.is_empty() {
        return Err(TournamentError::NoActiveParticipants { index });
    }

    let mut standings = BTreeMap::new();
    for (participant, shape) in moves {
        if !shape.is_played() {
            standings.insert(*participant, Standing::Eliminated);
            continue;
        }
        let mut wins = 0;
        let mut losses = 0;
        for (other, other_shape) in &active {
            if other == participant {
                continue;
            }
            match duel(*shape, *other_shape) {
                Some(Outcome::Win) => wins += 1,
                Some(Outcome::Loss) => losses += 1,
                _ => {}
            }
        }
        let standing = if losses > 0 && wins == 0 {
            Standing::LosesOut
        } else {
            Standing::Pending
        };
        standings.insert(*participant, standing);
    }

    Ok(RoundResolution { index, standings })
}

/// How far the moves stored for a round cover the game's participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundProgress {
    /// Participants whose move is undecided or has not arrived yet.
    Awaiting {
        /// How many.
        remaining: usize,
    },
    /// Every participant's move is decided, in participant order.
    Decided(Vec<(ParticipantId, Shape)>),
}

/// Match the moves stored for a round against `game`'s participants.
///
/// Moves travel separately from their round, so a participant without a
/// stored move is outstanding. Moves of anyone outside the game are ignored.
pub fn round_progress(game: &Game, moves: &[Move]) -> RoundProgress {
    let stored: BTreeMap<ParticipantId, Shape> =
        moves.iter().map(|m| (m.participant_id, m.shape)).collect();

    let mut decided = Vec::with_capacity(game.participant_ids.len());
    let mut remaining = 0;
    for participant in &game.participant_ids {
        match stored.get(participant) {
            Some(shape) if *shape != Shape::Undecided => decided.push((*participant, *shape)),
            _ => remaining += 1,
        }
    }
    if remaining > 0 {
        RoundProgress::Awaiting { remaining }
    } else {
        RoundProgress::Decided(decided)
    }
}

/// Per-game state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    /// Waiting for the moves of round `round_index`.
    Open {
        /// Index of the open round.
        round_index: u32,
    },
    /// Terminal. No more rounds, no more moves.
    Won {
        /// The last participant standing.
        winner: ParticipantId,
    },
}

/// Writes the client performs after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TournamentAction {
    /// Set the game's winner.
    DeclareWinner {
        /// The winner.
        winner: ParticipantId,
    },
    /// Create the next round with these moves.
    OpenRound {
        /// Index of the new round.
        index: u32,
        /// `Undecided` for everyone pending, `Eliminated` for the rest.
        moves: Vec<(ParticipantId, Shape)>,
    },
}

impl GameState {
    /// The state a stored game is in.
    pub fn of(game: &Game) -> Self {
        match game.winner {
            Some(winner) => Self::Won { winner },
            None => Self::Open {
                round_index: game.current_index(),
            },
        }
    }

    /// Process a resolved round and return the new state plus actions.
    ///
    /// A resolution of any round other than the open one is stale and
    /// changes nothing, as does any resolution once the game is won.
    pub fn on_resolution(self, resolution: RoundResolution) -> (Self, Vec<TournamentAction>) {
        match self {
            Self::Open { round_index } if resolution.index == round_index => {
                if let Some(winner) = resolution.sole_survivor() {
                    return (
                        Self::Won { winner },
                        vec![TournamentAction::DeclareWinner { winner }],
                    );
                }
                let index = round_index + 1;
                let moves = resolution
                    .standings
                    .iter()
                    .map(|(participant, standing)| {
                        let shape = match standing {
                            Standing::Pending => Shape::Undecided,
                            Standing::LosesOut | Standing::Eliminated => Shape::Eliminated,
                        };
                        (*participant, shape)
                    })
                    .collect();
                (
                    Self::Open { round_index: index },
                    vec![TournamentAction::OpenRound { index, moves }],
                )
            }

            // Stale or terminal - stay in current state
            state => (state, vec![]),
        }
    }

    /// Check that `current` may be changed to `requested` in `round`.
    pub fn check_move(
        &self,
        round: &Round,
        current: Shape,
        requested: Shape,
    ) -> Result<(), TournamentError> {
        match self {
            Self::Won { winner } => Err(TournamentError::GameFinished { winner: *winner }),
            Self::Open { round_index } if *round_index != round.index => {
                Err(TournamentError::RoundNotCurrent {
                    index: round.index,
                    current: *round_index,
                })
            }
            Self::Open { .. } if !requested.is_played() => {
                Err(TournamentError::NotPlayable(requested))
            }
            Self::Open { .. } if current != Shape::Undecided => {
                Err(TournamentError::MoveAlreadyDecided { shape: current })
            }
            Self::Open { .. } => Ok(()),
        }
    }

    /// Check if the game has a winner.
    pub fn is_won(&self) -> bool {
        matches!(self, Self::Won { .. })
    }
}

/// Check that a game may be created in `league` for `entrants`.
pub fn validate_entrants(
    league: &League,
    entrants: &BTreeSet<ParticipantId>,
) -> Result<(), TournamentError> {
    if entrants.is_empty() {
        return Err(TournamentError::NoParticipants);
    }
    match entrants.iter().find(|p| !league.has_member(**p)) {
        Some(outsider) => Err(TournamentError::NotInLeague(*outsider)),
        None => Ok(()),
    }
}

/// The move entities of a new round.
pub fn seed_moves(round: RoundId, moves: &[(ParticipantId, Shape)]) -> Vec<Move> {
    moves
        .iter()
        .map(|(participant, shape)| Move::new(round, *participant, *shape))
        .collect()
}

/// Error type for tournament preconditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TournamentError {
    /// The game already has a winner.
    #[error("game already won by {winner}")]
    GameFinished {
        /// The winner.
        winner: ParticipantId,
    },

    /// The round is not the game's open round.
    #[error("round {index} is not the open round {current}")]
    RoundNotCurrent {
        /// The round written to.
        index: u32,
        /// The open round.
        current: u32,
    },

    /// The move was already decided.
    #[error("move already decided as {shape}")]
    MoveAlreadyDecided {
        /// Its shape.
        shape: Shape,
    },

    /// Only rock, paper or scissors can be played.
    #[error("cannot play {0}")]
    NotPlayable(Shape),

    /// The round still has undecided moves.
    #[error("round {index} has {remaining} undecided moves")]
    RoundUndecided {
        /// The round.
        index: u32,
        /// How many moves are undecided.
        remaining: usize,
    },

    /// The round has no moves.
    #[error("round {index} has no moves")]
    EmptyRound {
        /// The round.
        index: u32,
    },

    /// Every move of the round is eliminated.
    #[error("round {index} has no active participants")]
    NoActiveParticipants {
        /// The round.
        index: u32,
    },

    /// A game needs at least one participant.
    #[error("a game needs participants")]
    NoParticipants,

    /// The participant is not a member of the league.
    #[error("participant {0} is not in the league")]
    NotInLeague(ParticipantId),

    /// The participant does not take part in the game.
    #[error("participant {0} is not in the game")]
    NotInGame(ParticipantId),

    /// The participant already has recorded moves.
    #[error("participant {0} has recorded moves")]
    HasMoves(ParticipantId),
}
