//! Change history processor.
//!
//! When a store reports a remote change, reads the transactions after the
//! stored history token, drops this device's own, and reacts to the rest:
//!
//! 1. leagues whose membership changed are reconciled, then their share
//!    participants are bound
//! 2. rounds whose moves changed, and the open round of newly arrived
//!    games, are completed when ready
//!
//! The token is saved only after a page was fully handled, so a failure
//! leaves the page to be processed again on the next trigger. Every step is
//! idempotent.

use crate::error::ClientError;
use crate::events::{EventBus, RelevantTransactions, StoreChanged, SyncEvent};
use crate::reconcile::{IdentityReconciler, ReconcileOutcome};
use crate::relay::Relay;
use crate::share::ShareBinder;
use crate::topology::StoreTopology;
use crate::tournament::{RoundCompletion, TournamentService};
use league_core::IdentityError;
use league_store::{fetch_record, ObjectStore, TokenStore};
use league_types::{
    Author, ChangeKind, EntityKind, Game, GameId, HistoryToken, LeagueId, Move, MoveId,
    Participant, ParticipantId, RoundId, Scope, StoreId, Transaction,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one [`HistoryProcessor::process_now`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// The store processed.
    pub store_id: StoreId,
    /// Its scope.
    pub scope: Scope,
    /// Token before processing.
    pub token_before: Option<HistoryToken>,
    /// Token after processing.
    pub token_after: Option<HistoryToken>,
    /// Transactions read.
    pub fetched: usize,
    /// Transactions by other authors.
    pub relevant: usize,
    /// Leagues reconciled.
    pub leagues: BTreeSet<LeagueId>,
    /// Combined outcome of reconciliation and participant binding.
    pub reconciled: ReconcileOutcome,
    /// Leagues skipped because they need an explicit merge.
    pub conflicts: Vec<IdentityError>,
    /// Games whose round was completed.
    pub completed: Vec<GameId>,
}

impl BatchReport {
    fn new(store_id: StoreId, scope: Scope, token: Option<HistoryToken>) -> Self {
        Self {
            store_id,
            scope,
            token_before: token,
            token_after: token,
            fetched: 0,
            relevant: 0,
            leagues: BTreeSet::new(),
            reconciled: ReconcileOutcome::default(),
            conflicts: Vec::new(),
            completed: Vec::new(),
        }
    }
}

/// Entities a page of transactions touched, by what they trigger.
#[derive(Debug, Default)]
struct Triggers {
    leagues: BTreeSet<LeagueId>,
    participants: BTreeSet<ParticipantId>,
    moves: BTreeSet<MoveId>,
    rounds: BTreeSet<RoundId>,
    games: BTreeSet<GameId>,
}

impl Triggers {
    fn scan(transactions: &[Transaction]) -> Self {
        let mut triggers = Self::default();
        for change in transactions.iter().flat_map(|tx| &tx.changes) {
            let id = change.entity.id;
            match (change.entity.kind, change.kind) {
                (EntityKind::League, ChangeKind::Insert) => {
                    triggers.leagues.insert(LeagueId::from_uuid(id));
                }
                (EntityKind::League, ChangeKind::Update) if change.updated("participant_ids") => {
                    triggers.leagues.insert(LeagueId::from_uuid(id));
                }
                (EntityKind::Participant, ChangeKind::Insert) => {
                    triggers.participants.insert(ParticipantId::from_uuid(id));
                }
                (EntityKind::Move, ChangeKind::Insert | ChangeKind::Update) => {
                    triggers.moves.insert(MoveId::from_uuid(id));
                }
                (EntityKind::Round, ChangeKind::Insert) => {
                    triggers.rounds.insert(RoundId::from_uuid(id));
                }
                (EntityKind::Game, ChangeKind::Insert) => {
                    triggers.games.insert(GameId::from_uuid(id));
                }
                _ => {}
            }
        }
        triggers
    }
}

/// Processes remote changes of the history-tracked stores.
pub struct HistoryProcessor<R: Relay> {
    topology: Arc<StoreTopology>,
    tokens: Arc<dyn TokenStore>,
    author: Author,
    batch_limit: Option<usize>,
    reconciler: Arc<IdentityReconciler>,
    binder: Arc<ShareBinder<R>>,
    tournament: Arc<TournamentService>,
    events: EventBus,
}

impl<R: Relay> HistoryProcessor<R> {
    /// Create a processor ignoring transactions by `author`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        topology: Arc<StoreTopology>,
        tokens: Arc<dyn TokenStore>,
        author: Author,
        batch_limit: Option<usize>,
        reconciler: Arc<IdentityReconciler>,
        binder: Arc<ShareBinder<R>>,
        tournament: Arc<TournamentService>,
        events: EventBus,
    ) -> Self {
        Self {
            topology,
            tokens,
            author,
            batch_limit,
            reconciler,
            binder,
            tournament,
            events,
        }
    }

    /// Handle a remote-change notification for `store_id`.
    ///
    /// Returns `None` for stores whose history is not tracked.
    pub async fn process_now(&self, store_id: StoreId) -> Result<Option<BatchReport>, ClientError> {
        let Some(store) = self.topology.store_by_id(store_id) else {
            debug!("Ignoring change notification for unknown store {}", store_id);
            return Ok(None);
        };
        let scope = store.scope();
        self.events
            .publish_store_changed(StoreChanged { store_id, scope });
        if !scope.tracks_history() {
            return Ok(None);
        }

        match self.process_store(store.as_ref()).await {
            Ok(report) => {
                if report.relevant > 0 {
                    info!(
                        "Processed {} remote transactions of {} store, token now {:?}",
                        report.relevant, scope, report.token_after
                    );
                }
                Ok(Some(report))
            }
            Err(err) => {
                warn!("History processing of {} store failed: {}", scope, err);
                if err.is_recoverable() {
                    self.events.publish_sync(SyncEvent::FetchFailed {
                        store_id,
                        error: err.to_string(),
                    });
                }
                Err(err)
            }
        }
    }

    async fn process_store(&self, store: &dyn ObjectStore) -> Result<BatchReport, ClientError> {
        let store_id = store.id();
        let token = self
            .tokens
            .load(store_id)
            .await
            .map_err(ClientError::SyncFetch)?;
        let mut report = BatchReport::new(store_id, store.scope(), token);

        loop {
            let page = store
                .fetch_history(report.token_after, self.batch_limit)
                .await
                .map_err(ClientError::SyncFetch)?;
            let Some(last) = page.last().map(|tx| tx.token) else {
                break;
            };
            let full_page = self.batch_limit.map_or(false, |limit| page.len() >= limit);
            report.fetched += page.len();

            let relevant: Vec<Transaction> = page
                .into_iter()
                .filter(|tx| !tx.is_authored_by(&self.author) && tx.has_changes())
                .collect();
            report.relevant += relevant.len();
            self.handle(store, &relevant, &mut report).await?;

            self.tokens
                .save(store_id, last)
                .await
                .map_err(ClientError::SyncFetch)?;
            report.token_after = Some(last);
            debug!("{} store history token advanced to {}", store.scope(), last.value());

            if !relevant.is_empty() {
                self.events.publish_transactions(RelevantTransactions {
                    store_id,
                    scope: store.scope(),
                    transactions: relevant.into(),
                });
            }
            if !full_page {
                break;
            }
        }
        Ok(report)
    }

    async fn handle(
        &self,
        store: &dyn ObjectStore,
        transactions: &[Transaction],
        report: &mut BatchReport,
    ) -> Result<(), ClientError> {
        if transactions.is_empty() {
            return Ok(());
        }
        let triggers = Triggers::scan(transactions);

        let mut leagues = triggers.leagues;
        for id in triggers.participants {
            if let Some(participant) = fetch_record::<Participant>(store, id).await? {
                leagues.insert(participant.league_id);
            }
        }
        for league_id in leagues {
            self.handle_league(league_id, report).await?;
        }

        let mut rounds = triggers.rounds;
        for id in triggers.moves {
            if let Some(played) = fetch_record::<Move>(store, id).await? {
                rounds.insert(played.round_id);
            }
        }
        // Moves may have arrived before their game.
        for id in triggers.games {
            if let Some(round) = fetch_record::<Game>(store, id)
                .await?
                .and_then(|game| game.current_round())
            {
                rounds.insert(round);
            }
        }
        for round_id in rounds {
            match self.tournament.complete_round_if_ready(round_id).await {
                Ok(RoundCompletion::Advanced { game_id, .. } | RoundCompletion::Won { game_id, .. }) => {
                    report.completed.push(game_id);
                }
                Ok(_) => {}
                // Deleted while we were looking.
                Err(ClientError::NotFound(entity)) => {
                    debug!("Skipping round {}: {} is not here", round_id, entity);
                }
                Err(ClientError::Tournament(err)) => {
                    warn!("Skipping round {}: {}", round_id, err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn handle_league(
        &self,
        league_id: LeagueId,
        report: &mut BatchReport,
    ) -> Result<(), ClientError> {
        let outcome = match self.reconciler.reconcile_league(league_id).await {
            Ok(outcome) => outcome,
            Err(ClientError::Identity(conflict)) => {
                self.report_conflict(conflict, report);
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        report.leagues.insert(league_id);
        report.reconciled.add(outcome);

        match self.binder.bind_share_participants(league_id).await {
            Ok(created) => {
                report.reconciled.participants_created += created;
                Ok(())
            }
            Err(ClientError::Identity(conflict)) => {
                self.report_conflict(conflict, report);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn report_conflict(&self, conflict: IdentityError, report: &mut BatchReport) {
        warn!("Skipping league reconciliation: {}", conflict);
        self.events
            .publish_sync(SyncEvent::IdentityConflict(conflict.clone()));
        report.conflicts.push(conflict);
    }
}
