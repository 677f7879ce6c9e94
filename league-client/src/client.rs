//! LeagueClient - the main interface of the league tracker.
//!
//! Wires the store topology, the relay and the background history worker
//! together and exposes the league operations applications call.
//!
//! # Architecture
//!
//! ```text
//! Application → LeagueClient → TournamentService ─┐
//!                    │              ShareBinder ──┼→ StoreTopology
//!                    │        IdentityReconciler ─┘
//!                    ↓
//!              WorkerHandle → HistoryProcessor (remote changes)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use league_client::{LeagueClient, MockRelay, TrackerConfig};
//!
//! let client = LeagueClient::open(TrackerConfig::in_memory(), MockRelay::new()).await?;
//! let owner = client.establish_owner("Ann").await?;
//! let league = client.create_league("Lunch").await?;
//! ```

use crate::config::{ConfigError, TrackerConfig};
use crate::error::ClientError;
use crate::events::{EventBus, RelevantTransactions, StoreChanged, SyncEvent};
use crate::history::{BatchReport, HistoryProcessor};
use crate::reconcile::IdentityReconciler;
use crate::relay::{InvitationMetadata, Relay, ShareHandle, StoreBinding};
use crate::share::ShareBinder;
use crate::topology::StoreTopology;
use crate::tournament::{RoundCompletion, TournamentService};
use crate::worker::WorkerHandle;
use league_core::GameState;
use league_store::{MemoryTokenStore, SqliteTokenStore, TokenStore};
use league_types::{
    Account, Author, ExternalIdentity, Game, GameId, League, LeagueId, Move, Participant,
    ParticipantId, Role, Round, RoundId, Shape, StoreId,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// The league tracker engine of one device.
pub struct LeagueClient<R: Relay> {
    config: TrackerConfig,
    author: Author,
    topology: Arc<StoreTopology>,
    relay: Arc<R>,
    events: EventBus,
    reconciler: Arc<IdentityReconciler>,
    binder: Arc<ShareBinder<R>>,
    tournament: Arc<TournamentService>,
    processor: Arc<HistoryProcessor<R>>,
    worker: WorkerHandle,
}

impl<R: Relay> LeagueClient<R> {
    /// Provision the stores described by `config` and start the worker.
    ///
    /// # Errors
    ///
    /// [`ClientError::Config`] when a store or the token database cannot be
    /// opened.
    pub async fn open(config: TrackerConfig, relay: R) -> Result<Self, ClientError> {
        let topology = StoreTopology::provision(&config.stores).await?;
        let tokens: Arc<dyn TokenStore> = if config.stores.in_memory {
            Arc::new(MemoryTokenStore::new())
        } else {
            let path = &config.history.token_database;
            if let Some(folder) = path.parent() {
                std::fs::create_dir_all(folder).map_err(|source| ConfigError::CreateDir {
                    path: folder.to_path_buf(),
                    source,
                })?;
            }
            let tokens = SqliteTokenStore::open(path)
                .await
                .map_err(|source| ConfigError::TokenStore {
                    path: path.clone(),
                    source,
                })?;
            Arc::new(tokens)
        };
        Ok(Self::with_parts(config, topology, tokens, relay))
    }

    /// Assemble a client from existing parts and start the worker.
    ///
    /// Must be called within a Tokio runtime.
    pub fn with_parts(
        config: TrackerConfig,
        topology: StoreTopology,
        tokens: Arc<dyn TokenStore>,
        relay: R,
    ) -> Self {
        let author = config.author();
        let topology = Arc::new(topology);
        let relay = Arc::new(relay);
        let events = EventBus::default();

        let reconciler = Arc::new(IdentityReconciler::new(topology.clone(), author.clone()));
        let binder = Arc::new(ShareBinder::new(
            relay.clone(),
            topology.clone(),
            reconciler.clone(),
            author.clone(),
        ));
        let tournament = Arc::new(TournamentService::new(
            topology.clone(),
            reconciler.clone(),
            author.clone(),
            events.clone(),
        ));
        let processor = Arc::new(HistoryProcessor::new(
            topology.clone(),
            tokens,
            author.clone(),
            config.batch_limit(),
            reconciler.clone(),
            binder.clone(),
            tournament.clone(),
            events.clone(),
        ));
        let worker = WorkerHandle::spawn(processor.clone());

        info!(
            "League client for {} started as {}",
            config.device.name,
            author.as_str()
        );
        Self {
            config,
            author,
            topology,
            relay,
            events,
            reconciler,
            binder,
            tournament,
            processor,
            worker,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Author tag of this device's writes.
    pub fn author(&self) -> &Author {
        &self.author
    }

    /// The device's stores.
    pub fn topology(&self) -> &StoreTopology {
        &self.topology
    }

    /// The relay.
    pub fn relay(&self) -> &R {
        &self.relay
    }

    // =========================================================================
    // Events and history
    // =========================================================================

    /// Receive every remote-change notification.
    pub fn subscribe_store_changed(&self) -> broadcast::Receiver<StoreChanged> {
        self.events.subscribe_store_changed()
    }

    /// Receive every processed batch of relevant transactions.
    pub fn subscribe_transactions(&self) -> broadcast::Receiver<RelevantTransactions> {
        self.events.subscribe_transactions()
    }

    /// Receive sync outcomes.
    pub fn subscribe_sync_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe_sync_events()
    }

    /// Notify the engine that `store_id` received remote changes.
    ///
    /// Returns immediately; processing happens on the worker.
    pub fn on_remote_change(&self, store_id: StoreId) -> Result<(), ClientError> {
        self.worker.enqueue(store_id)
    }

    /// Wait until every queued notification was processed.
    pub async fn flush(&self) -> Result<(), ClientError> {
        self.worker.flush().await
    }

    /// Process `store_id` on the caller's task, bypassing the queue.
    pub async fn process_now(&self, store_id: StoreId) -> Result<Option<BatchReport>, ClientError> {
        self.processor.process_now(store_id).await
    }

    /// Stop the worker after it finished what is queued.
    pub async fn shutdown(self) {
        self.worker.shutdown().await;
        info!("League client stopped");
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Return the owner account, creating it from the relay identity on
    /// first use.
    pub async fn establish_owner(&self, display_name: &str) -> Result<Account, ClientError> {
        let identity = self.relay.resolve_own_identity().await?;
        self.reconciler.establish_owner(display_name, &identity).await
    }

    /// The owner account.
    pub async fn owner(&self) -> Result<Account, ClientError> {
        self.reconciler.owner().await
    }

    /// Repair the identity graph of a league right away.
    pub async fn reconcile_league(&self, league_id: LeagueId) -> Result<(), ClientError> {
        self.reconciler.reconcile_league(league_id).await.map(|_| ())
    }

    /// Fold `discard` into `keep` after a duplicate-participant conflict.
    pub async fn merge_participants(
        &self,
        league_id: LeagueId,
        keep: ParticipantId,
        discard: ParticipantId,
    ) -> Result<(), ClientError> {
        self.reconciler
            .merge_participants(league_id, keep, discard)
            .await
    }

    // =========================================================================
    // Sharing
    // =========================================================================

    /// The share of a league, created on first use.
    pub async fn share_league(&self, league_id: LeagueId) -> Result<ShareHandle, ClientError> {
        let league = self.tournament.league(league_id).await?;
        self.binder.share_for(&league).await
    }

    /// Everyone participating in `share`.
    pub async fn resolve_participants(
        &self,
        share: &ShareHandle,
    ) -> Result<Vec<(ExternalIdentity, Role)>, ClientError> {
        self.binder.resolve_participants(share).await
    }

    /// The local account of `identity`, created when none matches.
    pub async fn bind_account(&self, identity: &ExternalIdentity) -> Result<Account, ClientError> {
        self.binder.bind_account(identity).await
    }

    /// Seat every invited share participant of a league.
    pub async fn bind_share_participants(&self, league_id: LeagueId) -> Result<usize, ClientError> {
        self.binder.bind_share_participants(league_id).await
    }

    /// Accept an invitation; the league shows up once the store it lands
    /// in was processed.
    pub async fn accept_invitation(
        &self,
        metadata: &InvitationMetadata,
    ) -> Result<StoreBinding, ClientError> {
        let binding = self.binder.accept_invitation(metadata).await?;
        self.on_remote_change(self.topology.store_for(binding.scope).id())?;
        Ok(binding)
    }

    /// Stop sharing a league.
    pub async fn delete_share(&self, league_id: LeagueId) -> Result<bool, ClientError> {
        self.binder.delete_share(league_id).await
    }

    // =========================================================================
    // Tournament
    // =========================================================================

    /// Create a league with the owner as its first participant.
    pub async fn create_league(&self, name: &str) -> Result<League, ClientError> {
        let owner = self.owner().await?;
        self.tournament.create_league(name, &owner).await
    }

    /// Seat `account` in a league.
    pub async fn add_participant(
        &self,
        league_id: LeagueId,
        account: &Account,
    ) -> Result<Participant, ClientError> {
        self.tournament.add_participant(league_id, account).await
    }

    /// Start a game between `participants`.
    pub async fn create_game(
        &self,
        league_id: LeagueId,
        participants: &[ParticipantId],
    ) -> Result<Game, ClientError> {
        self.tournament.create_game(league_id, participants).await
    }

    /// Record a participant's shape for a round.
    pub async fn set_move(
        &self,
        round_id: RoundId,
        participant: ParticipantId,
        shape: Shape,
    ) -> Result<Move, ClientError> {
        self.tournament.set_move(round_id, participant, shape).await
    }

    /// Resolve a round once every participant has played.
    pub async fn complete_round_if_ready(
        &self,
        round_id: RoundId,
    ) -> Result<RoundCompletion, ClientError> {
        self.tournament.complete_round_if_ready(round_id).await
    }

    /// One league.
    pub async fn league(&self, league_id: LeagueId) -> Result<League, ClientError> {
        self.tournament.league(league_id).await
    }

    /// Every league.
    pub async fn leagues(&self) -> Result<Vec<League>, ClientError> {
        self.tournament.leagues().await
    }

    /// Participants stored for a league.
    pub async fn participants(&self, league_id: LeagueId) -> Result<Vec<Participant>, ClientError> {
        self.tournament.participants(league_id).await
    }

    /// Games of a league.
    pub async fn games(&self, league_id: LeagueId) -> Result<Vec<Game>, ClientError> {
        self.tournament.games(league_id).await
    }

    /// State of a game.
    pub async fn game_state(&self, game_id: GameId) -> Result<GameState, ClientError> {
        self.tournament.game_state(game_id).await
    }

    /// Rounds of a game in index order.
    pub async fn rounds(&self, game_id: GameId) -> Result<Vec<Round>, ClientError> {
        self.tournament.rounds(game_id).await
    }

    /// Moves of a round.
    pub async fn moves(&self, round_id: RoundId) -> Result<Vec<Move>, ClientError> {
        self.tournament.moves(round_id).await
    }
}
