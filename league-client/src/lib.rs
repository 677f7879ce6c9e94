//! # league-client
//!
//! Multi-device engine of the JanKenPon league tracker.
//!
//! Each device keeps its own copy of the object graph in three scoped
//! stores. A cloud mirror carries changes between devices; this crate reacts
//! to what arrives so every device converges on the same leagues, games and
//! winners.
//!
//! ## Components
//!
//! - **Store topology**: one store per visibility scope ([`StoreTopology`])
//! - **History processing**: remote transactions since the last token,
//!   handled on a serial background worker ([`HistoryProcessor`])
//! - **Identity reconciliation**: accounts and participants kept consistent
//!   ([`IdentityReconciler`])
//! - **Sharing**: relay shares bound to leagues and participants
//!   ([`ShareBinder`], [`Relay`])
//! - **Tournament**: leagues, games, rounds and moves ([`TournamentService`])
//!
//! ## Example
//!
//! ```ignore
//! use league_client::{LeagueClient, MockRelay, TrackerConfig};
//! use league_types::{ExternalIdentity, Shape};
//!
//! let relay = MockRelay::signed_in(ExternalIdentity::with_record("_ann", "Ann"));
//! let client = LeagueClient::open(TrackerConfig::in_memory(), relay).await?;
//! client.establish_owner("Ann").await?;
//!
//! let league = client.create_league("Lunch").await?;
//! let game = client.create_game(league.id, &[league.owner_participant_id]).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod reconcile;
pub mod relay;
pub mod share;
pub mod topology;
pub mod tournament;
pub mod worker;

pub use client::LeagueClient;
pub use config::{ConfigError, DeviceConfig, HistoryConfig, StoresConfig, TrackerConfig};
pub use error::ClientError;
pub use events::{EventBus, RelevantTransactions, StoreChanged, SyncEvent, EVENT_CAPACITY};
pub use history::{BatchReport, HistoryProcessor};
pub use reconcile::{IdentityReconciler, ReconcileOutcome};
pub use relay::{
    InvitationMetadata, MockRelay, Relay, RelayError, ShareHandle, ShareMatch, StoreBinding,
};
pub use share::ShareBinder;
pub use topology::{store_path, StoreTopology};
pub use tournament::{RoundCompletion, TournamentService};
pub use worker::WorkerHandle;
