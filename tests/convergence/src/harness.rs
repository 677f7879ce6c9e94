//! Simulated devices and the cloud mirror between them.

use league_client::{
    ClientError, InvitationMetadata, LeagueClient, MockRelay, Relay, TrackerConfig,
};
use league_store::{ObjectStore, StoreError, Write};
use league_types::{
    Author, DeviceId, EntityKind, EntityRef, ExternalIdentity, HistoryToken, League, LeagueId,
    ParticipantId, Query, Role, Scope, StoreId,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, Once, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Author tag of everything the mirror imports.
pub const IMPORT_AUTHOR: &str = "cloud-import";

/// Harness errors.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Client error.
    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

/// Install a test subscriber once per process. Honors `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One phone running the league tracker.
pub struct Device {
    /// Name used in logs and assertions.
    pub name: String,
    /// The person signed in.
    pub identity: ExternalIdentity,
    /// The device's relay handle.
    pub relay: MockRelay,
    /// The engine.
    pub client: LeagueClient<MockRelay>,
}

impl Device {
    /// Start a device for the person with relay record `record_id` and
    /// establish their owner account.
    pub async fn start(name: &str, record_id: &str) -> Result<Self, HarnessError> {
        init_tracing();
        let identity = ExternalIdentity::with_record(record_id, name);
        let relay = MockRelay::signed_in(identity.clone());
        let author = Author::for_device(&DeviceId::random());
        let config = TrackerConfig::in_memory().with_author(author.as_str());
        let client = LeagueClient::open(config, relay.clone()).await?;
        client.establish_owner(name).await?;
        Ok(Self {
            name: name.to_string(),
            identity,
            relay,
            client,
        })
    }

    /// The store of `scope`.
    pub fn store(&self, scope: Scope) -> Arc<dyn ObjectStore> {
        self.client.topology().store_for(scope)
    }

    /// Share `league_id` and hand out an invitation.
    pub async fn invite(&self, league_id: LeagueId) -> Result<InvitationMetadata, HarnessError> {
        let share = self.client.share_league(league_id).await?;
        let owner = self
            .relay
            .resolve_own_identity()
            .await
            .map_err(ClientError::from)?;
        Ok(InvitationMetadata { share, owner })
    }

    /// Accept `invitation`; the inviter's relay learns about the new member.
    pub async fn join(
        &self,
        inviter: &Device,
        invitation: &InvitationMetadata,
    ) -> Result<(), HarnessError> {
        self.client.accept_invitation(invitation).await?;
        inviter
            .relay
            .add_participant(&invitation.share.id, self.identity.clone(), Role::Member);
        self.client.flush().await?;
        Ok(())
    }
}

/// The entity a write touches.
pub fn written(write: &Write) -> EntityRef {
    match write {
        Write::Put(entity) => entity.entity_ref(),
        Write::Delete(entity_ref) => *entity_ref,
    }
}

/// Writes collected from one device for another.
#[derive(Debug)]
pub struct Delivery {
    key: (StoreId, StoreId),
    through: Option<HistoryToken>,
    writes: Vec<Write>,
}

impl Delivery {
    /// Number of writes carried.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing changed since the last delivery.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Take the writes of the entities matching `held` out of this delivery.
    ///
    /// The cloud ships the records of one transaction independently, so a
    /// device can see some of them well before the rest. Deliver the
    /// returned part later to replay that.
    pub fn hold_back(&mut self, held: impl Fn(&EntityRef) -> bool) -> Delivery {
        let (late, now): (Vec<Write>, Vec<Write>) = std::mem::take(&mut self.writes)
            .into_iter()
            .partition(|write| held(&written(write)));
        self.writes = now;
        Delivery {
            key: self.key,
            through: self.through,
            writes: late,
        }
    }

    /// Hold back every write of one of `kinds`.
    pub fn hold_back_kinds(&mut self, kinds: &[EntityKind]) -> Delivery {
        self.hold_back(|entity| kinds.contains(&entity.kind))
    }
}

/// Copies shared-store changes between devices.
///
/// Keeps one history cursor per (source, target) pair, so every change is
/// delivered once. Entities are delivered as they currently are on the
/// source, which is what a cloud mirror converges to.
#[derive(Debug, Default)]
pub struct CloudMirror {
    cursors: Mutex<HashMap<(StoreId, StoreId), HistoryToken>>,
}

impl CloudMirror {
    /// Create a mirror that has delivered nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `from`'s new shared changes to `to` and wait until `to`
    /// processed them. Returns the number of writes imported.
    pub async fn sync(&self, from: &Device, to: &Device) -> Result<usize, HarnessError> {
        let delivery = self.collect(from, to).await?;
        self.deliver(delivery, to).await
    }

    /// Snapshot what `from` has for `to` without delivering it yet.
    ///
    /// Collecting from both sides before delivering either simulates two
    /// devices acting on the same data at the same time.
    pub async fn collect(&self, from: &Device, to: &Device) -> Result<Delivery, HarnessError> {
        let source = from.store(Scope::LeagueShared);
        let target_id = to.store(Scope::LeagueShared).id();
        let key = (source.id(), target_id);

        let transactions = source.fetch_history(self.cursor(key), None).await?;
        let touched: BTreeSet<EntityRef> = transactions
            .iter()
            .flat_map(|tx| &tx.changes)
            .map(|change| change.entity)
            .collect();
        let mut writes = Vec::with_capacity(touched.len());
        for entity_ref in touched {
            let current = source.fetch(&Query::ById(entity_ref)).await?.into_iter().next();
            writes.push(match current {
                Some(entity) => Write::Put(entity),
                None => Write::Delete(entity_ref),
            });
        }

        debug!(
            "Collected {} writes from {} for {}",
            writes.len(),
            from.name,
            to.name
        );
        Ok(Delivery {
            key,
            through: transactions.last().map(|tx| tx.token),
            writes,
        })
    }

    /// Import a collected delivery into `to` and wait until it was processed.
    pub async fn deliver(&self, delivery: Delivery, to: &Device) -> Result<usize, HarnessError> {
        let Some(through) = delivery.through else {
            return Ok(0);
        };
        let target = to.store(Scope::LeagueShared);
        let count = delivery.writes.len();
        target
            .import(&Author::new(IMPORT_AUTHOR), delivery.writes)
            .await?;
        self.set_cursor(delivery.key, through);

        to.client.on_remote_change(target.id())?;
        to.client.flush().await?;
        Ok(count)
    }

    /// Sync `a` to `b`, then `b` to `a`.
    pub async fn exchange(&self, a: &Device, b: &Device) -> Result<(), HarnessError> {
        self.sync(a, b).await?;
        self.sync(b, a).await?;
        Ok(())
    }

    fn cursor(&self, key: (StoreId, StoreId)) -> Option<HistoryToken> {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
    }

    fn set_cursor(&self, key: (StoreId, StoreId), token: HistoryToken) {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, token);
    }
}

/// Two devices sharing one league, already converged.
pub struct Pair {
    /// The league owner.
    pub ann: Device,
    /// The invitee.
    pub bob: Device,
    /// The cloud between them.
    pub mirror: CloudMirror,
    /// The shared league as Ann sees it.
    pub league: League,
}

impl Pair {
    /// Ann creates a league, invites Bob and both devices sync.
    pub async fn joined() -> Result<Self, HarnessError> {
        let ann = Device::start("Ann", "_ann").await?;
        let bob = Device::start("Bob", "_bob").await?;
        let mirror = CloudMirror::new();

        let league = ann.client.create_league("Lunch").await?;
        let invitation = ann.invite(league.id).await?;
        bob.join(&ann, &invitation).await?;

        mirror.sync(&ann, &bob).await?;
        mirror.sync(&bob, &ann).await?;
        mirror.sync(&ann, &bob).await?;

        let league = ann.client.league(league.id).await?;
        Ok(Self {
            ann,
            bob,
            mirror,
            league,
        })
    }

    /// Ann's seat.
    pub fn ann_seat(&self) -> ParticipantId {
        self.league.owner_participant_id
    }

    /// Bob's seat.
    pub fn bob_seat(&self) -> Option<ParticipantId> {
        self.league
            .participant_ids
            .iter()
            .copied()
            .find(|id| *id != self.league.owner_participant_id)
    }
}
