//! Share/participant binder.
//!
//! Maps relay shares to leagues, and people the relay reports as share
//! participants to local accounts and league participants.

use crate::error::{retry_on_conflict, ClientError};
use crate::reconcile::{IdentityReconciler, ReconcileOutcome};
use crate::relay::{InvitationMetadata, Relay, ShareHandle, ShareMatch, StoreBinding};
use crate::topology::StoreTopology;
use dashmap::DashMap;
use league_core::{plan_seating, IdentityError};
use league_store::{fetch_record, fetch_records, ObjectStore};
use league_types::{
    Account, AccountId, Author, ExternalIdentity, League, LeagueId, Query, Role, Scope,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Binds relay shares and their participants to the local object graph.
pub struct ShareBinder<R: Relay> {
    relay: Arc<R>,
    topology: Arc<StoreTopology>,
    reconciler: Arc<IdentityReconciler>,
    author: Author,
    shares: DashMap<LeagueId, ShareHandle>,
}

impl<R: Relay> ShareBinder<R> {
    /// Create a binder writing as `author`.
    pub fn new(
        relay: Arc<R>,
        topology: Arc<StoreTopology>,
        reconciler: Arc<IdentityReconciler>,
        author: Author,
    ) -> Self {
        Self {
            relay,
            topology,
            reconciler,
            author,
            shares: DashMap::new(),
        }
    }

    /// The share of `league`, created on first use.
    pub async fn share_for(&self, league: &League) -> Result<ShareHandle, ClientError> {
        if let Some(share) = self.lookup(league.id).await? {
            return Ok(share);
        }
        let share = self.relay.create_share(league, &league.name).await?;
        info!("Created share {} for league {}", share.id, league.id);
        self.shares.insert(league.id, share.clone());
        Ok(share)
    }

    /// The known share of `league`, asking the relay on a cache miss.
    pub async fn lookup(&self, league_id: LeagueId) -> Result<Option<ShareHandle>, ClientError> {
        let cached = self.shares.get(&league_id).map(|entry| entry.value().clone());
        if cached.is_some() {
            return Ok(cached);
        }
        let found = self
            .relay
            .fetch_shares(ShareMatch::League(league_id))
            .await?
            .into_iter()
            .next();
        if let Some(share) = &found {
            self.shares.insert(league_id, share.clone());
        }
        Ok(found)
    }

    /// Everyone participating in `share`.
    pub async fn resolve_participants(
        &self,
        share: &ShareHandle,
    ) -> Result<Vec<(ExternalIdentity, Role)>, ClientError> {
        Ok(self.relay.participants(share).await?)
    }

    /// The local account of `identity`, created when none matches.
    ///
    /// # Errors
    ///
    /// [`IdentityError::AmbiguousAccount`] when several accounts match.
    pub async fn bind_account(&self, identity: &ExternalIdentity) -> Result<Account, ClientError> {
        retry_on_conflict("bind account", || self.try_bind_account(identity)).await
    }

    async fn try_bind_account(&self, identity: &ExternalIdentity) -> Result<Account, ClientError> {
        let private = self.topology.store_for(Scope::OwnerPrivate);
        let mut matches: Vec<Account> = if identity.is_anonymous() {
            Vec::new()
        } else {
            fetch_records(private.as_ref(), &Query::AccountsMatching(identity.clone())).await?
        };

        let account = match matches.len() {
            0 => {
                let fresh = Account::from_identity(identity);
                // Linked accounts are created before their identifiers are known.
                match fetch_record::<Account>(private.as_ref(), fresh.id).await? {
                    Some(mut known) => {
                        known.absorb(identity);
                        known
                    }
                    None => {
                        debug!("Creating account {} for share participant", fresh.id);
                        fresh
                    }
                }
            }
            1 => {
                let mut known = matches.remove(0);
                if !known.absorb(identity) {
                    return Ok(known);
                }
                known
            }
            _ => {
                return Err(IdentityError::AmbiguousAccount {
                    accounts: matches.iter().map(|a| a.id).collect(),
                }
                .into())
            }
        };

        let id = account.id;
        private.save(account.into(), &self.author).await?;
        reload(private.as_ref(), id).await
    }

    /// Seat every invited share participant of `league_id` in the league.
    ///
    /// Does nothing when the league has no share. Returns how many
    /// participants were created.
    pub async fn bind_share_participants(&self, league_id: LeagueId) -> Result<usize, ClientError> {
        let Some(share) = self.lookup(league_id).await? else {
            return Ok(0);
        };

        let mut seats: Vec<AccountId> = Vec::new();
        for (identity, role) in self.resolve_participants(&share).await? {
            if role == Role::Owner || identity.is_anonymous() {
                continue;
            }
            let account = self.bind_account(&identity).await?;
            if !seats.contains(&account.id) {
                seats.push(account.id);
            }
        }
        if seats.is_empty() {
            return Ok(0);
        }

        let outcome =
            retry_on_conflict("seat share participants", || self.try_seat(league_id, &seats))
                .await?;
        if outcome.participants_created > 0 {
            info!(
                "Seated {} share participants in league {}",
                outcome.participants_created, league_id
            );
        }
        Ok(outcome.participants_created)
    }

    async fn try_seat(
        &self,
        league_id: LeagueId,
        seats: &[AccountId],
    ) -> Result<ReconcileOutcome, ClientError> {
        let Some(state) = self.reconciler.load(league_id).await? else {
            return Ok(ReconcileOutcome::default());
        };
        let plan = plan_seating(state.snapshot(), seats)?;
        self.reconciler.apply_plan(plan).await
    }

    /// Accept an invitation to someone else's league.
    pub async fn accept_invitation(
        &self,
        metadata: &InvitationMetadata,
    ) -> Result<StoreBinding, ClientError> {
        let binding = self.relay.accept_invitation(metadata).await?;
        self.shares.insert(binding.league_id, binding.share.clone());
        info!(
            "Accepted share {} for league {}",
            binding.share.id, binding.league_id
        );
        Ok(binding)
    }

    /// Stop sharing `league_id`. Returns whether a share existed.
    pub async fn delete_share(&self, league_id: LeagueId) -> Result<bool, ClientError> {
        let Some(share) = self.lookup(league_id).await? else {
            return Ok(false);
        };
        self.relay.delete_share(&share).await?;
        self.shares.remove(&league_id);
        info!("Deleted share {} of league {}", share.id, league_id);
        Ok(true)
    }
}

async fn reload(store: &dyn ObjectStore, id: AccountId) -> Result<Account, ClientError> {
    fetch_record(store, id)
        .await?
        .ok_or(ClientError::NotFound(id.into()))
}
