//! Identity reconciler: applies the core planner to the stores.

use crate::error::{retry_on_conflict, ClientError};
use crate::topology::StoreTopology;
use league_core::{plan_league, IdentityError, LeagueSnapshot, ReconcilePlan, TournamentError};
use league_store::{fetch_record, fetch_records, Commit};
use league_types::{
    Account, AccountScope, Author, EntityKind, ExternalIdentity, Game, League, LeagueId,
    Participant, ParticipantId, Query, Scope,
};
use std::sync::Arc;
use tracing::{debug, info};

/// What one reconciliation wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Accounts created.
    pub accounts_created: usize,
    /// Participants created.
    pub participants_created: usize,
    /// Entities written, new or updated.
    pub writes: usize,
}

impl ReconcileOutcome {
    pub(crate) fn add(&mut self, other: ReconcileOutcome) {
        self.accounts_created += other.accounts_created;
        self.participants_created += other.participants_created;
        self.writes += other.writes;
    }
}

/// A league together with everything the planner reads for it.
#[derive(Debug, Clone)]
pub(crate) struct LeagueState {
    pub league: League,
    pub participants: Vec<Participant>,
    pub accounts: Vec<Account>,
}

impl LeagueState {
    pub fn snapshot(&self) -> LeagueSnapshot<'_> {
        LeagueSnapshot {
            league: &self.league,
            participants: &self.participants,
            accounts: &self.accounts,
        }
    }
}

/// Keeps accounts and participants consistent across stores.
#[derive(Debug)]
pub struct IdentityReconciler {
    topology: Arc<StoreTopology>,
    author: Author,
}

impl IdentityReconciler {
    /// Create a reconciler writing as `author`.
    pub fn new(topology: Arc<StoreTopology>, author: Author) -> Self {
        Self { topology, author }
    }

    /// The single owner account.
    ///
    /// # Errors
    ///
    /// [`IdentityError::OwnerCount`] unless exactly one exists.
    pub async fn owner(&self) -> Result<Account, ClientError> {
        let private = self.topology.store_for(Scope::OwnerPrivate);
        let mut owners: Vec<Account> = fetch_records(private.as_ref(), &Query::OwnerAccounts).await?;
        match owners.len() {
            1 => Ok(owners.remove(0)),
            found => Err(IdentityError::OwnerCount { found }.into()),
        }
    }

    /// Return the owner account, creating it from `identity` on first use.
    pub async fn establish_owner(
        &self,
        display_name: &str,
        identity: &ExternalIdentity,
    ) -> Result<Account, ClientError> {
        let private = self.topology.store_for(Scope::OwnerPrivate);
        let owners: Vec<Account> = fetch_records(private.as_ref(), &Query::OwnerAccounts).await?;
        match owners.as_slice() {
            [] => {}
            [owner] => return Ok(owner.clone()),
            many => return Err(IdentityError::OwnerCount { found: many.len() }.into()),
        }

        let fresh = Account::owner(display_name, identity);
        // Seen as someone else's participant before signing in here.
        let account = match fetch_record::<Account>(private.as_ref(), fresh.id).await? {
            Some(mut known) => {
                known.scope = AccountScope::Owner;
                known.display_name = fresh.display_name;
                known.absorb(identity);
                known
            }
            None => fresh,
        };
        let id = account.id;
        private.save(account.into(), &self.author).await?;
        info!("Established owner account {}", id);
        self.owner().await
    }

    /// Repair the identity graph of one league.
    ///
    /// # Errors
    ///
    /// [`ClientError::Identity`] when the league needs an explicit merge.
    pub async fn reconcile_league(&self, league_id: LeagueId) -> Result<ReconcileOutcome, ClientError> {
        retry_on_conflict("reconcile", || self.try_reconcile(league_id)).await
    }

    async fn try_reconcile(&self, league_id: LeagueId) -> Result<ReconcileOutcome, ClientError> {
        let Some(state) = self.load(league_id).await? else {
            debug!("League {} is gone, nothing to reconcile", league_id);
            return Ok(ReconcileOutcome::default());
        };
        let plan = plan_league(state.snapshot())?;
        self.apply_plan(plan).await
    }

    /// Read a league, its participants and every account.
    pub(crate) async fn load(&self, league_id: LeagueId) -> Result<Option<LeagueState>, ClientError> {
        let shared = self.topology.store_for(Scope::LeagueShared);
        let private = self.topology.store_for(Scope::OwnerPrivate);

        let Some(league) = fetch_record::<League>(shared.as_ref(), league_id).await? else {
            return Ok(None);
        };
        let participants =
            fetch_records(shared.as_ref(), &Query::ParticipantsInLeague(league_id)).await?;
        let accounts = fetch_records(private.as_ref(), &Query::All(EntityKind::Account)).await?;
        Ok(Some(LeagueState {
            league,
            participants,
            accounts,
        }))
    }

    /// Commit a plan: private accounts first, then shared participants and
    /// the league.
    pub(crate) async fn apply_plan(&self, plan: ReconcilePlan) -> Result<ReconcileOutcome, ClientError> {
        if plan.is_empty() {
            return Ok(ReconcileOutcome::default());
        }
        let outcome = ReconcileOutcome {
            accounts_created: plan.accounts_created,
            participants_created: plan.participants_created,
            writes: plan.accounts.len() + plan.participants.len() + usize::from(plan.league.is_some()),
        };

        if !plan.accounts.is_empty() {
            let private = self.topology.store_for(Scope::OwnerPrivate);
            private
                .commit(Commit::new(self.author.clone()).put_all(plan.accounts))
                .await?;
        }
        let shared_writes = Commit::new(self.author.clone())
            .put_all(plan.participants)
            .put_all(plan.league);
        if !shared_writes.is_empty() {
            let shared = self.topology.store_for(Scope::LeagueShared);
            shared.commit(shared_writes).await?;
        }

        info!(
            "Reconciled identities: {} accounts and {} participants created, {} writes",
            outcome.accounts_created, outcome.participants_created, outcome.writes
        );
        Ok(outcome)
    }

    /// Fold `discard` into `keep` after a duplicate-participant conflict.
    ///
    /// # Errors
    ///
    /// Refused with [`TournamentError::HasMoves`] when `discard` already
    /// played, since its moves would be orphaned.
    pub async fn merge_participants(
        &self,
        league_id: LeagueId,
        keep: ParticipantId,
        discard: ParticipantId,
    ) -> Result<(), ClientError> {
        if keep == discard {
            return Ok(());
        }
        retry_on_conflict("merge", || self.try_merge(league_id, keep, discard)).await
    }

    async fn try_merge(
        &self,
        league_id: LeagueId,
        keep: ParticipantId,
        discard: ParticipantId,
    ) -> Result<(), ClientError> {
        let shared = self.topology.store_for(Scope::LeagueShared);
        let private = self.topology.store_for(Scope::OwnerPrivate);

        let mut league = fetch_record::<League>(shared.as_ref(), league_id)
            .await?
            .ok_or(ClientError::NotFound(league_id.into()))?;
        for participant in [keep, discard] {
            if !league.has_member(participant) {
                return Err(TournamentError::NotInLeague(participant).into());
            }
        }
        if shared.count(&Query::MovesOfParticipant(discard)).await? > 0 {
            return Err(TournamentError::HasMoves(discard).into());
        }

        league.participant_ids.remove(&discard);
        if league.owner_participant_id == discard {
            league.owner_participant_id = keep;
        }
        let games: Vec<Game> = fetch_records(shared.as_ref(), &Query::GamesInLeague(league_id)).await?;
        let games: Vec<Game> = games
            .into_iter()
            .filter_map(|mut game| game.participant_ids.remove(&discard).then_some(game))
            .collect();

        let accounts: Vec<Account> =
            fetch_records(private.as_ref(), &Query::AccountsClaiming(discard)).await?;
        let accounts: Vec<Account> = accounts
            .into_iter()
            .map(|mut account| {
                account.unlink(discard);
                account
            })
            .collect();
        if !accounts.is_empty() {
            private
                .commit(Commit::new(self.author.clone()).put_all(accounts))
                .await?;
        }

        shared
            .commit(
                Commit::new(self.author.clone())
                    .put(league)
                    .put_all(games)
                    .delete(discard),
            )
            .await?;
        info!(
            "Merged participant {} into {} in league {}",
            discard, keep, league_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use league_types::{Move, RoundId, Shape};

    // ===========================================
    // Helpers
    // ===========================================

    fn ann() -> ExternalIdentity {
        ExternalIdentity::with_record("_ann", "Ann")
    }

    fn reconciler() -> (Arc<StoreTopology>, IdentityReconciler) {
        let topology = Arc::new(StoreTopology::in_memory());
        let reconciler = IdentityReconciler::new(topology.clone(), Author::new("app"));
        (topology, reconciler)
    }

    /// A league created on Bob's device, imported as it arrives here.
    async fn import_foreign_league(topology: &StoreTopology) -> (League, Participant) {
        let bob = Account::owner("Bob", &ExternalIdentity::with_record("_bob", "Bob"));
        let creator = Participant::for_account(&bob, LeagueId::new());
        let league = League::new("Lunch", &creator, 0);
        let shared = topology.store_for(Scope::LeagueShared);
        shared
            .import(
                &Author::new("cloud"),
                vec![
                    league_store::Write::Put(creator.clone().into()),
                    league_store::Write::Put(league.clone().into()),
                ],
            )
            .await
            .unwrap();
        (league, creator)
    }

    // ===========================================
    // Owner Tests
    // ===========================================

    #[tokio::test]
    async fn establish_owner_is_idempotent() {
        let (_, reconciler) = reconciler();
        let first = reconciler.establish_owner("Ann", &ann()).await.unwrap();
        let second = reconciler.establish_owner("Someone", &ann()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.version, 1);
        assert_eq!(first.record_id.as_deref(), Some("_ann"));
    }

    #[tokio::test]
    async fn owner_requires_exactly_one() {
        let (topology, reconciler) = reconciler();
        assert!(matches!(
            reconciler.owner().await,
            Err(ClientError::Identity(IdentityError::OwnerCount { found: 0 }))
        ));

        let private = topology.store_for(Scope::OwnerPrivate);
        let author = Author::new("app");
        for name in ["Ann", "Ann again"] {
            let account = Account::owner(name, &ExternalIdentity::default());
            private.save(account.into(), &author).await.unwrap();
        }
        assert!(matches!(
            reconciler.establish_owner("Ann", &ann()).await,
            Err(ClientError::Identity(IdentityError::OwnerCount { found: 2 }))
        ));
    }

    #[tokio::test]
    async fn establish_owner_promotes_linked_account() {
        let (topology, reconciler) = reconciler();
        let private = topology.store_for(Scope::OwnerPrivate);
        let seen = Account::linked(league_types::AccountId::for_record("_ann"), "Ann?");
        private.save(seen.clone().into(), &Author::new("app")).await.unwrap();

        let owner = reconciler.establish_owner("Ann", &ann()).await.unwrap();
        assert_eq!(owner.id, seen.id);
        assert!(owner.is_owner());
        assert_eq!(owner.display_name, "Ann");
    }

    // ===========================================
    // Reconciliation Tests
    // ===========================================

    #[tokio::test]
    async fn invitee_is_seated_in_imported_league() {
        let (topology, reconciler) = reconciler();
        let owner = reconciler.establish_owner("Ann", &ann()).await.unwrap();
        let (league, creator) = import_foreign_league(&topology).await;

        let outcome = reconciler.reconcile_league(league.id).await.unwrap();
        assert_eq!(outcome.participants_created, 1);
        assert_eq!(outcome.accounts_created, 1);

        let shared = topology.store_for(Scope::LeagueShared);
        let stored: League = fetch_record(shared.as_ref(), league.id).await.unwrap().unwrap();
        let seat = ParticipantId::for_membership(owner.id, league.id);
        assert!(stored.has_member(seat));
        assert!(stored.has_member(creator.id));

        let private = topology.store_for(Scope::OwnerPrivate);
        let owner = reconciler.owner().await.unwrap();
        assert!(owner.claims(seat));
        let creator_account: Account = fetch_record(private.as_ref(), creator.account_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(creator_account.claims(creator.id));

        // Second pass has nothing left to do.
        let again = reconciler.reconcile_league(league.id).await.unwrap();
        assert_eq!(again, ReconcileOutcome::default());
    }

    #[tokio::test]
    async fn missing_league_is_ignored() {
        let (_, reconciler) = reconciler();
        reconciler.establish_owner("Ann", &ann()).await.unwrap();
        let outcome = reconciler.reconcile_league(LeagueId::new()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::default());
    }

    #[tokio::test]
    async fn reconcile_without_owner_fails() {
        let (topology, reconciler) = reconciler();
        let (league, _) = import_foreign_league(&topology).await;
        assert!(matches!(
            reconciler.reconcile_league(league.id).await,
            Err(ClientError::Identity(IdentityError::OwnerCount { found: 0 }))
        ));
    }

    // ===========================================
    // Merge Tests
    // ===========================================

    /// The owner seated twice: once by this device, once imported.
    async fn duplicate_seats(
        topology: &StoreTopology,
        reconciler: &IdentityReconciler,
    ) -> (League, ParticipantId, ParticipantId) {
        let owner = reconciler.establish_owner("Ann", &ann()).await.unwrap();
        let (league, _) = import_foreign_league(topology).await;
        reconciler.reconcile_league(league.id).await.unwrap();
        let seat = ParticipantId::for_membership(owner.id, league.id);

        let shared = topology.store_for(Scope::LeagueShared);
        let mut stored: League = fetch_record(shared.as_ref(), league.id).await.unwrap().unwrap();
        let mut twin = Participant::unlinked("Ann (other phone)", league.id);
        twin.account_id = Some(owner.id);
        stored.add_member(twin.id);
        shared
            .import(
                &Author::new("cloud"),
                vec![
                    league_store::Write::Put(twin.clone().into()),
                    league_store::Write::Put(stored.clone().into()),
                ],
            )
            .await
            .unwrap();
        (stored, seat, twin.id)
    }

    #[tokio::test]
    async fn duplicate_seat_is_reported_then_merged() {
        let (topology, reconciler) = reconciler();
        let (league, keep, discard) = duplicate_seats(&topology, &reconciler).await;

        let result = reconciler.reconcile_league(league.id).await;
        assert!(matches!(
            result,
            Err(ClientError::Identity(IdentityError::DuplicateParticipants { .. }))
        ));

        reconciler
            .merge_participants(league.id, keep, discard)
            .await
            .unwrap();
        let shared = topology.store_for(Scope::LeagueShared);
        let merged: League = fetch_record(shared.as_ref(), league.id).await.unwrap().unwrap();
        assert!(merged.has_member(keep));
        assert!(!merged.has_member(discard));
        let gone: Option<Participant> = fetch_record(shared.as_ref(), discard).await.unwrap();
        assert!(gone.is_none());

        reconciler.reconcile_league(league.id).await.unwrap();
    }

    #[tokio::test]
    async fn merge_refuses_participant_with_moves() {
        let (topology, reconciler) = reconciler();
        let (league, keep, discard) = duplicate_seats(&topology, &reconciler).await;

        let shared = topology.store_for(Scope::LeagueShared);
        let played = Move::new(RoundId::new(), discard, Shape::Rock);
        shared.save(played.into(), &Author::new("app")).await.unwrap();

        let result = reconciler.merge_participants(league.id, keep, discard).await;
        assert!(matches!(
            result,
            Err(ClientError::Tournament(TournamentError::HasMoves(p))) if p == discard
        ));
    }
}
