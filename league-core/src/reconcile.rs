//! Identity reconciliation planner.
//!
//! Given a snapshot of one league, its participants and every account the
//! device knows, compute the writes that make the account/participant graph
//! consistent again:
//!
//! - the owner account has a participant in the league
//! - every member participant names an account that exists locally
//! - every account lists the participants it controls and their leagues
//!
//! The planner never merges two participants of the same account. That case
//! is reported as [`IdentityError::DuplicateParticipants`] and left for an
//! explicit merge.

use league_types::{Account, AccountId, League, LeagueId, Participant, ParticipantId};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Data-integrity problems in the identity graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// There must be exactly one owner account.
    #[error("expected exactly one owner account, found {found}")]
    OwnerCount {
        /// Number of owner accounts found.
        found: usize,
    },

    /// One account has several participants in the same league.
    #[error("account {account} has {} participants in league {league}", .participants.len())]
    DuplicateParticipants {
        /// The league.
        league: LeagueId,
        /// The account.
        account: AccountId,
        /// The competing participants.
        participants: Vec<ParticipantId>,
    },

    /// An identity matches more than one account.
    #[error("identity matches {} accounts", .accounts.len())]
    AmbiguousAccount {
        /// The matching accounts.
        accounts: Vec<AccountId>,
    },
}

/// Everything the planner reads for one league.
#[derive(Debug, Clone, Copy)]
pub struct LeagueSnapshot<'a> {
    /// The league.
    pub league: &'a League,
    /// Participants stored for the league, members or not.
    pub participants: &'a [Participant],
    /// Every account in the owner-private store.
    pub accounts: &'a [Account],
}

/// Writes that repair one league.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Accounts to put, committed to the owner-private store first.
    pub accounts: Vec<Account>,
    /// Participants to put, committed to the league-shared store.
    pub participants: Vec<Participant>,
    /// The league, when its membership changed.
    pub league: Option<League>,
    /// How many of `accounts` are new.
    pub accounts_created: usize,
    /// How many of `participants` are new.
    pub participants_created: usize,
}

impl ReconcilePlan {
    /// Whether the plan writes nothing.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.participants.is_empty() && self.league.is_none()
    }
}

/// The single owner account among `accounts`.
pub fn owner_account(accounts: &[Account]) -> Result<&Account, IdentityError> {
    let mut owners = accounts.iter().filter(|a| a.is_owner());
    match (owners.next(), owners.count()) {
        (Some(owner), 0) => Ok(owner),
        (first, rest) => Err(IdentityError::OwnerCount {
            found: first.map_or(0, |_| 1) + rest,
        }),
    }
}

/// Check that no account has more than one participant in the league.
pub fn check_memberships(snapshot: LeagueSnapshot<'_>) -> Result<(), IdentityError> {
    let mut by_account: BTreeMap<AccountId, Vec<ParticipantId>> = BTreeMap::new();
    for participant in snapshot.participants {
        if !snapshot.league.has_member(participant.id) {
            continue;
        }
        if let Some(account) = account_of(participant, snapshot.accounts) {
            by_account.entry(account).or_default().push(participant.id);
        }
    }
    match by_account.into_iter().find(|(_, ids)| ids.len() > 1) {
        Some((account, participants)) => Err(IdentityError::DuplicateParticipants {
            league: snapshot.league.id,
            account,
            participants,
        }),
        None => Ok(()),
    }
}

/// Plan the repairs of one league after its membership changed.
pub fn plan_league(snapshot: LeagueSnapshot<'_>) -> Result<ReconcilePlan, IdentityError> {
    let owner = owner_account(snapshot.accounts)?.id;
    check_memberships(snapshot)?;

    let mut planner = Planner::new(snapshot);
    planner.seat(owner);
    planner.link_members();
    Ok(planner.finish())
}

/// Plan seating `accounts` in the league, then link every member.
///
/// Accounts not present in the snapshot are skipped.
pub fn plan_seating(
    snapshot: LeagueSnapshot<'_>,
    accounts: &[AccountId],
) -> Result<ReconcilePlan, IdentityError> {
    check_memberships(snapshot)?;

    let mut planner = Planner::new(snapshot);
    for account in accounts {
        planner.seat(*account);
    }
    planner.link_members();
    Ok(planner.finish())
}

fn account_of(participant: &Participant, accounts: &[Account]) -> Option<AccountId> {
    participant.account_id.or_else(|| {
        accounts
            .iter()
            .find(|a| a.claims(participant.id))
            .map(|a| a.id)
    })
}

struct Planner {
    league: League,
    league_changed: bool,
    participants: BTreeMap<ParticipantId, Participant>,
    accounts: BTreeMap<AccountId, Account>,
    dirty_participants: BTreeSet<ParticipantId>,
    dirty_accounts: BTreeSet<AccountId>,
    accounts_created: usize,
    participants_created: usize,
}

impl Planner {
    fn new(snapshot: LeagueSnapshot<'_>) -> Self {
        Self {
            league: snapshot.league.clone(),
            league_changed: false,
            participants: snapshot
                .participants
                .iter()
                .map(|p| (p.id, p.clone()))
                .collect(),
            accounts: snapshot.accounts.iter().map(|a| (a.id, a.clone())).collect(),
            dirty_participants: BTreeSet::new(),
            dirty_accounts: BTreeSet::new(),
            accounts_created: 0,
            participants_created: 0,
        }
    }

    fn claimant(&self, participant: ParticipantId) -> Option<AccountId> {
        self.accounts
            .values()
            .find(|a| a.claims(participant))
            .map(|a| a.id)
    }

    fn is_seated(&self, account: AccountId) -> bool {
        self.league.participant_ids.iter().any(|id| {
            let linked = self.participants.get(id).and_then(|p| p.account_id);
            linked.or_else(|| self.claimant(*id)) == Some(account)
        })
    }

    /// Give `account` a participant in the league unless it has one.
    fn seat(&mut self, account_id: AccountId) {
        if self.is_seated(account_id) {
            return;
        }
        let Some(account) = self.accounts.get_mut(&account_id) else {
            return;
        };

        let fresh = Participant::for_account(account, self.league.id);
        let participant = match self.participants.get(&fresh.id) {
            // Stored but dropped from the league: re-admit the same record.
            Some(existing) => Participant {
                account_id: Some(account_id),
                ..existing.clone()
            },
            None => {
                self.participants_created += 1;
                fresh
            }
        };

        if account.link(participant.id, self.league.id) {
            self.dirty_accounts.insert(account_id);
        }
        if self.league.add_member(participant.id) {
            self.league_changed = true;
        }
        self.dirty_participants.insert(participant.id);
        self.participants.insert(participant.id, participant);
    }

    /// Make every member point at an existing account that lists it.
    fn link_members(&mut self) {
        let members: Vec<ParticipantId> = self.league.participant_ids.iter().copied().collect();
        for id in members {
            // Membership can arrive before the participant record itself.
            let Some(participant) = self.participants.get(&id).cloned() else {
                continue;
            };

            let account_id = match participant.account_id {
                Some(account_id) => account_id,
                None => {
                    let account_id = self.claimant(id).unwrap_or_else(|| {
                        self.create_account(AccountId::for_participant(id), &participant)
                    });
                    let linked = Participant {
                        account_id: Some(account_id),
                        ..participant.clone()
                    };
                    self.participants.insert(id, linked);
                    self.dirty_participants.insert(id);
                    account_id
                }
            };

            if !self.accounts.contains_key(&account_id) {
                self.create_account(account_id, &participant);
            }
            if let Some(account) = self.accounts.get_mut(&account_id) {
                if account.link(id, participant.league_id) {
                    self.dirty_accounts.insert(account_id);
                }
            }
            // Another device linked the participant elsewhere and won.
            for (other_id, other) in self.accounts.iter_mut() {
                if *other_id != account_id && other.unlink(id) {
                    self.dirty_accounts.insert(*other_id);
                }
            }
        }
    }

    fn create_account(&mut self, id: AccountId, participant: &Participant) -> AccountId {
        self.accounts
            .insert(id, Account::linked(id, participant.display_name.clone()));
        self.dirty_accounts.insert(id);
        self.accounts_created += 1;
        id
    }

    fn finish(mut self) -> ReconcilePlan {
        ReconcilePlan {
            accounts: self
                .dirty_accounts
                .iter()
                .filter_map(|id| self.accounts.remove(id))
                .collect(),
            participants: self
                .dirty_participants
                .iter()
                .filter_map(|id| self.participants.remove(id))
                .collect(),
            league: self.league_changed.then_some(self.league),
            accounts_created: self.accounts_created,
            participants_created: self.participants_created,
        }
    }
}
