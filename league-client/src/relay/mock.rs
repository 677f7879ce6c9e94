//! Mock relay for testing.
//!
//! Keeps shares and their participants in memory and allows forcing
//! failures.

use super::{InvitationMetadata, Relay, RelayError, ShareHandle, ShareMatch, StoreBinding};
use async_trait::async_trait;
use league_types::{ExternalIdentity, League, Role, Scope};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock relay for testing.
///
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct MockRelay {
    inner: Arc<Mutex<MockRelayInner>>,
}

#[derive(Debug, Default)]
struct MockRelayInner {
    identity: Option<ExternalIdentity>,
    shares: Vec<ShareHandle>,
    participants: HashMap<String, Vec<(ExternalIdentity, Role)>>,
    accepted: Vec<String>,
    shares_created: usize,
    fail_next_identity: Option<String>,
    fail_next_create: Option<String>,
    fail_next_fetch: Option<String>,
    fail_next_participants: Option<String>,
}

impl MockRelay {
    /// A relay with nobody signed in.
    pub fn new() -> Self {
        Self::default()
    }

    /// A relay with `identity` signed in.
    pub fn signed_in(identity: ExternalIdentity) -> Self {
        let relay = Self::new();
        relay.lock().identity = Some(identity);
        relay
    }

    fn lock(&self) -> MutexGuard<'_, MockRelayInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a share known to the relay, as if created on another device.
    pub fn insert_share(&self, share: ShareHandle) {
        let mut inner = self.lock();
        if !inner.shares.iter().any(|s| s.id == share.id) {
            inner.shares.push(share);
        }
    }

    /// Add someone to a share, as if they accepted an invitation.
    pub fn add_participant(&self, share_id: &str, identity: ExternalIdentity, role: Role) {
        self.lock()
            .participants
            .entry(share_id.to_string())
            .or_default()
            .push((identity, role));
    }

    /// Every share the relay holds.
    pub fn shares(&self) -> Vec<ShareHandle> {
        self.lock().shares.clone()
    }

    /// Number of `create_share()` calls that succeeded.
    pub fn shares_created(&self) -> usize {
        self.lock().shares_created
    }

    /// Ids of the shares whose invitations were accepted.
    pub fn accepted_invitations(&self) -> Vec<String> {
        self.lock().accepted.clone()
    }

    /// Cause the next resolve_own_identity() to fail with the given error.
    pub fn fail_next_identity(&self, error: &str) {
        self.lock().fail_next_identity = Some(error.to_string());
    }

    /// Cause the next create_share() to fail with the given error.
    pub fn fail_next_create(&self, error: &str) {
        self.lock().fail_next_create = Some(error.to_string());
    }

    /// Cause the next fetch_shares() to fail with the given error.
    pub fn fail_next_fetch(&self, error: &str) {
        self.lock().fail_next_fetch = Some(error.to_string());
    }

    /// Cause the next participants() to fail with the given error.
    pub fn fail_next_participants(&self, error: &str) {
        self.lock().fail_next_participants = Some(error.to_string());
    }
}

#[async_trait]
impl Relay for MockRelay {
    async fn resolve_own_identity(&self) -> Result<ExternalIdentity, RelayError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_identity.take() {
            return Err(RelayError::Unavailable(error));
        }
        inner.identity.clone().ok_or(RelayError::NotAuthenticated)
    }

    async fn create_share(&self, league: &League, title: &str) -> Result<ShareHandle, RelayError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_create.take() {
            return Err(RelayError::Unavailable(error));
        }
        let owner = inner.identity.clone().ok_or(RelayError::NotAuthenticated)?;

        let id = format!("share-{}", league.id.as_uuid());
        let share = ShareHandle {
            url: Some(format!("https://relay.invalid/{}", id)),
            id: id.clone(),
            league_id: league.id,
            title: title.to_string(),
        };
        inner.shares.push(share.clone());
        inner
            .participants
            .entry(id)
            .or_default()
            .push((owner, Role::Owner));
        inner.shares_created += 1;
        Ok(share)
    }

    async fn fetch_shares(&self, matching: ShareMatch) -> Result<Vec<ShareHandle>, RelayError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_fetch.take() {
            return Err(RelayError::Unavailable(error));
        }
        Ok(inner
            .shares
            .iter()
            .filter(|share| matching.selects(share))
            .cloned()
            .collect())
    }

    async fn delete_share(&self, share: &ShareHandle) -> Result<(), RelayError> {
        let mut inner = self.lock();
        let before = inner.shares.len();
        inner.shares.retain(|s| s.id != share.id);
        if inner.shares.len() == before {
            return Err(RelayError::ShareNotFound(share.id.clone()));
        }
        inner.participants.remove(&share.id);
        Ok(())
    }

    async fn participants(
        &self,
        share: &ShareHandle,
    ) -> Result<Vec<(ExternalIdentity, Role)>, RelayError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_participants.take() {
            return Err(RelayError::Unavailable(error));
        }
        if !inner.shares.iter().any(|s| s.id == share.id) {
            return Err(RelayError::ShareNotFound(share.id.clone()));
        }
        Ok(inner
            .participants
            .get(&share.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn accept_invitation(
        &self,
        metadata: &InvitationMetadata,
    ) -> Result<StoreBinding, RelayError> {
        let mut inner = self.lock();
        let me = inner.identity.clone().ok_or(RelayError::NotAuthenticated)?;
        if me == metadata.owner {
            return Err(RelayError::InvitationRejected(
                "cannot accept your own share".to_string(),
            ));
        }

        let share = metadata.share.clone();
        if !inner.shares.iter().any(|s| s.id == share.id) {
            inner.shares.push(share.clone());
        }
        let members = inner.participants.entry(share.id.clone()).or_default();
        if members.is_empty() {
            members.push((metadata.owner.clone(), Role::Owner));
        }
        if !members.iter().any(|(identity, _)| *identity == me) {
            members.push((me, Role::Member));
        }
        inner.accepted.push(share.id.clone());

        Ok(StoreBinding {
            scope: Scope::LeagueShared,
            league_id: share.league_id,
            share,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use league_types::{Account, LeagueId, Participant};

    fn ann() -> ExternalIdentity {
        ExternalIdentity::with_record("_ann", "Ann")
    }

    fn league() -> League {
        let owner = Account::owner("Ann", &ann());
        let participant = Participant::for_account(&owner, LeagueId::new());
        League::new("Lunch", &participant, 0)
    }

    #[tokio::test]
    async fn identity_requires_sign_in() {
        let relay = MockRelay::new();
        assert!(matches!(
            relay.resolve_own_identity().await,
            Err(RelayError::NotAuthenticated)
        ));

        let relay = MockRelay::signed_in(ann());
        assert_eq!(relay.resolve_own_identity().await.unwrap(), ann());
    }

    #[tokio::test]
    async fn created_share_lists_its_owner() {
        let relay = MockRelay::signed_in(ann());
        let league = league();
        let share = relay.create_share(&league, "Lunch").await.unwrap();

        assert_eq!(share.league_id, league.id);
        assert!(share.url.is_some());
        assert_eq!(relay.shares_created(), 1);

        let participants = relay.participants(&share).await.unwrap();
        assert_eq!(participants, vec![(ann(), Role::Owner)]);

        let found = relay
            .fetch_shares(ShareMatch::League(league.id))
            .await
            .unwrap();
        assert_eq!(found, vec![share.clone()]);
        let other = relay
            .fetch_shares(ShareMatch::League(LeagueId::new()))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn accept_invitation_adds_member() {
        let owner_relay = MockRelay::signed_in(ann());
        let share = owner_relay.create_share(&league(), "Lunch").await.unwrap();

        let bob = ExternalIdentity::with_record("_bob", "Bob");
        let relay = MockRelay::signed_in(bob.clone());
        let binding = relay
            .accept_invitation(&InvitationMetadata {
                share: share.clone(),
                owner: ann(),
            })
            .await
            .unwrap();

        assert_eq!(binding.scope, Scope::LeagueShared);
        assert_eq!(binding.league_id, share.league_id);
        assert_eq!(relay.accepted_invitations(), vec![share.id.clone()]);
        let participants = relay.participants(&share).await.unwrap();
        assert_eq!(participants, vec![(ann(), Role::Owner), (bob, Role::Member)]);
    }

    #[tokio::test]
    async fn own_invitation_is_rejected() {
        let relay = MockRelay::signed_in(ann());
        let share = relay.create_share(&league(), "Lunch").await.unwrap();
        let result = relay
            .accept_invitation(&InvitationMetadata { share, owner: ann() })
            .await;
        assert!(matches!(result, Err(RelayError::InvitationRejected(_))));
    }

    #[tokio::test]
    async fn delete_share_forgets_participants() {
        let relay = MockRelay::signed_in(ann());
        let share = relay.create_share(&league(), "Lunch").await.unwrap();
        relay.delete_share(&share).await.unwrap();

        assert!(relay.shares().is_empty());
        assert!(matches!(
            relay.participants(&share).await,
            Err(RelayError::ShareNotFound(_))
        ));
        assert!(matches!(
            relay.delete_share(&share).await,
            Err(RelayError::ShareNotFound(_))
        ));
    }

    #[tokio::test]
    async fn fail_next_fires_once() {
        let relay = MockRelay::signed_in(ann());
        relay.fail_next_fetch("offline");
        assert!(matches!(
            relay.fetch_shares(ShareMatch::All).await,
            Err(RelayError::Unavailable(_))
        ));
        assert!(relay.fetch_shares(ShareMatch::All).await.is_ok());
    }
}
