//! Cloud relay abstraction.
//!
//! The relay owns the shares that make a league visible to other people,
//! knows who participates in them, and resolves the identity of the person
//! using this device. The engine only talks to it through [`Relay`], so the
//! real sharing service can be swapped for [`MockRelay`] in tests.

mod mock;

pub use mock::MockRelay;

use async_trait::async_trait;
use league_types::{ExternalIdentity, League, LeagueId, Role, Scope};
use thiserror::Error;

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The relay could not be reached.
    #[error("relay unavailable: {0}")]
    Unavailable(String),

    /// The share does not exist (anymore).
    #[error("share not found: {0}")]
    ShareNotFound(String),

    /// The relay refused the invitation.
    #[error("invitation rejected: {0}")]
    InvitationRejected(String),

    /// No relay account is signed in on this device.
    #[error("not authenticated")]
    NotAuthenticated,
}

/// A league share held by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareHandle {
    /// Relay identifier of the share.
    pub id: String,
    /// The league it shares.
    pub league_id: LeagueId,
    /// Title shown to invitees.
    pub title: String,
    /// Invitation link, when the relay issued one.
    pub url: Option<String>,
}

/// Which shares [`Relay::fetch_shares`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMatch {
    /// Shares of one league.
    League(LeagueId),
    /// Every share visible to this device.
    All,
}

impl ShareMatch {
    /// Whether `share` is selected.
    pub fn selects(&self, share: &ShareHandle) -> bool {
        match self {
            ShareMatch::League(league_id) => share.league_id == *league_id,
            ShareMatch::All => true,
        }
    }
}

/// What an invitation link carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationMetadata {
    /// The share being offered.
    pub share: ShareHandle,
    /// The person who created it.
    pub owner: ExternalIdentity,
}

/// Where an accepted share lands locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreBinding {
    /// Scope of the store that receives the league.
    pub scope: Scope,
    /// The league.
    pub league_id: LeagueId,
    /// The accepted share.
    pub share: ShareHandle,
}

/// Sharing service operations the engine relies on.
#[async_trait]
pub trait Relay: Send + Sync + 'static {
    /// Identity of the person signed in on this device.
    async fn resolve_own_identity(&self) -> Result<ExternalIdentity, RelayError>;

    /// Create a share for `league`.
    async fn create_share(&self, league: &League, title: &str) -> Result<ShareHandle, RelayError>;

    /// Existing shares visible to this device.
    async fn fetch_shares(&self, matching: ShareMatch) -> Result<Vec<ShareHandle>, RelayError>;

    /// Stop sharing.
    async fn delete_share(&self, share: &ShareHandle) -> Result<(), RelayError>;

    /// Everyone participating in `share`, with their role.
    async fn participants(
        &self,
        share: &ShareHandle,
    ) -> Result<Vec<(ExternalIdentity, Role)>, RelayError>;

    /// Accept an invitation and report where the league will appear.
    async fn accept_invitation(
        &self,
        metadata: &InvitationMetadata,
    ) -> Result<StoreBinding, RelayError>;
}
