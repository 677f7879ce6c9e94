//! Visibility scopes of the three object stores.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Visibility tier of an object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Visible only to the owner's own devices.
    OwnerPrivate,
    /// Visible to every participant of a shared league.
    LeagueShared,
    /// Visible to everyone using the tracker.
    DiscoveryPublic,
}

impl Scope {
    /// Every scope, in provisioning order.
    pub const ALL: [Scope; 3] = [Scope::DiscoveryPublic, Scope::OwnerPrivate, Scope::LeagueShared];

    /// Folder name of the scope's store under the base directory.
    pub fn name(&self) -> &'static str {
        match self {
            Scope::OwnerPrivate => "private",
            Scope::LeagueShared => "shared",
            Scope::DiscoveryPublic => "public",
        }
    }

    /// Whether change history of this scope is replayed.
    pub fn tracks_history(&self) -> bool {
        !matches!(self, Scope::DiscoveryPublic)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
