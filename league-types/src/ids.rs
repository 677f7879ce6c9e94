//! Identity and ordering types for the league tracker.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace for every id derived from a natural key (UUID v5).
const DERIVED_NAMESPACE: Uuid = Uuid::from_u128(0x4a61_6e4b_656e_506f_6e4c_6561_6775_6531);

/// Derive a v5 UUID from length-prefixed parts so that `("ab", "c")` and
/// `("a", "bc")` never collide.
fn derive(parts: &[&[u8]]) -> Uuid {
    let mut name = Vec::with_capacity(parts.iter().map(|p| p.len() + 4).sum());
    for part in parts {
        name.extend_from_slice(&(part.len() as u32).to_be_bytes());
        name.extend_from_slice(part);
    }
    Uuid::new_v5(&DERIVED_NAMESPACE, &name)
}

/// A unique identifier for one installation of the tracker.
///
/// 32 bytes of random data, displayed as URL-safe base64.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId([u8; 32]);

impl DeviceId {
    /// Create a new random DeviceId.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(bytes)
    }

    /// Create a DeviceId from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }

    /// Get the raw bytes of this DeviceId.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", &self.to_string()[..8])
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random id (UUID v4).
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Create an id from raw bytes.
            pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
                Uuid::from_slice(bytes).ok().map(Self)
            }

            /// Get the raw bytes of this id.
            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_bytes()
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifies an Account: one person across all of their devices.
    AccountId
);
uuid_id!(
    /// Identifies an Account's membership inside one League.
    ParticipantId
);
uuid_id!(
    /// Identifies a League.
    LeagueId
);
uuid_id!(
    /// Identifies a Game within a League.
    GameId
);
uuid_id!(
    /// Identifies a Round within a Game.
    RoundId
);
uuid_id!(
    /// Identifies one Participant's Move in one Round.
    MoveId
);
uuid_id!(
    /// Identifies one object store. Stable for the lifetime of its database.
    StoreId
);

impl AccountId {
    /// The id an Account takes when the relay knows its record id.
    ///
    /// Two devices of the same person therefore agree on the owner id
    /// without having to exchange it.
    pub fn for_record(record_id: &str) -> Self {
        Self(derive(&[b"account", record_id.as_bytes()]))
    }

    /// The id of the Account created for a participant nobody claimed.
    ///
    /// Devices that reconcile the same orphan participant create the same
    /// Account.
    pub fn for_participant(participant: ParticipantId) -> Self {
        Self(derive(&[b"orphan", participant.as_bytes()]))
    }
}

impl ParticipantId {
    /// The membership id of `account` in `league`.
    pub fn for_membership(account: AccountId, league: LeagueId) -> Self {
        Self(derive(&[b"participant", account.as_bytes(), league.as_bytes()]))
    }
}

impl RoundId {
    /// The id of round `index` of `game`.
    pub fn for_index(game: GameId, index: u32) -> Self {
        Self(derive(&[b"round", game.as_bytes(), &index.to_be_bytes()]))
    }
}

impl MoveId {
    /// The id of `participant`'s move in `round`.
    pub fn for_round(round: RoundId, participant: ParticipantId) -> Self {
        Self(derive(&[b"move", round.as_bytes(), participant.as_bytes()]))
    }
}

/// A position in one store's change log.
///
/// Assigned by the store, never by clients. Tokens compare in commit order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct HistoryToken(u64);

impl HistoryToken {
    /// Create a token with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this token.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The token that follows this one.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for HistoryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for HistoryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HistoryToken({})", self.0)
    }
}

/// The tag recorded on every transaction naming the write path that made it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Author(String);

impl Author {
    /// Create an author tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The default author tag of a device's own write path.
    pub fn for_device(device: &DeviceId) -> Self {
        Self(format!("device:{device}"))
    }

    /// Get the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Author({})", self.0)
    }
}
