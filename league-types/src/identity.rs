//! Identities reported by the cloud relay.

use serde::{Deserialize, Serialize};

/// A person as the relay describes them.
///
/// Any of the identifiers may be missing; two identities refer to the same
/// person when they agree on at least one identifier both carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Relay account record id.
    pub record_id: Option<String>,
    /// Phone number as reported by the relay.
    pub phone_number: Option<String>,
    /// Email address as reported by the relay.
    pub email_address: Option<String>,
    /// Human-readable name, if known.
    pub display_name: Option<String>,
    /// Whether the person has an account with the relay.
    pub has_relay_account: bool,
}

impl ExternalIdentity {
    /// An identity known by its relay record id.
    pub fn with_record(record_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            record_id: Some(record_id.into()),
            display_name: Some(display_name.into()),
            has_relay_account: true,
            ..Self::default()
        }
    }

    /// Add a phone number.
    pub fn phone(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }

    /// Add an email address.
    pub fn email(mut self, email_address: impl Into<String>) -> Self {
        self.email_address = Some(email_address.into());
        self
    }

    /// Whether the identity carries no stable identifier at all.
    pub fn is_anonymous(&self) -> bool {
        self.record_id.is_none() && self.phone_number.is_none() && self.email_address.is_none()
    }

    /// Whether `record_id`, `phone_number` or `email_address` match this
    /// identity's corresponding identifier.
    pub fn matches_any(
        &self,
        record_id: Option<&str>,
        phone_number: Option<&str>,
        email_address: Option<&str>,
    ) -> bool {
        fn same(a: Option<&str>, b: Option<&str>) -> bool {
            matches!((a, b), (Some(a), Some(b)) if a == b)
        }
        same(self.record_id.as_deref(), record_id)
            || same(self.phone_number.as_deref(), phone_number)
            || same(self.email_address.as_deref(), email_address)
    }
}

/// A participant's role on a relay share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Created the share.
    Owner,
    /// May manage the share's participants.
    Administrator,
    /// Invited member.
    Member,
    /// Joined through a public link.
    Public,
}
