//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Records read and written by the access-control core."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use crate::uid::{OrganizationId, PolymorphicId, Uid};

/// Tenant record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A principal that can authenticate. Provisioned externally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uid,
    pub organization_id: OrganizationId,
    /// Usually the email address reported by the identity provider.
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(organization_id: OrganizationId, name: impl Into<String>) -> Self {
        Self {
            id: Uid::new(),
            organization_id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    pub fn poly_id(&self) -> PolymorphicId {
        PolymorphicId::Identity(self.id)
    }
}

/// A named set of identities. Grants held by a group are inherited by members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uid,
    pub organization_id: OrganizationId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(organization_id: OrganizationId, name: impl Into<String>) -> Self {
        Self {
            id: Uid::new(),
            organization_id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    pub fn poly_id(&self) -> PolymorphicId {
        PolymorphicId::Group(self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Credentials issued by this service itself.
    Native,
    Oidc,
}

/// Issuer of identities and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uid,
    pub organization_id: OrganizationId,
    pub name: String,
    pub kind: ProviderKind,
}

impl Provider {
    pub const NATIVE_NAME: &'static str = "warden";

    pub fn native(organization_id: OrganizationId) -> Self {
        Self {
            id: Uid::new(),
            organization_id,
            name: Self::NATIVE_NAME.to_owned(),
            kind: ProviderKind::Native,
        }
    }
}

/// Positive capability: `subject` may exercise `privilege` on `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: Uid,
    pub organization_id: OrganizationId,
    pub subject: PolymorphicId,
    pub privilege: String,
    pub resource: String,
    pub created_by: Option<Uid>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Persisted bearer credential. Holds only a digest of the secret.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub id: Uid,
    pub organization_id: OrganizationId,
    pub name: String,
    /// Identity this key authenticates as.
    pub issued_for: Uid,
    pub provider_id: Uid,
    /// Public lookup token, globally unique.
    pub key_id: String,
    #[serde(with = "hex::serde")]
    pub secret_checksum: Vec<u8>,
    /// Hard ceiling; never moved by extensions.
    pub expires_at: DateTime<Utc>,
    #[serde_as(as = "DurationSeconds<i64>")]
    pub extension: Duration,
    /// Sliding deadline, advanced by `extension` on every successful use.
    pub extension_deadline: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AccessKey {
    /// True when either the hard expiry or the sliding deadline has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
            || self
                .extension_deadline
                .is_some_and(|deadline| now > deadline)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key(now: DateTime<Utc>) -> AccessKey {
        AccessKey {
            id: Uid::new(),
            organization_id: OrganizationId::new(),
            name: "ci".into(),
            issued_for: Uid::new(),
            provider_id: Uid::new(),
            key_id: "abcdefghij".into(),
            secret_checksum: vec![0xde, 0xad],
            expires_at: now + Duration::hours(1),
            extension: Duration::minutes(5),
            extension_deadline: Some(now + Duration::minutes(5)),
            scopes: vec![],
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn expiry_considers_both_deadlines() {
        let now = Utc::now();
        let key = sample_key(now);
        assert!(!key.is_expired_at(now));
        assert!(key.is_expired_at(now + Duration::minutes(6)));
        assert!(key.is_expired_at(now + Duration::hours(2)));
    }

    #[test]
    fn checksum_serializes_as_hex() {
        let key = sample_key(Utc::now());
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["secret_checksum"], "dead");
        assert_eq!(json["extension"], 300);
    }
}
