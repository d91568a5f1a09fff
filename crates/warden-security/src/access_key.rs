//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Access key issuance, validation with sliding expiry, listing and revocation."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
//! Access keys are bearer credentials of the form `{key_id}.{secret}`. The key
//! id is a public lookup token; only a SHA-256 digest of the secret is stored.
//! Each key has a hard expiry and an optional sliding deadline that moves
//! forward on every successful validation.
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use warden_common::{AccessKeyConfig, SharedClock};
use warden_logging::{log_security_event, SecurityOutcome};

use crate::crypto::{
    checksums_match, fingerprint, generate_key_id, generate_secret, secret_checksum,
};
use crate::error::ErrorKind;
use crate::models::AccessKey;
use crate::store::{
    AccessKeySelector, DataError, ListAccessKeysOptions, Page, Pagination, Transaction,
};
use crate::uid::Uid;
use crate::validate::{validate_name, ValidationError};

pub const KEY_ID_LENGTH: usize = 10;
pub const SECRET_LENGTH: usize = 24;

#[derive(Debug, Error)]
pub enum AccessKeyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid access key format")]
    Format,
    #[error("{0}: could not get access key from database, it may not exist")]
    NotFound(#[source] DataError),
    #[error("key name from identity: {0}")]
    IdentityNotFound(#[source] DataError),
    #[error("access key invalid secret")]
    InvalidSecret,
    #[error("access key expired")]
    Expired,
    #[error("access key expired: extension deadline exceeded")]
    DeadlineExceeded,
    #[error(transparent)]
    Store(#[from] DataError),
}

impl AccessKeyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessKeyError::Validation(_) => ErrorKind::Validation,
            AccessKeyError::Format => ErrorKind::Format,
            AccessKeyError::NotFound(_) | AccessKeyError::IdentityNotFound(_) => {
                ErrorKind::NotFound
            }
            AccessKeyError::InvalidSecret => ErrorKind::InvalidSecret,
            AccessKeyError::Expired => ErrorKind::Expired,
            AccessKeyError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            AccessKeyError::Store(err) => err.kind(),
        }
    }

    /// Deadline exceeded counts as expired.
    pub fn is_expired(&self) -> bool {
        self.kind().is_expired()
    }
}

/// Input for [`AccessKeys::create`]. Unset fields get generated or default values.
#[derive(Clone, Default)]
pub struct NewAccessKey {
    /// Empty is treated as absent.
    pub name: Option<String>,
    pub issued_for: Option<Uid>,
    pub provider_id: Option<Uid>,
    pub ttl: Option<Duration>,
    /// Sliding window; zero or unset disables it.
    pub extension: Option<Duration>,
    pub key_id: Option<String>,
    pub secret: Option<String>,
    pub scopes: Vec<String>,
}

impl fmt::Debug for NewAccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccessKey")
            .field("name", &self.name)
            .field("issued_for", &self.issued_for)
            .field("provider_id", &self.provider_id)
            .field("ttl", &self.ttl)
            .field("extension", &self.extension)
            .field("key_id", &self.key_id)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// A freshly created key together with the only copy of its credential.
#[derive(Clone)]
pub struct IssuedAccessKey {
    pub credential: String,
    pub key: AccessKey,
}

impl fmt::Debug for IssuedAccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedAccessKey")
            .field("credential", &"<redacted>")
            .field("key", &self.key)
            .finish()
    }
}

/// Selects keys to revoke. Exactly one field must be set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteAccessKeys {
    pub by_id: Option<Uid>,
    pub by_issued_for: Option<Uid>,
    pub by_provider_id: Option<Uid>,
}

impl TryFrom<DeleteAccessKeys> for AccessKeySelector {
    type Error = ValidationError;

    fn try_from(options: DeleteAccessKeys) -> Result<Self, Self::Error> {
        let selectors = [
            options.by_id.map(AccessKeySelector::ById),
            options.by_issued_for.map(AccessKeySelector::ByIssuedFor),
            options.by_provider_id.map(AccessKeySelector::ByProvider),
        ];
        let mut chosen = selectors.into_iter().flatten();
        match (chosen.next(), chosen.next()) {
            (Some(selector), None) => Ok(selector),
            (None, _) => Err(ValidationError::message(
                "deleting access keys requires an id, an issuedFor or a providerID",
            )),
            (Some(_), Some(_)) => Err(ValidationError::message(
                "deleting access keys accepts only one selector",
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListAccessKeys {
    pub issued_for: Option<Uid>,
    pub name: Option<String>,
    pub show_expired: bool,
    pub pagination: Pagination,
}

#[derive(Debug, Clone)]
pub struct AccessKeys {
    clock: SharedClock,
    default_ttl: Duration,
}

impl AccessKeys {
    pub fn new(clock: SharedClock, default_ttl: Duration) -> Self {
        Self { clock, default_ttl }
    }

    pub fn from_config(config: &AccessKeyConfig, clock: SharedClock) -> Self {
        let default_ttl =
            Duration::from_std(config.default_ttl).unwrap_or_else(|_| Duration::hours(12));
        Self::new(clock, default_ttl)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Issue a key. The returned credential is never observable again.
    pub async fn create(
        &self,
        tx: &mut dyn Transaction,
        request: NewAccessKey,
    ) -> Result<IssuedAccessKey, AccessKeyError> {
        let issued_for = request
            .issued_for
            .ok_or_else(|| ValidationError::required("issuedFor"))?;
        let provider_id = request
            .provider_id
            .ok_or_else(|| ValidationError::required("providerID"))?;
        let name = request.name.filter(|name| !name.is_empty());
        if let Some(name) = &name {
            validate_name("name", name)?;
        }

        let key_id = match request.key_id {
            Some(key_id) => {
                check_token("keyID", &key_id, KEY_ID_LENGTH, "invalid key length")?;
                key_id
            }
            None => generate_key_id(KEY_ID_LENGTH),
        };
        let secret = match request.secret {
            Some(secret) => {
                check_token("secret", &secret, SECRET_LENGTH, "invalid secret length")?;
                secret
            }
            None => generate_secret(SECRET_LENGTH),
        };

        let ttl = request.ttl.unwrap_or(self.default_ttl);
        if ttl <= Duration::zero() {
            return Err(ValidationError::field("ttl", "must be greater than zero").into());
        }
        let extension = request.extension.unwrap_or_else(Duration::zero);
        if extension < Duration::zero() {
            return Err(ValidationError::field("extensionDeadline", "must not be negative").into());
        }

        let identity = tx.get_identity(issued_for).await.map_err(|err| {
            if err.is_not_found() {
                AccessKeyError::IdentityNotFound(err)
            } else {
                AccessKeyError::Store(err)
            }
        })?;

        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| ValidationError::field("ttl", "is out of range"))?;
        let extension_deadline = match extension > Duration::zero() {
            true => Some(now.checked_add_signed(extension).ok_or_else(|| {
                ValidationError::field("extensionDeadline", "is out of range")
            })?),
            false => None,
        };
        let id = Uid::new();
        let key = AccessKey {
            id,
            organization_id: tx.organization_id(),
            name: name.unwrap_or_else(|| format!("{}-{}", identity.name, id)),
            issued_for,
            provider_id,
            key_id,
            secret_checksum: secret_checksum(&secret),
            expires_at,
            extension,
            extension_deadline,
            scopes: request.scopes,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let key = tx.insert_access_key(key).await?;
        tracing::info!(
            organization = %key.organization_id,
            issued_for = %key.issued_for,
            key_id = %key.key_id,
            expires_at = %key.expires_at,
            "access key issued"
        );

        Ok(IssuedAccessKey {
            credential: format!("{}.{}", key.key_id, secret),
            key,
        })
    }

    /// Check a presented credential and slide its deadline forward.
    ///
    /// The key lookup is global and locks the row, so concurrent validations
    /// of the same key never hand out two different extension windows.
    pub async fn validate(
        &self,
        tx: &mut dyn Transaction,
        credential: &str,
    ) -> Result<AccessKey, AccessKeyError> {
        let (key_id, secret) = credential
            .split_once('.')
            .ok_or(AccessKeyError::Format)?;

        let mut key = tx
            .access_key_by_key_id_for_update(key_id)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    AccessKeyError::NotFound(err)
                } else {
                    AccessKeyError::Store(err)
                }
            })?;

        if !checksums_match(&key.secret_checksum, &secret_checksum(secret)) {
            log_security_event(
                None,
                "access_key.validate",
                &format!("invalid secret for key {}", key.key_id),
                SecurityOutcome::Denied,
            );
            return Err(AccessKeyError::InvalidSecret);
        }

        let now = self.clock.now();
        if now > key.expires_at {
            return Err(AccessKeyError::Expired);
        }

        if let Some(deadline) = key.extension_deadline {
            if now > deadline {
                return Err(AccessKeyError::DeadlineExceeded);
            }
            // Overflow falls back to the hard expiry, which bounds the key anyway.
            key.extension_deadline =
                Some(now.checked_add_signed(key.extension).unwrap_or(key.expires_at));
            key.updated_at = now;
            tx.update_access_key(&key).await?;
        }

        tracing::debug!(
            key_id = %key.key_id,
            checksum = %fingerprint(&key.secret_checksum),
            "access key validated"
        );
        Ok(key)
    }

    /// Soft delete keys in the transaction's organization. Returns the count.
    pub async fn delete(
        &self,
        tx: &mut dyn Transaction,
        options: DeleteAccessKeys,
    ) -> Result<u64, AccessKeyError> {
        let selector = AccessKeySelector::try_from(options)?;
        let deleted = tx
            .soft_delete_access_keys(selector, self.clock.now())
            .await?;
        tracing::info!(
            organization = %tx.organization_id(),
            selector = ?selector,
            deleted,
            "access keys revoked"
        );
        Ok(deleted)
    }

    /// Keys of the transaction's organization sorted by name.
    pub async fn list(
        &self,
        tx: &mut dyn Transaction,
        options: ListAccessKeys,
    ) -> Result<Page<AccessKey>, AccessKeyError> {
        let query = ListAccessKeysOptions {
            issued_for: options.issued_for,
            name: options.name,
            not_expired_at: (!options.show_expired).then(|| self.clock.now()),
            pagination: options.pagination,
        };
        Ok(tx.list_access_keys(&query).await?)
    }

    pub async fn get(&self, tx: &mut dyn Transaction, id: Uid) -> Result<AccessKey, AccessKeyError> {
        tx.get_access_key(id).await.map_err(|err| {
            if err.is_not_found() {
                AccessKeyError::NotFound(err)
            } else {
                AccessKeyError::Store(err)
            }
        })
    }
}

fn check_token(
    field: &str,
    value: &str,
    length: usize,
    message: &str,
) -> Result<(), ValidationError> {
    if value.len() != length || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::field(field, message));
    }
    Ok(())
}
