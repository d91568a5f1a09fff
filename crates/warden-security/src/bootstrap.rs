//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Seeds identities, groups, roles and fixed access keys from configuration."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use chrono::Duration;
use thiserror::Error;
use warden_common::BootstrapConfig;

use crate::access::RESOURCE_WARDEN_API;
use crate::access_key::{AccessKeyError, AccessKeys, NewAccessKey};
use crate::grants::{GrantError, Grants, NewGrant};
use crate::models::{Group, Identity};
use crate::store::{DataError, Transaction};
use crate::uid::PolymorphicId;

/// Lifetime of keys declared in configuration.
pub const BOOTSTRAP_KEY_TTL_DAYS: i64 = 3650;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap access key for {identity}: {source}")]
    AccessKey {
        identity: String,
        #[source]
        source: AccessKeyError,
    },
    #[error("bootstrap access key for {0} must look like <key id>.<secret>")]
    MalformedAccessKey(String),
    #[error("bootstrap grant: {0}")]
    Grant(#[from] GrantError),
    #[error(transparent)]
    Store(#[from] DataError),
}

/// What a bootstrap run actually created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapSummary {
    pub groups: usize,
    pub identities: usize,
    pub grants: usize,
    pub access_keys: usize,
}

/// Apply `config` inside `tx`. Existing records are reused, so repeated runs
/// are harmless.
pub async fn apply(
    tx: &mut dyn Transaction,
    config: &BootstrapConfig,
    access_keys: &AccessKeys,
    grants: &Grants,
) -> Result<BootstrapSummary, BootstrapError> {
    let mut summary = BootstrapSummary::default();
    let organization_id = tx.organization_id();

    for declared in &config.groups {
        let group = match tx.group_by_name(&declared.name).await {
            Ok(group) => group,
            Err(err) if err.is_not_found() => {
                summary.groups += 1;
                tx.insert_group(Group::new(organization_id, &declared.name))
                    .await?
            }
            Err(err) => return Err(err.into()),
        };
        for role in &declared.roles {
            if ensure_role(tx, grants, group.poly_id(), role).await? {
                summary.grants += 1;
            }
        }
    }

    for declared in &config.identities {
        let identity = match tx.identity_by_name(&declared.name).await {
            Ok(identity) => identity,
            Err(err) if err.is_not_found() => {
                summary.identities += 1;
                tx.insert_identity(Identity::new(organization_id, &declared.name))
                    .await?
            }
            Err(err) => return Err(err.into()),
        };
        for role in &declared.roles {
            if ensure_role(tx, grants, identity.poly_id(), role).await? {
                summary.grants += 1;
            }
        }
        for group_name in &declared.groups {
            let group = tx.group_by_name(group_name).await?;
            tx.add_group_member(group.id, identity.id).await?;
        }

        if let Some(credential) = &declared.access_key {
            let (key_id, secret) = credential
                .split_once('.')
                .ok_or_else(|| BootstrapError::MalformedAccessKey(declared.name.clone()))?;
            match tx.access_key_by_key_id_for_update(key_id).await {
                Ok(_) => continue,
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err.into()),
            }
            let provider = tx.native_provider().await?;
            let request = NewAccessKey {
                name: Some(format!("{}-bootstrap", declared.name)),
                issued_for: Some(identity.id),
                provider_id: Some(provider.id),
                ttl: Some(Duration::days(BOOTSTRAP_KEY_TTL_DAYS)),
                key_id: Some(key_id.to_owned()),
                secret: Some(secret.to_owned()),
                ..Default::default()
            };
            access_keys
                .create(tx, request)
                .await
                .map_err(|source| BootstrapError::AccessKey {
                    identity: declared.name.clone(),
                    source,
                })?;
            summary.access_keys += 1;
        }
    }

    tracing::info!(
        organization = %organization_id,
        groups = summary.groups,
        identities = summary.identities,
        grants = summary.grants,
        access_keys = summary.access_keys,
        "bootstrap applied"
    );
    Ok(summary)
}

async fn ensure_role(
    tx: &mut dyn Transaction,
    grants: &Grants,
    subject: PolymorphicId,
    role: &str,
) -> Result<bool, BootstrapError> {
    let request = NewGrant {
        subject,
        privilege: role.to_owned(),
        resource: RESOURCE_WARDEN_API.to_owned(),
        created_by: None,
    };
    match grants.create(tx, request).await {
        Ok(_) => Ok(true),
        Err(GrantError::Store(DataError::Conflict(_))) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{can, ROLE_ADMIN, ROLE_VIEW};
    use crate::store::{MemoryStore, Store};
    use warden_common::{system_clock, AppConfig};

    const CONFIG: &str = r#"
[[bootstrap.groups]]
name = "operators"
roles = ["view"]

[[bootstrap.identities]]
name = "admin@example.com"
roles = ["admin"]
access_key = "aaaaaaaaaa.bbbbbbbbbbbbbbbbbbbbbbbb"

[[bootstrap.identities]]
name = "viewer@example.com"
groups = ["operators"]
"#;

    #[tokio::test]
    async fn seeds_and_is_idempotent() {
        let config: AppConfig = CONFIG.parse().unwrap();
        let store = MemoryStore::new();
        let org = store.create_organization("acme").await.unwrap().id;
        let keys = AccessKeys::new(system_clock(), Duration::hours(12));
        let grants = Grants::new(system_clock());

        let mut tx = store.begin(org).await.unwrap();
        let first = apply(tx.as_mut(), &config.bootstrap, &keys, &grants)
            .await
            .unwrap();
        assert_eq!(
            first,
            BootstrapSummary {
                groups: 1,
                identities: 2,
                grants: 2,
                access_keys: 1,
            }
        );
        let again = apply(tx.as_mut(), &config.bootstrap, &keys, &grants)
            .await
            .unwrap();
        assert_eq!(again, BootstrapSummary::default());

        let admin = keys
            .validate(tx.as_mut(), "aaaaaaaaaa.bbbbbbbbbbbbbbbbbbbbbbbb")
            .await
            .unwrap();
        let admin = tx.get_identity(admin.issued_for).await.unwrap();
        assert!(can(tx.as_mut(), admin.poly_id(), RESOURCE_WARDEN_API, &[ROLE_ADMIN])
            .await
            .unwrap());

        let viewer = tx.identity_by_name("viewer@example.com").await.unwrap();
        assert!(can(tx.as_mut(), viewer.poly_id(), RESOURCE_WARDEN_API, &[ROLE_VIEW])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn malformed_key_is_reported() {
        let config: AppConfig = r#"
[[bootstrap.identities]]
name = "broken"
access_key = "no-separator"
"#
        .parse()
        .unwrap();
        let store = MemoryStore::new();
        let org = store.create_organization("acme").await.unwrap().id;
        let mut tx = store.begin(org).await.unwrap();
        let err = apply(
            tx.as_mut(),
            &config.bootstrap,
            &AccessKeys::new(system_clock(), Duration::hours(1)),
            &Grants::new(system_clock()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BootstrapError::MalformedAccessKey(_)));
    }
}
