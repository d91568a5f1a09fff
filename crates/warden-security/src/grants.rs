//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Grant management: creation, listing and revocation."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use thiserror::Error;
use warden_common::SharedClock;

use crate::error::ErrorKind;
use crate::models::Grant;
use crate::store::{DataError, ListGrantsOptions, Page, Pagination, Transaction};
use crate::uid::{PolymorphicId, Uid};
use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum GrantError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] DataError),
}

impl GrantError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GrantError::Validation(_) => ErrorKind::Validation,
            GrantError::Store(err) => err.kind(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewGrant {
    pub subject: PolymorphicId,
    pub privilege: String,
    pub resource: String,
    pub created_by: Option<Uid>,
}

#[derive(Debug, Clone, Default)]
pub struct ListGrants {
    pub subject: Option<PolymorphicId>,
    pub resource: Option<String>,
    pub privilege: Option<String>,
    /// Include grants held by the subject's groups.
    pub show_inherited: bool,
    pub pagination: Pagination,
}

#[derive(Debug, Clone)]
pub struct Grants {
    clock: SharedClock,
}

impl Grants {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    pub async fn create(
        &self,
        tx: &mut dyn Transaction,
        grant: NewGrant,
    ) -> Result<Grant, GrantError> {
        let mut errors = ValidationError::default();
        if grant.privilege.trim().is_empty() {
            errors = errors.with_field("privilege", "is required");
        }
        if grant.resource.trim().is_empty() {
            errors = errors.with_field("resource", "is required");
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let grant = Grant {
            id: Uid::new(),
            organization_id: tx.organization_id(),
            subject: grant.subject,
            privilege: grant.privilege,
            resource: grant.resource,
            created_by: grant.created_by,
            created_at: self.clock.now(),
            deleted_at: None,
        };
        let grant = tx.insert_grant(grant).await?;
        tracing::info!(
            organization = %grant.organization_id,
            subject = %grant.subject,
            privilege = %grant.privilege,
            resource = %grant.resource,
            "grant created"
        );
        Ok(grant)
    }

    pub async fn list(
        &self,
        tx: &mut dyn Transaction,
        options: ListGrants,
    ) -> Result<Page<Grant>, GrantError> {
        let query = ListGrantsOptions {
            by_subject: options.subject,
            by_resource: options.resource,
            by_privileges: options.privilege.into_iter().collect(),
            include_inherited_from_groups: options.show_inherited,
            pagination: options.pagination,
        };
        Ok(tx.list_grants(&query).await?)
    }

    pub async fn get(&self, tx: &mut dyn Transaction, id: Uid) -> Result<Grant, GrantError> {
        Ok(tx.get_grant(id).await?)
    }

    pub async fn delete(&self, tx: &mut dyn Transaction, id: Uid) -> Result<(), GrantError> {
        tx.soft_delete_grant(id, self.clock.now()).await?;
        tracing::info!(organization = %tx.organization_id(), grant = %id, "grant revoked");
        Ok(())
    }
}
