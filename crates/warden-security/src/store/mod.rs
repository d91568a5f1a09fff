//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Credential store adapter: transactional, tenant-scoped persistence."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::models::{AccessKey, Grant, Group, Identity, Organization, Provider};
use crate::uid::{OrganizationId, PolymorphicId, Uid};

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transaction already finished")]
    TransactionClosed,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl DataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::NotFound(_) => ErrorKind::NotFound,
            DataError::Conflict(_) => ErrorKind::Conflict,
            DataError::TransactionClosed | DataError::Unexpected(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, DataError>;

pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// One-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Pagination {
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    /// Slice an already ordered result set.
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let total_count = items.len();
        let offset = (self.page.max(1) - 1).saturating_mul(self.limit);
        let items = items.into_iter().skip(offset).take(self.limit).collect();
        Page { items, total_count }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ListGrantsOptions {
    pub by_subject: Option<PolymorphicId>,
    pub by_resource: Option<String>,
    /// Match any of these privileges. Empty matches all.
    pub by_privileges: Vec<String>,
    /// Also match grants held by groups `by_subject` belongs to.
    pub include_inherited_from_groups: bool,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default)]
pub struct ListAccessKeysOptions {
    pub issued_for: Option<Uid>,
    pub name: Option<String>,
    /// Hide keys whose hard expiry or sliding deadline is before this instant.
    pub not_expired_at: Option<DateTime<Utc>>,
    pub pagination: Pagination,
}

/// Exactly one way of choosing access keys for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKeySelector {
    ById(Uid),
    ByIssuedFor(Uid),
    ByProvider(Uid),
}

impl AccessKeySelector {
    pub fn matches(&self, key: &AccessKey) -> bool {
        match *self {
            AccessKeySelector::ById(id) => key.id == id,
            AccessKeySelector::ByIssuedFor(id) => key.issued_for == id,
            AccessKeySelector::ByProvider(id) => key.provider_id == id,
        }
    }
}

/// Entry point of a store backend.
///
/// Transactions are serialized, and the organization methods wait for the
/// same lock. Calling them while the current task holds an open transaction
/// never returns; commit or drop it first.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Create a tenant together with its native provider.
    async fn create_organization(&self, name: &str) -> StoreResult<Organization>;

    async fn organization_by_name(&self, name: &str) -> StoreResult<Organization>;

    /// Open a transaction scoped to `organization`. Waits until no other
    /// transaction is open.
    async fn begin(&self, organization: OrganizationId) -> StoreResult<Box<dyn Transaction>>;
}

/// Unit of work scoped to one tenant.
///
/// Every query filters on [`Transaction::organization_id`] except
/// [`Transaction::access_key_by_key_id_for_update`]. Dropping without
/// [`Transaction::commit`] discards all writes.
#[async_trait]
pub trait Transaction: Send + Sync {
    fn organization_id(&self) -> OrganizationId;

    async fn insert_identity(&mut self, identity: Identity) -> StoreResult<Identity>;
    async fn get_identity(&mut self, id: Uid) -> StoreResult<Identity>;
    async fn identity_by_name(&mut self, name: &str) -> StoreResult<Identity>;

    async fn insert_group(&mut self, group: Group) -> StoreResult<Group>;
    async fn get_group(&mut self, id: Uid) -> StoreResult<Group>;
    async fn group_by_name(&mut self, name: &str) -> StoreResult<Group>;
    async fn add_group_member(&mut self, group_id: Uid, identity_id: Uid) -> StoreResult<()>;
    async fn groups_for_identity(&mut self, identity_id: Uid) -> StoreResult<Vec<Group>>;

    async fn insert_provider(&mut self, provider: Provider) -> StoreResult<Provider>;
    async fn native_provider(&mut self) -> StoreResult<Provider>;

    async fn insert_grant(&mut self, grant: Grant) -> StoreResult<Grant>;
    async fn get_grant(&mut self, id: Uid) -> StoreResult<Grant>;
    /// Active grants ordered by creation time.
    async fn list_grants(&mut self, options: &ListGrantsOptions) -> StoreResult<Page<Grant>>;
    async fn soft_delete_grant(&mut self, id: Uid, at: DateTime<Utc>) -> StoreResult<()>;

    async fn insert_access_key(&mut self, key: AccessKey) -> StoreResult<AccessKey>;
    async fn update_access_key(&mut self, key: &AccessKey) -> StoreResult<()>;
    async fn get_access_key(&mut self, id: Uid) -> StoreResult<AccessKey>;
    /// Global lookup by the public key id, ignoring tenant scope. The row stays
    /// locked until the transaction finishes.
    async fn access_key_by_key_id_for_update(&mut self, key_id: &str) -> StoreResult<AccessKey>;
    /// Active keys ordered by name.
    async fn list_access_keys(
        &mut self,
        options: &ListAccessKeysOptions,
    ) -> StoreResult<Page<AccessKey>>;
    /// Tombstone matching keys; returns how many were affected.
    async fn soft_delete_access_keys(
        &mut self,
        selector: AccessKeySelector,
        at: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
