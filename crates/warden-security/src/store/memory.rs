//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "In-memory store backend with serialized, all-or-nothing transactions."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
//! Not durable. A transaction holds the store lock for its whole lifetime and
//! works on a staged copy of the state, which replaces the shared state only
//! on commit.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::{
    AccessKeySelector, DataError, ListAccessKeysOptions, ListGrantsOptions, Page, Store,
    StoreResult, Transaction,
};
use crate::models::{AccessKey, Grant, Group, Identity, Organization, Provider, ProviderKind};
use crate::uid::{OrganizationId, PolymorphicId, Uid};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    organizations: BTreeMap<OrganizationId, Organization>,
    identities: BTreeMap<Uid, Identity>,
    groups: BTreeMap<Uid, Group>,
    /// `(group_id, identity_id)`
    memberships: BTreeSet<(Uid, Uid)>,
    providers: BTreeMap<Uid, Provider>,
    grants: BTreeMap<Uid, Grant>,
    access_keys: BTreeMap<Uid, AccessKey>,
}

/// Shared handle; clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_organization(&self, name: &str) -> StoreResult<Organization> {
        let mut state = self.state.lock().await;
        if state.organizations.values().any(|org| org.name == name) {
            return Err(DataError::Conflict(format!(
                "organization {name:?} already exists"
            )));
        }
        let organization = Organization {
            id: OrganizationId::new(),
            name: name.to_owned(),
            created_at: Utc::now(),
        };
        let provider = Provider::native(organization.id);
        state.providers.insert(provider.id, provider);
        state
            .organizations
            .insert(organization.id, organization.clone());
        debug!(organization = %organization.id, name, "organization created");
        Ok(organization)
    }

    async fn organization_by_name(&self, name: &str) -> StoreResult<Organization> {
        let state = self.state.lock().await;
        state
            .organizations
            .values()
            .find(|org| org.name == name)
            .cloned()
            .ok_or(DataError::NotFound("organization"))
    }

    async fn begin(&self, organization: OrganizationId) -> StoreResult<Box<dyn Transaction>> {
        let guard = self.state.clone().lock_owned().await;
        if !guard.organizations.contains_key(&organization) {
            return Err(DataError::NotFound("organization"));
        }
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            organization_id: organization,
            guard,
            staged,
        }))
    }
}

pub struct MemoryTransaction {
    organization_id: OrganizationId,
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

impl MemoryTransaction {
    fn in_scope(&self, organization_id: OrganizationId) -> bool {
        organization_id == self.organization_id
    }

    fn subject_exists(&self, subject: PolymorphicId) -> bool {
        match subject {
            PolymorphicId::Identity(id) => self
                .staged
                .identities
                .get(&id)
                .is_some_and(|i| self.in_scope(i.organization_id)),
            PolymorphicId::Group(id) => self
                .staged
                .groups
                .get(&id)
                .is_some_and(|g| self.in_scope(g.organization_id)),
        }
    }

    fn subjects_for(&self, subject: PolymorphicId, inherited: bool) -> BTreeSet<PolymorphicId> {
        let mut subjects = BTreeSet::from([subject]);
        if let (true, PolymorphicId::Identity(identity_id)) = (inherited, subject) {
            subjects.extend(
                self.staged
                    .memberships
                    .iter()
                    .filter(|(_, member)| *member == identity_id)
                    .map(|(group, _)| PolymorphicId::Group(*group)),
            );
        }
        subjects
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    async fn insert_identity(&mut self, identity: Identity) -> StoreResult<Identity> {
        if !self.in_scope(identity.organization_id) {
            return Err(DataError::NotFound("organization"));
        }
        let taken = self
            .staged
            .identities
            .values()
            .any(|i| self.in_scope(i.organization_id) && i.name == identity.name);
        if taken {
            return Err(DataError::Conflict(format!(
                "identity {:?} already exists",
                identity.name
            )));
        }
        self.staged.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn get_identity(&mut self, id: Uid) -> StoreResult<Identity> {
        self.staged
            .identities
            .get(&id)
            .filter(|i| self.in_scope(i.organization_id))
            .cloned()
            .ok_or(DataError::NotFound("identity"))
    }

    async fn identity_by_name(&mut self, name: &str) -> StoreResult<Identity> {
        self.staged
            .identities
            .values()
            .find(|i| self.in_scope(i.organization_id) && i.name == name)
            .cloned()
            .ok_or(DataError::NotFound("identity"))
    }

    async fn insert_group(&mut self, group: Group) -> StoreResult<Group> {
        if !self.in_scope(group.organization_id) {
            return Err(DataError::NotFound("organization"));
        }
        let taken = self
            .staged
            .groups
            .values()
            .any(|g| self.in_scope(g.organization_id) && g.name == group.name);
        if taken {
            return Err(DataError::Conflict(format!(
                "group {:?} already exists",
                group.name
            )));
        }
        self.staged.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn get_group(&mut self, id: Uid) -> StoreResult<Group> {
        self.staged
            .groups
            .get(&id)
            .filter(|g| self.in_scope(g.organization_id))
            .cloned()
            .ok_or(DataError::NotFound("group"))
    }

    async fn group_by_name(&mut self, name: &str) -> StoreResult<Group> {
        self.staged
            .groups
            .values()
            .find(|g| self.in_scope(g.organization_id) && g.name == name)
            .cloned()
            .ok_or(DataError::NotFound("group"))
    }

    async fn add_group_member(&mut self, group_id: Uid, identity_id: Uid) -> StoreResult<()> {
        self.get_group(group_id).await?;
        self.get_identity(identity_id).await?;
        self.staged.memberships.insert((group_id, identity_id));
        Ok(())
    }

    async fn groups_for_identity(&mut self, identity_id: Uid) -> StoreResult<Vec<Group>> {
        let groups = self
            .staged
            .memberships
            .iter()
            .filter(|(_, member)| *member == identity_id)
            .filter_map(|(group, _)| self.staged.groups.get(group))
            .filter(|g| self.in_scope(g.organization_id))
            .cloned()
            .collect();
        Ok(groups)
    }

    async fn insert_provider(&mut self, provider: Provider) -> StoreResult<Provider> {
        if !self.in_scope(provider.organization_id) {
            return Err(DataError::NotFound("organization"));
        }
        self.staged.providers.insert(provider.id, provider.clone());
        Ok(provider)
    }

    async fn native_provider(&mut self) -> StoreResult<Provider> {
        self.staged
            .providers
            .values()
            .find(|p| self.in_scope(p.organization_id) && p.kind == ProviderKind::Native)
            .cloned()
            .ok_or(DataError::NotFound("provider"))
    }

    async fn insert_grant(&mut self, grant: Grant) -> StoreResult<Grant> {
        if !self.in_scope(grant.organization_id) {
            return Err(DataError::NotFound("organization"));
        }
        if !self.subject_exists(grant.subject) {
            return Err(DataError::NotFound("subject"));
        }
        let duplicate = self.staged.grants.values().any(|g| {
            self.in_scope(g.organization_id)
                && g.deleted_at.is_none()
                && g.subject == grant.subject
                && g.privilege == grant.privilege
                && g.resource == grant.resource
        });
        if duplicate {
            return Err(DataError::Conflict(format!(
                "{} already holds {} on {}",
                grant.subject, grant.privilege, grant.resource
            )));
        }
        self.staged.grants.insert(grant.id, grant.clone());
        Ok(grant)
    }

    async fn get_grant(&mut self, id: Uid) -> StoreResult<Grant> {
        self.staged
            .grants
            .get(&id)
            .filter(|g| self.in_scope(g.organization_id) && g.deleted_at.is_none())
            .cloned()
            .ok_or(DataError::NotFound("grant"))
    }

    async fn list_grants(&mut self, options: &ListGrantsOptions) -> StoreResult<Page<Grant>> {
        let subjects = options
            .by_subject
            .map(|s| self.subjects_for(s, options.include_inherited_from_groups));
        let mut grants: Vec<Grant> = self
            .staged
            .grants
            .values()
            .filter(|g| self.in_scope(g.organization_id) && g.deleted_at.is_none())
            .filter(|g| subjects.as_ref().map_or(true, |s| s.contains(&g.subject)))
            .filter(|g| {
                options
                    .by_resource
                    .as_ref()
                    .map_or(true, |r| &g.resource == r)
            })
            .filter(|g| {
                options.by_privileges.is_empty() || options.by_privileges.contains(&g.privilege)
            })
            .cloned()
            .collect();
        grants.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(options.pagination.apply(grants))
    }

    async fn soft_delete_grant(&mut self, id: Uid, at: DateTime<Utc>) -> StoreResult<()> {
        let organization_id = self.organization_id;
        match self.staged.grants.get_mut(&id) {
            Some(grant) if grant.organization_id == organization_id && grant.deleted_at.is_none() => {
                grant.deleted_at = Some(at);
                Ok(())
            }
            _ => Err(DataError::NotFound("grant")),
        }
    }

    async fn insert_access_key(&mut self, key: AccessKey) -> StoreResult<AccessKey> {
        if !self.in_scope(key.organization_id) {
            return Err(DataError::NotFound("organization"));
        }
        if self
            .staged
            .access_keys
            .values()
            .any(|k| k.key_id == key.key_id)
        {
            return Err(DataError::Conflict("access key id already in use".to_owned()));
        }
        let name_taken = self.staged.access_keys.values().any(|k| {
            self.in_scope(k.organization_id) && !k.is_deleted() && k.name == key.name
        });
        if name_taken {
            return Err(DataError::Conflict(format!(
                "access key {:?} already exists",
                key.name
            )));
        }
        self.staged.access_keys.insert(key.id, key.clone());
        Ok(key)
    }

    // Not tenant scoped: follows the global key-id lookup on the same row.
    async fn update_access_key(&mut self, key: &AccessKey) -> StoreResult<()> {
        match self.staged.access_keys.get_mut(&key.id) {
            Some(existing) if !existing.is_deleted() => {
                *existing = key.clone();
                Ok(())
            }
            _ => Err(DataError::NotFound("access key")),
        }
    }

    async fn get_access_key(&mut self, id: Uid) -> StoreResult<AccessKey> {
        self.staged
            .access_keys
            .get(&id)
            .filter(|k| self.in_scope(k.organization_id) && !k.is_deleted())
            .cloned()
            .ok_or(DataError::NotFound("access key"))
    }

    async fn access_key_by_key_id_for_update(&mut self, key_id: &str) -> StoreResult<AccessKey> {
        self.staged
            .access_keys
            .values()
            .find(|k| k.key_id == key_id && !k.is_deleted())
            .cloned()
            .ok_or(DataError::NotFound("access key"))
    }

    async fn list_access_keys(
        &mut self,
        options: &ListAccessKeysOptions,
    ) -> StoreResult<Page<AccessKey>> {
        let mut keys: Vec<AccessKey> = self
            .staged
            .access_keys
            .values()
            .filter(|k| self.in_scope(k.organization_id) && !k.is_deleted())
            .filter(|k| options.issued_for.map_or(true, |id| k.issued_for == id))
            .filter(|k| options.name.as_ref().map_or(true, |name| &k.name == name))
            .filter(|k| options.not_expired_at.map_or(true, |now| !k.is_expired_at(now)))
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(options.pagination.apply(keys))
    }

    async fn soft_delete_access_keys(
        &mut self,
        selector: AccessKeySelector,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let organization_id = self.organization_id;
        let mut affected = 0;
        for key in self.staged.access_keys.values_mut() {
            if key.organization_id == organization_id
                && !key.is_deleted()
                && selector.matches(key)
            {
                key.deleted_at = Some(at);
                key.updated_at = at;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}
