//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Per-request state: tenant, authenticated principal and the open transaction."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::sync::Arc;

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::models::{AccessKey, Identity};
use crate::store::{DataError, StoreResult, Transaction};
use crate::uid::OrganizationId;

/// Locked view of the request transaction.
pub type TxnGuard<'a> = MappedMutexGuard<'a, dyn Transaction>;

/// The request's transaction, shared between the authorization check and the
/// handler. Taken out exactly once by commit or rollback.
#[derive(Clone)]
pub struct SharedTransaction {
    inner: Arc<Mutex<Option<Box<dyn Transaction>>>>,
}

impl SharedTransaction {
    pub fn new(txn: Box<dyn Transaction>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(txn))),
        }
    }

    pub async fn lock(&self) -> StoreResult<TxnGuard<'_>> {
        let guard = self.inner.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_deref_mut())
            .map_err(|_| DataError::TransactionClosed)
    }

    pub async fn commit(&self) -> StoreResult<()> {
        let txn = self.inner.lock().await.take();
        match txn {
            Some(txn) => txn.commit().await,
            None => Err(DataError::TransactionClosed),
        }
    }

    /// Discard pending writes. Safe to call on a finished transaction.
    pub async fn rollback(&self) {
        drop(self.inner.lock().await.take());
    }
}

impl std::fmt::Debug for SharedTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTransaction").finish_non_exhaustive()
    }
}

/// Principal resolved by the authentication step.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub identity: Identity,
    /// Credential used for this request, when authenticated by access key.
    pub access_key: Option<AccessKey>,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub organization_id: OrganizationId,
    pub authenticated: Option<Arc<Authenticated>>,
    pub txn: SharedTransaction,
}

impl RequestContext {
    pub fn new(organization_id: OrganizationId, txn: Box<dyn Transaction>) -> Self {
        Self {
            organization_id,
            authenticated: None,
            txn: SharedTransaction::new(txn),
        }
    }

    pub fn with_authenticated(mut self, authenticated: Authenticated) -> Self {
        self.authenticated = Some(Arc::new(authenticated));
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.authenticated.as_ref().map(|a| &a.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};

    #[tokio::test]
    async fn commit_publishes_and_closes() {
        let store = MemoryStore::new();
        let org = store.create_organization("acme").await.unwrap();
        let shared = SharedTransaction::new(store.begin(org.id).await.unwrap());

        {
            let mut txn = shared.lock().await.unwrap();
            txn.insert_identity(Identity::new(org.id, "alice"))
                .await
                .unwrap();
        }
        shared.commit().await.unwrap();
        assert!(matches!(
            shared.lock().await.map(|_| ()),
            Err(DataError::TransactionClosed)
        ));
        assert!(shared.commit().await.is_err());

        let mut tx = store.begin(org.id).await.unwrap();
        assert!(tx.identity_by_name("alice").await.is_ok());
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = MemoryStore::new();
        let org = store.create_organization("acme").await.unwrap();
        let ctx = RequestContext::new(org.id, store.begin(org.id).await.unwrap());
        let clone = ctx.clone();
        {
            let mut txn = clone.txn.lock().await.unwrap();
            txn.insert_identity(Identity::new(org.id, "bob")).await.unwrap();
        }
        ctx.txn.rollback().await;
        ctx.txn.rollback().await;

        let mut tx = store.begin(org.id).await.unwrap();
        assert!(tx.identity_by_name("bob").await.is_err());
        assert!(ctx.identity().is_none());
    }
}
