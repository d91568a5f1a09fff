//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Grant based authorization checks and authorization error shaping."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use thiserror::Error;
use warden_logging::{log_security_event, LogContext, SecurityOutcome};

use crate::context::{RequestContext, TxnGuard};
use crate::error::{chain, ErrorKind};
use crate::store::{DataError, ListGrantsOptions, Pagination, Transaction};
use crate::uid::{PolymorphicId, Uid};

/// Resource name under which roles on the service itself are granted.
pub const RESOURCE_WARDEN_API: &str = "warden";

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_VIEW: &str = "view";
pub const ROLE_CONNECTOR: &str = "connector";

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("no active identity")]
    NoIdentity,
    #[error("not authorized")]
    NotAuthorized,
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error("owner lookup: {0}")]
    OwnerLookup(#[source] BoxError),
    #[error("has grants: {0}")]
    Grants(#[source] DataError),
    #[error(transparent)]
    Store(#[from] DataError),
}

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        if is_not_authorized(self) {
            return ErrorKind::NotAuthorized;
        }
        match self {
            AccessError::NoIdentity => ErrorKind::NoActiveIdentity,
            AccessError::Grants(err) | AccessError::Store(err) => err.kind(),
            AccessError::OwnerLookup(err) => chain(&**err)
                .find_map(|e| e.downcast_ref::<DataError>())
                .map_or(ErrorKind::Internal, DataError::kind),
            AccessError::NotAuthorized | AccessError::Authorization(_) => {
                ErrorKind::NotAuthorized
            }
        }
    }
}

/// Denial enriched with what the caller would have needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationError {
    pub resource: String,
    pub operation: String,
    pub required_roles: Vec<String>,
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "you do not have permission to {} {}, requires role {}",
            self.operation,
            self.resource,
            join_roles(&self.required_roles)
        )
    }
}

impl StdError for AuthorizationError {}

/// "X", "X or Y", "X, Y, or Z".
fn join_roles(roles: &[String]) -> String {
    match roles {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} or {second}"),
        [init @ .., last] => format!("{}, or {last}", init.join(", ")),
    }
}

/// True when `err` or anything in its source chain is a plain or enriched denial.
pub fn is_not_authorized(err: &(dyn StdError + 'static)) -> bool {
    chain(err).any(|e| {
        e.is::<AuthorizationError>()
            || e.downcast_ref::<AccessError>().is_some_and(|a| {
                matches!(a, AccessError::NotAuthorized | AccessError::Authorization(_))
            })
    })
}

/// Rewrite a denial, however deeply wrapped, into an [`AuthorizationError`].
/// Any other error passes through untouched.
pub fn handle_auth_err(
    err: AccessError,
    resource: &str,
    operation: &str,
    roles: &[&str],
) -> AccessError {
    if !is_not_authorized(&err) {
        return err;
    }
    AccessError::Authorization(AuthorizationError {
        resource: resource.to_owned(),
        operation: operation.to_owned(),
        required_roles: roles.iter().map(|r| (*r).to_owned()).collect(),
    })
}

/// Whether `subject`, directly or through a group, holds any of `privileges` on `resource`.
pub async fn can(
    tx: &mut dyn Transaction,
    subject: PolymorphicId,
    resource: &str,
    privileges: &[&str],
) -> Result<bool, AccessError> {
    let options = ListGrantsOptions {
        by_subject: Some(subject),
        by_resource: Some(resource.to_owned()),
        by_privileges: privileges.iter().map(|p| (*p).to_owned()).collect(),
        include_inherited_from_groups: true,
        pagination: Pagination::new(1, 1),
    };
    let page = tx.list_grants(&options).await.map_err(AccessError::Grants)?;
    Ok(!page.items.is_empty())
}

/// Require one of `roles` on the service resource. On success the caller keeps
/// using the returned transaction.
pub fn require_infra_role<'a>(
    ctx: &'a RequestContext,
    roles: &'static [&'static str],
) -> BoxFuture<'a, Result<TxnGuard<'a>, AccessError>> {
    Box::pin(async move {
        let identity = ctx.identity().ok_or(AccessError::NoIdentity)?;
        let subject = identity.poly_id();
        let mut txn = ctx.txn.lock().await?;
        let allowed = can(&mut *txn, subject, RESOURCE_WARDEN_API, roles).await?;

        let organization = ctx.organization_id.to_string();
        let subject = subject.to_string();
        let log_ctx = LogContext::new()
            .with_organization(&organization)
            .with_identity(&subject);
        if allowed {
            log_security_event(
                Some(&log_ctx),
                "grant.check",
                &format!("role check passed for {}", roles.join(",")),
                SecurityOutcome::Allowed,
            );
            Ok(txn)
        } else {
            log_security_event(
                Some(&log_ctx),
                "grant.check",
                &format!("missing any of roles {}", roles.join(",")),
                SecurityOutcome::Denied,
            );
            Err(AccessError::NotAuthorized)
        }
    })
}

/// Owners of `resource_id` pass without a role; everyone else needs one of `roles`.
pub fn has_authorization<'a, F, Fut, E>(
    ctx: &'a RequestContext,
    resource_id: Uid,
    is_owner: F,
    roles: &'static [&'static str],
) -> BoxFuture<'a, Result<TxnGuard<'a>, AccessError>>
where
    F: FnOnce(RequestContext, Uid) -> Fut + Send + 'a,
    Fut: Future<Output = Result<bool, E>> + Send + 'a,
    E: Into<BoxError> + Send + 'a,
{
    Box::pin(async move {
        let owner = is_owner(ctx.clone(), resource_id)
            .await
            .map_err(|err| AccessError::OwnerLookup(err.into()))?;
        if owner {
            return Ok(ctx.txn.lock().await?);
        }
        require_infra_role(ctx, roles).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Authenticated;
    use crate::models::{Grant, Group, Identity};
    use crate::store::{MemoryStore, Store};
    use crate::uid::OrganizationId;
    use chrono::Utc;

    fn grant(org: OrganizationId, subject: PolymorphicId, privilege: &str) -> Grant {
        Grant {
            id: Uid::new(),
            organization_id: org,
            subject,
            privilege: privilege.into(),
            resource: RESOURCE_WARDEN_API.into(),
            created_by: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn roles_are_joined_grammatically() {
        fn err(roles: &[&str]) -> String {
            AuthorizationError {
                resource: "access keys".into(),
                operation: "list".into(),
                required_roles: roles.iter().map(|r| r.to_string()).collect(),
            }
            .to_string()
        }
        assert_eq!(
            err(&["admin"]),
            "you do not have permission to list access keys, requires role admin"
        );
        assert!(err(&["admin", "view"]).ends_with("requires role admin or view"));
        assert!(err(&["admin", "view", "connector"])
            .ends_with("requires role admin, view, or connector"));
    }

    #[derive(Debug, Error)]
    #[error("handler failed")]
    struct Wrapper(#[source] AccessError);

    #[test]
    fn denial_is_detected_through_wrapping() {
        let wrapped = Wrapper(AccessError::NotAuthorized);
        assert!(is_not_authorized(&wrapped));

        let owner = AccessError::OwnerLookup(Box::new(Wrapper(AccessError::NotAuthorized)));
        assert!(is_not_authorized(&owner));
        let enriched = handle_auth_err(owner, "grants", "delete", &[ROLE_ADMIN]);
        assert!(matches!(enriched, AccessError::Authorization(_)));
        assert_eq!(enriched.kind(), ErrorKind::NotAuthorized);

        let untouched =
            handle_auth_err(AccessError::NoIdentity, "grants", "delete", &[ROLE_ADMIN]);
        assert!(matches!(untouched, AccessError::NoIdentity));
    }

    #[tokio::test]
    async fn group_membership_confers_roles_and_revocation_removes_them() {
        let store = MemoryStore::new();
        let org = store.create_organization("acme").await.unwrap().id;
        let mut tx = store.begin(org).await.unwrap();
        let user = tx.insert_identity(Identity::new(org, "u")).await.unwrap();
        let group = tx.insert_group(Group::new(org, "ops")).await.unwrap();
        tx.add_group_member(group.id, user.id).await.unwrap();

        assert!(!can(tx.as_mut(), user.poly_id(), RESOURCE_WARDEN_API, &[ROLE_VIEW])
            .await
            .unwrap());

        let held = tx
            .insert_grant(grant(org, group.poly_id(), ROLE_VIEW))
            .await
            .unwrap();
        let roles = [ROLE_ADMIN, ROLE_VIEW];
        assert!(can(tx.as_mut(), user.poly_id(), RESOURCE_WARDEN_API, &roles)
            .await
            .unwrap());
        assert!(!can(tx.as_mut(), user.poly_id(), "elsewhere", &[ROLE_VIEW])
            .await
            .unwrap());

        tx.soft_delete_grant(held.id, Utc::now()).await.unwrap();
        assert!(!can(tx.as_mut(), user.poly_id(), RESOURCE_WARDEN_API, &[ROLE_VIEW])
            .await
            .unwrap());
    }

    async fn context_for(store: &MemoryStore, roles: &[&str]) -> (RequestContext, Identity) {
        let org = store.create_organization("acme").await.unwrap().id;
        let mut tx = store.begin(org).await.unwrap();
        let user = tx.insert_identity(Identity::new(org, "u")).await.unwrap();
        for role in roles {
            tx.insert_grant(grant(org, user.poly_id(), role)).await.unwrap();
        }
        let ctx = RequestContext::new(org, tx).with_authenticated(Authenticated {
            identity: user.clone(),
            access_key: None,
        });
        (ctx, user)
    }

    #[tokio::test]
    async fn require_infra_role_checks_grants() {
        let store = MemoryStore::new();
        let (ctx, _) = context_for(&store, &[ROLE_VIEW]).await;

        assert!(require_infra_role(&ctx, &[ROLE_ADMIN, ROLE_VIEW]).await.is_ok());
        let err = require_infra_role(&ctx, &[ROLE_ADMIN]).await.err().unwrap();
        assert!(matches!(err, AccessError::NotAuthorized));

        let anonymous = RequestContext {
            authenticated: None,
            ..ctx.clone()
        };
        let err = require_infra_role(&anonymous, &[ROLE_VIEW]).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NoActiveIdentity);
    }

    #[tokio::test]
    async fn owners_bypass_role_checks() {
        let store = MemoryStore::new();
        let (ctx, user) = context_for(&store, &[]).await;

        let is_self = |ctx: RequestContext, id: Uid| async move {
            Ok::<_, DataError>(ctx.identity().map(|i| i.id) == Some(id))
        };
        assert!(has_authorization(&ctx, user.id, is_self, &[ROLE_ADMIN])
            .await
            .is_ok());
        let err = has_authorization(&ctx, Uid::new(), is_self, &[ROLE_ADMIN])
            .await
            .err()
            .unwrap();
        assert!(is_not_authorized(&err));

        let failing = |_: RequestContext, _: Uid| async move {
            Err::<bool, _>(DataError::NotFound("access key"))
        };
        let err = has_authorization(&ctx, user.id, failing, &[ROLE_ADMIN])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AccessError::OwnerLookup(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().starts_with("owner lookup"));
    }
}
