//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Grant endpoints."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use warden_security::{
    handle_auth_err, has_authorization, require_infra_role, Grant, ListGrants, NewGrant,
    PolymorphicId, RequestContext, Uid, ValidationError, ROLE_ADMIN, ROLE_VIEW,
};
use warden_versioning::{Migration, Version};

use super::{is_self, ListResponse, PageQuery, ResourceId};
use crate::error::ApiError;
use crate::routes::{wrap, ApiBuilder, ApiRequest, Route};
use crate::ApiState;

const PATH: &str = "/api/grants";
const LIST_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_VIEW];
const ADMIN_ROLES: &[&str] = &[ROLE_ADMIN];

pub fn register(api: &mut ApiBuilder) {
    api.add(
        Route::get(PATH, wrap(list_grants))
            .summary("List grants")
            .tag("grants"),
    )
    .add(
        Route::post(PATH, wrap(create_grant))
            .summary("Create a grant")
            .tag("grants"),
    )
    .add(
        Route::delete("/api/grants/:id", wrap(delete_grant))
            .summary("Revoke a grant")
            .tag("grants"),
    )
    .migration(
        Migration::new("GET", "/api/grants?user=:id", Version::new(0, 12, 0))
            .renamed_from("/v1/identities/:id/grants"),
    );
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantView {
    pub id: Uid,
    pub created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Uid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Uid>,
    pub privilege: String,
    pub resource: String,
}

impl From<Grant> for GrantView {
    fn from(grant: Grant) -> Self {
        let (user, group) = match grant.subject {
            PolymorphicId::Identity(id) => (Some(id), None),
            PolymorphicId::Group(id) => (None, Some(id)),
        };
        Self {
            id: grant.id,
            created: grant.created_at,
            created_by: grant.created_by,
            user,
            group,
            privilege: grant.privilege,
            resource: grant.resource,
        }
    }
}

/// Exactly one of `user` and `group`.
fn subject(user: Option<Uid>, group: Option<Uid>) -> Result<Option<PolymorphicId>, ValidationError> {
    match (user, group) {
        (Some(_), Some(_)) => Err(ValidationError::message(
            "only one of user and group may be set",
        )),
        (Some(id), None) => Ok(Some(PolymorphicId::Identity(id))),
        (None, Some(id)) => Ok(Some(PolymorphicId::Group(id))),
        (None, None) => Ok(None),
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListGrantsRequest {
    pub user: Option<Uid>,
    pub group: Option<Uid>,
    pub resource: Option<String>,
    pub privilege: Option<String>,
    #[serde(default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub show_inherited: bool,
    #[serde(flatten)]
    pub page: PageQuery,
}

impl ApiRequest for ListGrantsRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        subject(self.user, self.group)?;
        if self.show_inherited && self.user.is_none() {
            return Err(ValidationError::field("showInherited", "requires user"));
        }
        Ok(())
    }
}

async fn list_grants(
    state: Arc<ApiState>,
    ctx: RequestContext,
    request: ListGrantsRequest,
) -> Result<ListResponse<GrantView>, ApiError> {
    let mut txn = match request.user {
        Some(user) => has_authorization(&ctx, user, is_self, LIST_ROLES).await,
        None => require_infra_role(&ctx, LIST_ROLES).await,
    }
    .map_err(|err| handle_auth_err(err, "grants", "list", LIST_ROLES))?;

    let pagination = request.page.pagination();
    let page = state
        .grants
        .list(
            &mut *txn,
            ListGrants {
                subject: subject(request.user, request.group)?,
                resource: request.resource,
                privilege: request.privilege,
                show_inherited: request.show_inherited,
                pagination,
            },
        )
        .await?;
    let items = page.items.into_iter().map(GrantView::from).collect();
    Ok(ListResponse::new(items, pagination, page.total_count))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateGrantRequest {
    pub user: Option<Uid>,
    pub group: Option<Uid>,
    #[serde(default)]
    pub privilege: String,
    #[serde(default)]
    pub resource: String,
}

impl ApiRequest for CreateGrantRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        match subject(self.user, self.group)? {
            Some(_) => Ok(()),
            None => Err(ValidationError::message("one of user or group is required")),
        }
    }
}

async fn create_grant(
    state: Arc<ApiState>,
    ctx: RequestContext,
    request: CreateGrantRequest,
) -> Result<GrantView, ApiError> {
    let subject = subject(request.user, request.group)?
        .ok_or_else(|| ValidationError::message("one of user or group is required"))?;
    let mut txn = require_infra_role(&ctx, ADMIN_ROLES)
        .await
        .map_err(|err| handle_auth_err(err, "grant", "create", ADMIN_ROLES))?;
    let grant = state
        .grants
        .create(
            &mut *txn,
            NewGrant {
                subject,
                privilege: request.privilege,
                resource: request.resource,
                created_by: ctx.identity().map(|identity| identity.id),
            },
        )
        .await?;
    Ok(grant.into())
}

async fn delete_grant(
    state: Arc<ApiState>,
    ctx: RequestContext,
    request: ResourceId,
) -> Result<(), ApiError> {
    let mut txn = require_infra_role(&ctx, ADMIN_ROLES)
        .await
        .map_err(|err| handle_auth_err(err, "grant", "delete", ADMIN_ROLES))?;
    state.grants.delete(&mut *txn, request.id).await?;
    Ok(())
}
