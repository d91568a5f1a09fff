//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Access key endpoints, including the shapes served to older clients."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use warden_security::validate::validate_name;
use warden_security::{
    handle_auth_err, has_authorization, require_infra_role, AccessKey, DataError,
    DeleteAccessKeys, ListAccessKeys, NewAccessKey, RequestContext, Uid, ValidationError,
    ROLE_ADMIN, ROLE_VIEW,
};
use warden_versioning::{Migration, Version};

use super::{is_self, ListResponse, PageQuery, ResourceId};
use crate::error::ApiError;
use crate::routes::{wrap, ApiBuilder, ApiRequest, Route};
use crate::ApiState;

const PATH: &str = "/api/access-keys";
const PATH_BY_ID: &str = "/api/access-keys/:id";
const LIST_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_VIEW];
const MANAGE_ROLES: &[&str] = &[ROLE_ADMIN];

pub fn register(api: &mut ApiBuilder) {
    api.add(
        Route::get(PATH, wrap(list_access_keys))
            .summary("List access keys")
            .tag("access keys"),
    )
    .add(
        Route::post(PATH, wrap(create_access_key))
            .summary("Create an access key")
            .tag("access keys"),
    )
    .add(
        Route::delete(PATH_BY_ID, wrap(delete_access_key))
            .summary("Revoke an access key")
            .tag("access keys"),
    )
    .version_override(
        Method::GET,
        PATH,
        Version::new(0, 13, 0),
        wrap(list_access_keys_v0_13),
    )
    .migration(
        Migration::new("POST", PATH, Version::new(0, 14, 0))
            .rewrite_request(|body| rename_field(body, "ttl", "ttlSeconds"))
            .rewrite_response(|body| rename_field(body, "expiresAt", "expires")),
    );
}

fn rename_field(body: &mut Value, from: &str, to: &str) {
    if let Some(object) = body.as_object_mut() {
        if let Some(value) = object.remove(from) {
            object.insert(to.to_owned(), value);
        }
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAccessKeysRequest {
    #[serde(rename = "user_id")]
    pub user_id: Option<Uid>,
    pub name: Option<String>,
    #[serde(default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub show_expired: bool,
    #[serde(flatten)]
    pub page: PageQuery,
}

impl ApiRequest for ListAccessKeysRequest {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyView {
    pub id: Uid,
    pub name: String,
    pub created: DateTime<Utc>,
    pub issued_for: Uid,
    pub issued_for_name: String,
    #[serde(rename = "providerID")]
    pub provider_id: Uid,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_deadline: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl AccessKeyView {
    fn new(key: AccessKey, issued_for_name: String) -> Self {
        Self {
            id: key.id,
            name: key.name,
            created: key.created_at,
            issued_for: key.issued_for,
            issued_for_name,
            provider_id: key.provider_id,
            expires_at: key.expires_at,
            extension_deadline: key.extension_deadline,
            scopes: key.scopes,
        }
    }
}

/// Item shape served to clients at or below 0.13.0.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAccessKeyView {
    pub id: Uid,
    pub name: String,
    pub created: DateTime<Utc>,
    pub issued_for: Uid,
    pub issued_for_name: String,
    #[serde(rename = "providerID")]
    pub provider_id: Uid,
    pub expires: DateTime<Utc>,
    pub extension_deadline: Option<DateTime<Utc>>,
}

impl From<AccessKeyView> for LegacyAccessKeyView {
    fn from(view: AccessKeyView) -> Self {
        Self {
            id: view.id,
            name: view.name,
            created: view.created,
            issued_for: view.issued_for,
            issued_for_name: view.issued_for_name,
            provider_id: view.provider_id,
            expires: view.expires_at,
            extension_deadline: view.extension_deadline,
        }
    }
}

async fn list_access_keys(
    state: Arc<ApiState>,
    ctx: RequestContext,
    request: ListAccessKeysRequest,
) -> Result<ListResponse<AccessKeyView>, ApiError> {
    fetch_access_keys(&state, &ctx, request).await
}

async fn list_access_keys_v0_13(
    state: Arc<ApiState>,
    ctx: RequestContext,
    request: ListAccessKeysRequest,
) -> Result<ListResponse<LegacyAccessKeyView>, ApiError> {
    let current = fetch_access_keys(&state, &ctx, request).await?;
    Ok(ListResponse {
        items: current.items.into_iter().map(Into::into).collect(),
        count: current.count,
        page: current.page,
        limit: current.limit,
        total_count: current.total_count,
        total_pages: current.total_pages,
    })
}

/// Callers may always list their own keys; listing anyone else's needs a role.
async fn fetch_access_keys(
    state: &ApiState,
    ctx: &RequestContext,
    request: ListAccessKeysRequest,
) -> Result<ListResponse<AccessKeyView>, ApiError> {
    let mut txn = match request.user_id {
        Some(user_id) => has_authorization(ctx, user_id, is_self, LIST_ROLES).await,
        None => require_infra_role(ctx, LIST_ROLES).await,
    }
    .map_err(|err| handle_auth_err(err, "access keys", "list", LIST_ROLES))?;

    let pagination = request.page.pagination();
    let page = state
        .access_keys
        .list(
            &mut *txn,
            ListAccessKeys {
                issued_for: request.user_id,
                name: request.name,
                show_expired: request.show_expired,
                pagination,
            },
        )
        .await?;

    let mut names: HashMap<Uid, String> = HashMap::new();
    let mut items = Vec::with_capacity(page.items.len());
    for key in page.items {
        let name = match names.get(&key.issued_for) {
            Some(name) => name.clone(),
            None => {
                let name = match txn.get_identity(key.issued_for).await {
                    Ok(identity) => identity.name,
                    Err(err) if err.is_not_found() => String::new(),
                    Err(err) => return Err(err.into()),
                };
                names.insert(key.issued_for, name.clone());
                name
            }
        };
        items.push(AccessKeyView::new(key, name));
    }
    Ok(ListResponse::new(items, pagination, page.total_count))
}

/// Ten years.
const MAX_LIFETIME_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessKeyRequest {
    #[serde(rename = "userID")]
    pub user_id: Option<Uid>,
    #[serde(default)]
    pub name: String,
    pub ttl_seconds: Option<i64>,
    pub extension_deadline_seconds: Option<i64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ApiRequest for CreateAccessKeyRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.user_id.is_none() {
            return Err(ValidationError::required("userID"));
        }
        if !self.name.is_empty() {
            validate_name("name", &self.name)?;
        }
        for (field, seconds) in [
            ("ttlSeconds", self.ttl_seconds),
            ("extensionDeadlineSeconds", self.extension_deadline_seconds),
        ] {
            if let Some(seconds) = seconds {
                if seconds < 0 || seconds > MAX_LIFETIME_SECONDS {
                    return Err(ValidationError::field(
                        field,
                        format!("must be between 0 and {MAX_LIFETIME_SECONDS} seconds"),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessKeyResponse {
    pub id: Uid,
    pub created: DateTime<Utc>,
    pub name: String,
    pub issued_for: Uid,
    #[serde(rename = "providerID")]
    pub provider_id: Uid,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_deadline: Option<DateTime<Utc>>,
    /// The full credential. Returned once and never stored.
    pub access_key: String,
}

async fn create_access_key(
    state: Arc<ApiState>,
    ctx: RequestContext,
    request: CreateAccessKeyRequest,
) -> Result<CreateAccessKeyResponse, ApiError> {
    let user_id = request
        .user_id
        .ok_or_else(|| ValidationError::required("userID"))?;
    let mut txn = has_authorization(&ctx, user_id, is_self, MANAGE_ROLES)
        .await
        .map_err(|err| handle_auth_err(err, "access key", "create", MANAGE_ROLES))?;

    let provider = txn.native_provider().await?;
    let issued = state
        .access_keys
        .create(
            &mut *txn,
            NewAccessKey {
                name: Some(request.name).filter(|name| !name.is_empty()),
                issued_for: Some(user_id),
                provider_id: Some(provider.id),
                ttl: request.ttl_seconds.and_then(Duration::try_seconds),
                extension: request
                    .extension_deadline_seconds
                    .and_then(Duration::try_seconds),
                scopes: request.scopes,
                ..Default::default()
            },
        )
        .await?;

    let key = issued.key;
    Ok(CreateAccessKeyResponse {
        id: key.id,
        created: key.created_at,
        name: key.name,
        issued_for: key.issued_for,
        provider_id: key.provider_id,
        expires_at: key.expires_at,
        extension_deadline: key.extension_deadline,
        access_key: issued.credential,
    })
}

async fn owns_access_key(ctx: RequestContext, id: Uid) -> Result<bool, DataError> {
    let Some(caller) = ctx.identity().map(|identity| identity.id) else {
        return Ok(false);
    };
    let mut txn = ctx.txn.lock().await?;
    match txn.get_access_key(id).await {
        Ok(key) => Ok(key.issued_for == caller),
        Err(err) if err.is_not_found() => Ok(false),
        Err(err) => Err(err),
    }
}

async fn delete_access_key(
    state: Arc<ApiState>,
    ctx: RequestContext,
    request: ResourceId,
) -> Result<(), ApiError> {
    let mut txn = has_authorization(&ctx, request.id, owns_access_key, MANAGE_ROLES)
        .await
        .map_err(|err| handle_auth_err(err, "access key", "delete", MANAGE_ROLES))?;
    let deleted = state
        .access_keys
        .delete(
            &mut *txn,
            DeleteAccessKeys {
                by_id: Some(request.id),
                ..Default::default()
            },
        )
        .await?;
    if deleted == 0 {
        return Err(DataError::NotFound("access key").into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_request_decodes_query_strings() {
        let request: ListAccessKeysRequest = serde_json::from_value(json!({
            "user_id": "42",
            "showExpired": "true",
            "page": "2",
        }))
        .unwrap();
        assert_eq!(request.user_id, Uid::from_raw(42));
        assert!(request.show_expired);
        assert_eq!(request.page.page, Some(2));
    }

    #[test]
    fn create_request_validates_name() {
        let request: CreateAccessKeyRequest = serde_json::from_value(json!({
            "userID": "7",
            "name": "this-name-should-not-contain-slash/",
        }))
        .unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(err.field_errors[0].field_name, "name");
        assert_eq!(
            err.field_errors[0].errors,
            vec!["character '/' at position 34 is not allowed"]
        );

        let missing: CreateAccessKeyRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(
            missing.validate().unwrap_err().field_errors[0].field_name,
            "userID"
        );
    }

    #[test]
    fn create_request_bounds_lifetimes() {
        let request: CreateAccessKeyRequest = serde_json::from_value(json!({
            "userID": "7",
            "ttlSeconds": i64::MAX,
        }))
        .unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(err.field_errors[0].field_name, "ttlSeconds");

        let request: CreateAccessKeyRequest = serde_json::from_value(json!({
            "userID": "7",
            "ttlSeconds": 3600,
            "extensionDeadlineSeconds": i64::MIN,
        }))
        .unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(err.field_errors[0].field_name, "extensionDeadlineSeconds");

        let request: CreateAccessKeyRequest = serde_json::from_value(json!({
            "userID": "7",
            "ttlSeconds": MAX_LIFETIME_SECONDS,
            "extensionDeadlineSeconds": 0,
        }))
        .unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn legacy_migration_renames_fields() {
        let mut request = json!({"ttl": 60});
        rename_field(&mut request, "ttl", "ttlSeconds");
        assert_eq!(request, json!({"ttlSeconds": 60}));

        let mut untouched = json!([1, 2]);
        rename_field(&mut untouched, "ttl", "ttlSeconds");
        assert_eq!(untouched, json!([1, 2]));
    }
}
