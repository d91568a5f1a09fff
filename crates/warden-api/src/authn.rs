//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Bearer access key authentication for API requests."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use axum::http::{header, HeaderMap};
use warden_logging::{log_security_event, LogContext, SecurityOutcome};
use warden_security::{Authenticated, ErrorKind, RequestContext};

use crate::error::ApiError;
use crate::ApiState;

/// Credential from an `Authorization: Bearer <key>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Resolve the caller inside the request transaction. Every credential
/// problem collapses into the same 401 so callers cannot enumerate key ids.
pub async fn authenticate(
    state: &ApiState,
    ctx: &RequestContext,
    headers: &HeaderMap,
) -> Result<Authenticated, ApiError> {
    let organization = ctx.organization_id.to_string();
    let log_ctx = LogContext::new().with_organization(&organization);
    let deny = |reason: &str| {
        log_security_event(
            Some(&log_ctx),
            "authn.access_key",
            reason,
            SecurityOutcome::Denied,
        );
        ApiError::unauthorized()
    };

    let credential = bearer_token(headers).ok_or_else(|| deny("missing bearer credential"))?;
    let mut txn = ctx.txn.lock().await?;
    let key = match state.access_keys.validate(&mut *txn, credential).await {
        Ok(key) => key,
        Err(err) if err.kind() == ErrorKind::Internal => return Err(ApiError::internal(err)),
        Err(err) => return Err(deny(&err.to_string())),
    };
    if key.organization_id != ctx.organization_id {
        return Err(deny("access key belongs to another organization"));
    }
    let identity = match txn.get_identity(key.issued_for).await {
        Ok(identity) => identity,
        Err(err) if err.is_not_found() => return Err(deny("identity for access key not found")),
        Err(err) => return Err(err.into()),
    };

    let subject = identity.poly_id().to_string();
    log_security_event(
        Some(&log_ctx.clone().with_identity(&subject)),
        "authn.access_key",
        &format!("authenticated with key {}", key.key_id),
        SecurityOutcome::Allowed,
    );
    Ok(Authenticated {
        identity,
        access_key: Some(key),
    })
}
