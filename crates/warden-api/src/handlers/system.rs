//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Health, version and API document endpoints plus removed routes."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use warden_security::RequestContext;
use warden_versioning::Version;

use crate::error::ApiError;
use crate::routes::{wrap, ApiBuilder, EmptyRequest, Route};
use crate::ApiState;

pub fn register(api: &mut ApiBuilder) {
    api.add(
        Route::get("/healthz", wrap(healthz))
            .public()
            .omit_from_docs(),
    )
    .add(
        Route::get("/api/version", wrap(version))
            .public()
            .summary("Server version")
            .tag("system"),
    )
    .add(
        Route::get("/api/openapi.json", wrap(openapi))
            .public()
            .omit_from_docs(),
    )
    .removed("/v1/machines", Version::new(0, 9, 0))
    .removed("/v1/setup", Version::new(0, 11, 0))
    .removed("/v1/introspect", Version::new(0, 12, 0));
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

async fn healthz(
    _: Arc<ApiState>,
    _: RequestContext,
    _: EmptyRequest,
) -> Result<HealthResponse, ApiError> {
    Ok(HealthResponse { status: "ok" })
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
}

async fn version(
    state: Arc<ApiState>,
    _: RequestContext,
    _: EmptyRequest,
) -> Result<VersionResponse, ApiError> {
    Ok(VersionResponse {
        version: state.version_info.semver.clone(),
    })
}

async fn openapi(
    state: Arc<ApiState>,
    _: RequestContext,
    _: EmptyRequest,
) -> Result<Value, ApiError> {
    Ok(state.openapi.clone())
}
