//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Versioned REST API for access keys and grants."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use warden_security::{AccessKeys, Grants, OrganizationId, Store};
use warden_versioning::{MissingVersionPolicy, VersionInfo};

pub mod authn;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod server;

pub use error::{ApiError, ErrorResponse};
pub use routes::{wrap, ApiBuilder, ApiRequest, Handler, Route};
pub use server::{spawn_api_server, ApiServer};

/// Shared API state exposed to handlers.
pub struct ApiState {
    pub store: Arc<dyn Store>,
    pub organization_id: OrganizationId,
    pub access_keys: AccessKeys,
    pub grants: Grants,
    pub policy: MissingVersionPolicy,
    pub version_info: VersionInfo,
    /// Rendered OpenAPI document.
    pub openapi: Value,
}

/// Everything the router needs from the daemon.
pub struct ApiServices {
    pub store: Arc<dyn Store>,
    pub organization_id: OrganizationId,
    pub access_keys: AccessKeys,
    pub grants: Grants,
    pub policy: MissingVersionPolicy,
    pub request_timeout: Duration,
}

/// Builder with every endpoint of this build registered.
pub fn api_builder() -> ApiBuilder {
    let mut api = ApiBuilder::new();
    handlers::register(&mut api);
    api
}

pub fn openapi_document(version_info: &VersionInfo) -> utoipa::openapi::OpenApi {
    openapi::document(&api_builder(), version_info)
}

pub fn build_router(services: ApiServices) -> Router {
    router_with(api_builder(), services)
}

fn router_with(api: ApiBuilder, services: ApiServices) -> Router {
    let version_info = VersionInfo::current();
    let openapi = serde_json::to_value(openapi::document(&api, &version_info))
        .unwrap_or(Value::Null);
    let state = Arc::new(ApiState {
        store: services.store,
        organization_id: services.organization_id,
        access_keys: services.access_keys,
        grants: services.grants,
        policy: services.policy,
        version_info,
        openapi,
    });
    api.into_router(state)
        .layer(TimeoutLayer::new(services.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}

/// A panicking handler answers 500 and the connection stays usable.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}
