//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Route registration and the request wrapping contract."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
//! Every API route goes through the same wrapper: resolve the client's
//! version, open a transaction, authenticate, decode path + query + body into
//! the typed request, run the handler picked for that version and commit.
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, on, MethodFilter};
use axum::{Json, Router};
use futures::future::BoxFuture;
use semver::Version;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use warden_logging::{warden_debug, LogContext};
use warden_security::{RequestContext, ValidationError};
use warden_versioning::{
    parse_requested_version, substitute_params, Migration, RouteRegistry, RouteRegistryBuilder,
    VersionError, VERSION_HEADER,
};

use crate::authn::authenticate;
use crate::error::ApiError;
use crate::ApiState;

pub type HandlerFuture = BoxFuture<'static, Result<Value, ApiError>>;

/// Type-erased handler: takes the merged JSON input, returns the JSON output.
pub type Handler =
    Arc<dyn Fn(Arc<ApiState>, RequestContext, Value) -> HandlerFuture + Send + Sync>;

/// Typed request decoded from path parameters, query string and JSON body.
pub trait ApiRequest: DeserializeOwned + Send + 'static {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Request without parameters.
#[derive(Debug, Default, Deserialize)]
pub struct EmptyRequest {}

impl ApiRequest for EmptyRequest {}

/// Adapt a typed async handler to [`Handler`].
pub fn wrap<Req, Resp, F, Fut>(handler: F) -> Handler
where
    Req: ApiRequest,
    Resp: Serialize,
    F: Fn(Arc<ApiState>, RequestContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, ApiError>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(
        move |state: Arc<ApiState>, ctx: RequestContext, input: Value| -> HandlerFuture {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let request: Req = serde_path_to_error::deserialize(input)?;
                request.validate()?;
                let response = (*handler)(state, ctx, request).await?;
                let value = serde_json::to_value(response).map_err(ApiError::internal)?;
                Ok::<_, ApiError>(value)
            })
        },
    )
}

/// A route served by the current build.
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path: &'static str,
    pub summary: &'static str,
    pub tag: &'static str,
    pub authenticated: bool,
    pub versioned: bool,
    pub omit_from_docs: bool,
    handler: Handler,
}

impl Route {
    pub fn new(method: Method, path: &'static str, handler: Handler) -> Self {
        Self {
            method,
            path,
            summary: "",
            tag: "",
            authenticated: true,
            versioned: true,
            omit_from_docs: false,
            handler,
        }
    }

    pub fn get(path: &'static str, handler: Handler) -> Self {
        Self::new(Method::GET, path, handler)
    }

    pub fn post(path: &'static str, handler: Handler) -> Self {
        Self::new(Method::POST, path, handler)
    }

    pub fn put(path: &'static str, handler: Handler) -> Self {
        Self::new(Method::PUT, path, handler)
    }

    pub fn delete(path: &'static str, handler: Handler) -> Self {
        Self::new(Method::DELETE, path, handler)
    }

    pub fn summary(mut self, summary: &'static str) -> Self {
        self.summary = summary;
        self
    }

    pub fn tag(mut self, tag: &'static str) -> Self {
        self.tag = tag;
        self
    }

    /// No credential and no version header required.
    pub fn public(mut self) -> Self {
        self.authenticated = false;
        self.versioned = false;
        self
    }

    pub fn omit_from_docs(mut self) -> Self {
        self.omit_from_docs = true;
        self
    }

    /// Names of the `:param` segments in the path.
    pub fn path_params(&self) -> impl Iterator<Item = &'static str> {
        self.path
            .split('/')
            .filter_map(|segment| segment.strip_prefix(':'))
    }
}

/// Endpoint that no longer exists; every method answers 410.
#[derive(Debug, Clone)]
pub struct RemovedRoute {
    pub path: &'static str,
    pub version: Version,
}

#[derive(Default)]
pub struct ApiBuilder {
    routes: Vec<Route>,
    removed: Vec<RemovedRoute>,
    registry: RouteRegistryBuilder<Handler>,
}

impl ApiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, route: Route) -> &mut Self {
        self.routes.push(route);
        self
    }

    /// Serve `handler` instead of the current one to clients at or below `version`.
    pub fn version_override(
        &mut self,
        method: Method,
        path: &'static str,
        version: Version,
        handler: Handler,
    ) -> &mut Self {
        self.registry
            .add_version(method.as_str(), path, version, handler);
        self
    }

    pub fn migration(&mut self, migration: Migration) -> &mut Self {
        self.registry.add_migration(migration);
        self
    }

    pub fn removed(&mut self, path: &'static str, version: Version) -> &mut Self {
        self.removed.push(RemovedRoute { path, version });
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn removed_routes(&self) -> &[RemovedRoute] {
        &self.removed
    }

    pub fn into_router(self, state: Arc<ApiState>) -> Router {
        let registry = Arc::new(self.registry.build());
        let mut router: Router<Arc<ApiState>> = Router::new();

        for route in self.routes {
            let route = Arc::new(route);
            let filter = method_filter(&route.method);
            let path = route.path;
            let registry = Arc::clone(&registry);
            router = router.route(
                path,
                on(
                    filter,
                    move |State(state): State<Arc<ApiState>>,
                          params: Option<Path<HashMap<String, String>>>,
                          Query(query): Query<HashMap<String, String>>,
                          headers: HeaderMap,
                          body: Bytes| {
                        let route = Arc::clone(&route);
                        let registry = Arc::clone(&registry);
                        async move {
                            let params = params.map(|Path(p)| p).unwrap_or_default();
                            dispatch(state, &registry, &route, params, query, headers, body)
                                .await
                                .unwrap_or_else(IntoResponse::into_response)
                        }
                    },
                ),
            );
        }

        for redirect in registry.redirects() {
            let target = redirect.to.clone();
            router = router.route(
                &redirect.from,
                on(
                    method_filter(&parse_method(&redirect.method)),
                    move |params: Option<Path<HashMap<String, String>>>| {
                        let target = target.clone();
                        async move {
                            let params = params.map(|Path(p)| p).unwrap_or_default();
                            let location = substitute_params(&target, &params);
                            (StatusCode::PERMANENT_REDIRECT, [(header::LOCATION, location)])
                                .into_response()
                        }
                    },
                ),
            );
        }

        for removed in self.removed {
            let version = removed.version;
            router = router.route(
                removed.path,
                any(move || {
                    let version = version.clone();
                    async move { ApiError::gone(&version).into_response() }
                }),
            );
        }

        router.with_state(state)
    }
}

fn method_filter(method: &Method) -> MethodFilter {
    match *method {
        Method::POST => MethodFilter::POST,
        Method::PUT => MethodFilter::PUT,
        Method::PATCH => MethodFilter::PATCH,
        Method::DELETE => MethodFilter::DELETE,
        _ => MethodFilter::GET,
    }
}

fn parse_method(method: &str) -> Method {
    Method::from_bytes(method.as_bytes()).unwrap_or(Method::GET)
}

fn requested_version(
    state: &ApiState,
    route: &Route,
    headers: &HeaderMap,
) -> Result<Version, VersionError> {
    if !route.versioned {
        return Ok(state.version_info.protocol_version());
    }
    let header = match headers.get(VERSION_HEADER) {
        Some(value) => Some(value.to_str().map_err(|err| VersionError::Invalid {
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            reason: err.to_string(),
        })?),
        None => None,
    };
    parse_requested_version(header, &state.policy)
}

/// Merge the body, query string and path parameters into one object. Path
/// parameters win over query values, which win over body fields.
fn merge_input(
    body: &Bytes,
    query: HashMap<String, String>,
    params: HashMap<String, String>,
) -> Result<Value, ApiError> {
    let mut input = if body.is_empty() {
        Map::new()
    } else {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(ApiError::bad_request("request body must be a JSON object")),
            Err(err) => return Err(ApiError::bad_request(format!("invalid JSON body: {err}"))),
        }
    };
    for (key, value) in query.into_iter().chain(params) {
        input.insert(key, Value::String(value));
    }
    Ok(Value::Object(input))
}

async fn dispatch(
    state: Arc<ApiState>,
    registry: &RouteRegistry<Handler>,
    route: &Route,
    params: HashMap<String, String>,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let method = route.method.as_str();
    let requested = requested_version(&state, route, &headers)?;
    let mut input = merge_input(&body, query, params)?;
    registry.rewrite_request(method, route.path, &requested, &mut input);

    let txn = state.store.begin(state.organization_id).await?;
    let mut ctx = RequestContext::new(state.organization_id, txn);
    if route.authenticated {
        let authenticated = authenticate(&state, &ctx, &headers).await?;
        ctx = ctx.with_authenticated(authenticated);
    }

    let organization = state.organization_id.to_string();
    let log_ctx = LogContext::new()
        .with_organization(&organization)
        .with_route(method, route.path);
    warden_debug!(context = log_ctx, "serving version {requested}");

    let handler = registry
        .handler_for_version(method, route.path, &requested)
        .unwrap_or(&route.handler);
    match (**handler)(Arc::clone(&state), ctx.clone(), input).await {
        Ok(mut output) => {
            registry.rewrite_response(method, route.path, &requested, &mut output);
            ctx.txn.commit().await?;
            Ok(respond(&route.method, output))
        }
        Err(err) => {
            ctx.txn.rollback().await;
            Err(err)
        }
    }
}

fn respond(method: &Method, output: Value) -> Response {
    match *method {
        Method::POST => (StatusCode::CREATED, Json(output)).into_response(),
        Method::DELETE => StatusCode::NO_CONTENT.into_response(),
        _ => (StatusCode::OK, Json(output)).into_response(),
    }
}
