//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "OpenAPI 3 document generated from the registered routes."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use axum::http::Method;
use utoipa::openapi::path::{
    OperationBuilder, ParameterBuilder, ParameterIn, PathItemBuilder, PathItemType,
};
use utoipa::openapi::schema::{ObjectBuilder, Schema, SchemaType};
use utoipa::openapi::{
    InfoBuilder, OpenApi, OpenApiBuilder, PathsBuilder, RefOr, Required, ResponseBuilder,
};
use warden_versioning::{VersionInfo, VERSION_HEADER};

use crate::routes::{ApiBuilder, Route};

/// Document every route not marked `omit_from_docs`.
pub fn document(api: &ApiBuilder, version: &VersionInfo) -> OpenApi {
    let mut by_path: BTreeMap<String, PathItemBuilder> = BTreeMap::new();
    for route in api.routes().iter().filter(|route| !route.omit_from_docs) {
        let Some(item_type) = path_item_type(&route.method) else {
            continue;
        };
        let path = openapi_path(route.path);
        let item = by_path
            .remove(&path)
            .unwrap_or_else(PathItemBuilder::new)
            .operation(item_type, operation(route));
        by_path.insert(path, item);
    }

    let paths = by_path
        .into_iter()
        .fold(PathsBuilder::new(), |paths, (path, item)| {
            paths.path(path, item.build())
        });
    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title("Warden API")
                .version(version.semver.clone())
                .build(),
        )
        .paths(paths.build())
        .build()
}

fn operation(route: &Route) -> OperationBuilder {
    let mut operation = OperationBuilder::new()
        .operation_id(Some(operation_id(route)))
        .response(
            success_code(&route.method),
            RefOr::T(ResponseBuilder::new().description("Success").build()),
        );
    if !route.summary.is_empty() {
        operation = operation.summary(Some(route.summary));
    }
    if !route.tag.is_empty() {
        operation = operation.tag(route.tag);
    }
    for name in route.path_params() {
        operation = operation.parameter(
            ParameterBuilder::new()
                .name(name)
                .parameter_in(ParameterIn::Path)
                .required(Required::True)
                .schema(Some(string_schema()))
                .build(),
        );
    }
    if route.versioned {
        operation = operation
            .parameter(
                ParameterBuilder::new()
                    .name(VERSION_HEADER)
                    .parameter_in(ParameterIn::Header)
                    .required(Required::True)
                    .description(Some("Protocol version the client was built against"))
                    .schema(Some(string_schema()))
                    .build(),
            )
            .response(
                "400",
                RefOr::T(ResponseBuilder::new().description("Bad request").build()),
            );
    }
    if route.authenticated {
        operation = operation
            .response(
                "401",
                RefOr::T(ResponseBuilder::new().description("Unauthorized").build()),
            )
            .response(
                "403",
                RefOr::T(ResponseBuilder::new().description("Forbidden").build()),
            );
    }
    operation
}

fn string_schema() -> RefOr<Schema> {
    RefOr::T(Schema::Object(
        ObjectBuilder::new().schema_type(SchemaType::String).build(),
    ))
}

fn path_item_type(method: &Method) -> Option<PathItemType> {
    match *method {
        Method::GET => Some(PathItemType::Get),
        Method::POST => Some(PathItemType::Post),
        Method::PUT => Some(PathItemType::Put),
        Method::PATCH => Some(PathItemType::Patch),
        Method::DELETE => Some(PathItemType::Delete),
        _ => None,
    }
}

fn success_code(method: &Method) -> &'static str {
    match *method {
        Method::POST => "201",
        Method::DELETE => "204",
        _ => "200",
    }
}

/// `/api/access-keys/:id` becomes `/api/access-keys/{id}`.
pub fn openapi_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn operation_id(route: &Route) -> String {
    let path = route
        .path
        .trim_start_matches('/')
        .replace(['/', '-', '.'], "_")
        .replace(':', "by_");
    format!("{}_{}", route.method.as_str().to_ascii_lowercase(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers;

    #[test]
    fn converts_path_parameters() {
        assert_eq!(openapi_path("/api/grants/:id"), "/api/grants/{id}");
        assert_eq!(openapi_path("/api/grants"), "/api/grants");
    }

    #[test]
    fn documents_registered_routes() {
        let mut api = ApiBuilder::new();
        handlers::register(&mut api);
        let doc = serde_json::to_value(document(&api, &VersionInfo::current())).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/api/access-keys"));
        assert!(paths.contains_key("/api/access-keys/{id}"));
        assert!(paths.contains_key("/api/grants/{id}"));
        assert!(!paths.contains_key("/healthz"));
        assert!(doc["paths"]["/api/access-keys"]["post"]["responses"]
            .get("201")
            .is_some());
        assert_eq!(
            doc["paths"]["/api/grants/{id}"]["delete"]["operationId"],
            "delete_api_grants_by_id"
        );
    }
}
