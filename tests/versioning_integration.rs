//! ---
//! warden_section: "15-testing-qa-runbook"
//! warden_subsection: "integration-tests"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Version negotiation from config through route dispatch and migrations."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fs;

use serde_json::{json, Value};
use tempfile::tempdir;
use warden_common::AppConfig;
use warden_versioning::{
    parse_requested_version, substitute_params, Migration, MissingVersionPolicy,
    RouteRegistryBuilder, Version, VersionInfo,
};

fn v(raw: &str) -> Version {
    Version::parse(raw).unwrap()
}

#[test]
fn legacy_default_from_config_file_serves_headerless_clients() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.toml");
    fs::write(
        &path,
        r#"
[server]
listen = "127.0.0.1:0"

[versioning]
legacy_default = "0.12.0"
"#,
    )
    .unwrap();

    let loaded = AppConfig::load_with_source(&[path.clone()]).unwrap();
    assert_eq!(loaded.source, path);
    let policy = MissingVersionPolicy::from_config(&loaded.config.versioning);
    assert_eq!(policy, MissingVersionPolicy::AssumeLegacy(v("0.12.0")));
    assert_eq!(parse_requested_version(None, &policy).unwrap(), v("0.12.0"));
    assert_eq!(
        parse_requested_version(Some("0.14.1"), &policy).unwrap(),
        v("0.14.1")
    );

    let strict = MissingVersionPolicy::from_config(&Default::default());
    assert!(parse_requested_version(None, &strict).is_err());
    let err = parse_requested_version(Some("latest"), &strict).unwrap_err();
    assert!(err.to_string().starts_with("invalid Warden-Version header"));
}

#[test]
fn overrides_and_migrations_compose_by_requested_version() {
    let mut builder = RouteRegistryBuilder::new();
    builder.add_version("GET", "/api/things", v("0.13.0"), "v0.13");
    builder.add_version("GET", "/api/things", v("0.10.0"), "v0.10");
    builder.add_migration(
        Migration::new("GET", "/api/things", v("0.11.0"))
            .rewrite_response(|body| append(body, "0.11")),
    );
    builder.add_migration(
        Migration::new("GET", "/api/things", v("0.14.0"))
            .rewrite_response(|body| append(body, "0.14")),
    );
    let registry = builder.build();

    let dispatch = |requested: &str| {
        registry
            .handler_for_version("GET", "/api/things", &v(requested))
            .copied()
            .unwrap_or("current")
    };
    assert_eq!(dispatch("0.9.0"), "v0.10");
    assert_eq!(dispatch("0.10.0"), "v0.10");
    assert_eq!(dispatch("0.12.5"), "v0.13");
    assert_eq!(dispatch("0.14.0"), "current");

    let mut body = json!({ "applied": [] });
    registry.rewrite_response("GET", "/api/things", &v("0.10.0"), &mut body);
    assert_eq!(body["applied"], json!(["0.11", "0.14"]));

    let mut body = json!({ "applied": [] });
    registry.rewrite_response("GET", "/api/things", &v("0.14.0"), &mut body);
    assert_eq!(body["applied"], json!([]));
}

#[test]
fn renamed_routes_redirect_with_parameters() {
    let mut builder = RouteRegistryBuilder::<()>::new();
    builder.add_migration(
        Migration::new("GET", "/api/grants?user=:id", v("0.12.0"))
            .renamed_from("/v1/identities/:id/grants"),
    );
    let registry = builder.build();

    let redirect = registry
        .redirects_for("get", "/v1/identities/:id/grants")
        .next()
        .unwrap();
    let params = HashMap::from([("id".to_owned(), "77".to_owned())]);
    assert_eq!(substitute_params(&redirect.to, &params), "/api/grants?user=77");
    assert!(registry.redirects_for("POST", "/v1/identities/:id/grants").next().is_none());
}

#[test]
fn build_reports_a_protocol_version() {
    let info = VersionInfo::current();
    assert_eq!(info.protocol_version().to_string(), info.semver);
    assert!(info.banner().contains(&info.semver));
}

fn append(body: &mut Value, marker: &str) {
    if let Some(applied) = body["applied"].as_array_mut() {
        applied.push(json!(marker));
    }
}
