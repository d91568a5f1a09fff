//! ---
//! warden_section: "15-testing-qa-runbook"
//! warden_subsection: "integration-tests"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "End-to-end HTTP coverage against a spawned API server."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{redirect, Client, Method, StatusCode};
use serde_json::{json, Value};
use warden_api::{build_router, spawn_api_server, ApiServer, ApiServices};
use warden_common::{AppConfig, ManualClock};
use warden_security::{bootstrap, AccessKeys, Grants, MemoryStore, Store};
use warden_versioning::{MissingVersionPolicy, VERSION_HEADER};

const ADMIN_KEY: &str = "aaaaaaaaaa.bbbbbbbbbbbbbbbbbbbbbbbb";
const VIEWER_KEY: &str = "cccccccccc.dddddddddddddddddddddddd";
const CURRENT: &str = "0.14.0";

const BOOTSTRAP: &str = r#"
[[bootstrap.identities]]
name = "admin@example.com"
roles = ["admin"]
access_key = "aaaaaaaaaa.bbbbbbbbbbbbbbbbbbbbbbbb"

[[bootstrap.identities]]
name = "viewer@example.com"
roles = ["view"]
access_key = "cccccccccc.dddddddddddddddddddddddd"
"#;

struct Harness {
    server: ApiServer,
    client: Client,
}

impl Harness {
    async fn start() -> Self {
        let config: AppConfig = BOOTSTRAP.parse().unwrap();
        let store = Arc::new(MemoryStore::new());
        let org = store.create_organization("default").await.unwrap().id;
        let clock = Arc::new(ManualClock::default());
        let access_keys = AccessKeys::new(clock.clone(), chrono::Duration::hours(12));
        let grants = Grants::new(clock);
        let mut tx = store.begin(org).await.unwrap();
        bootstrap::apply(tx.as_mut(), &config.bootstrap, &access_keys, &grants)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let router = build_router(ApiServices {
            store,
            organization_id: org,
            access_keys,
            grants,
            policy: MissingVersionPolicy::Reject,
            request_timeout: Duration::from_secs(5),
        });
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = spawn_api_server(router, addr).unwrap();
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .unwrap();
        Self { server, client }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.server.addr(), path)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        key: Option<&str>,
        version: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(key) = key {
            request = request.bearer_auth(key);
        }
        if let Some(version) = version {
            request = request.header(VERSION_HEADER, version);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        let bytes = response.bytes().await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// Identity id behind the bootstrap key named `name`.
    async fn identity_id(&self, name: &str) -> String {
        let (status, body) = self
            .call(Method::GET, "/api/access-keys", Some(ADMIN_KEY), Some(CURRENT), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        body["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|item| item["issuedForName"] == name)
            .and_then(|item| item["issuedFor"].as_str())
            .unwrap()
            .to_owned()
    }
}

#[tokio::test]
async fn version_header_is_required_on_versioned_routes() {
    let harness = Harness::start().await;

    let (status, body) = harness
        .call(Method::GET, "/api/access-keys", Some(ADMIN_KEY), None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Warden-Version header is required");

    let (status, body) = harness
        .call(Method::GET, "/api/access-keys", Some(ADMIN_KEY), Some("0.12.3"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["items"][0].get("expires").is_some());

    let (status, body) = harness.call(Method::GET, "/api/version", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], CURRENT);

    harness.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn access_key_lifecycle_over_http() {
    let harness = Harness::start().await;
    let admin_id = harness.identity_id("admin@example.com").await;

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/access-keys",
            Some(ADMIN_KEY),
            Some(CURRENT),
            Some(json!({ "userID": admin_id, "name": "this-name-should-not-contain-slash/" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fieldErrors"][0]["fieldName"], "name");
    assert_eq!(
        body["fieldErrors"][0]["errors"][0],
        "character '/' at position 34 is not allowed"
    );

    let (status, created) = harness
        .call(
            Method::POST,
            "/api/access-keys",
            Some(ADMIN_KEY),
            Some(CURRENT),
            Some(json!({ "userID": admin_id, "ttlSeconds": 3600 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["name"]
        .as_str()
        .unwrap()
        .starts_with("admin@example.com-"));
    assert!(created.get("expiresAt").is_some());
    let credential = created["accessKey"].as_str().unwrap().to_owned();
    let id = created["id"].as_str().unwrap().to_owned();

    let (status, _) = harness
        .call(Method::GET, "/api/grants", Some(&credential), Some(CURRENT), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = harness
        .call(
            Method::DELETE,
            &format!("/api/access-keys/{id}"),
            Some(ADMIN_KEY),
            Some(CURRENT),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = harness
        .call(Method::GET, "/api/grants", Some(&credential), Some(CURRENT), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "unauthorized");

    let (status, _) = harness
        .call(
            Method::DELETE,
            &format!("/api/access-keys/{id}"),
            Some(ADMIN_KEY),
            Some(CURRENT),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    harness.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn older_clients_create_keys_with_the_old_field_names() {
    let harness = Harness::start().await;
    let admin_id = harness.identity_id("admin@example.com").await;

    let (status, created) = harness
        .call(
            Method::POST,
            "/api/access-keys",
            Some(ADMIN_KEY),
            Some("0.13.0"),
            Some(json!({ "userID": admin_id, "name": "legacy-client", "ttl": 60 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "legacy-client");
    assert!(created.get("expires").is_some());
    assert!(created.get("expiresAt").is_none());

    let created_at = chrono::DateTime::parse_from_rfc3339(created["created"].as_str().unwrap())
        .unwrap();
    let expires = chrono::DateTime::parse_from_rfc3339(created["expires"].as_str().unwrap())
        .unwrap();
    assert_eq!(expires - created_at, chrono::Duration::seconds(60));

    harness.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn viewers_manage_only_their_own_keys() {
    let harness = Harness::start().await;
    let admin_id = harness.identity_id("admin@example.com").await;
    let viewer_id = harness.identity_id("viewer@example.com").await;

    let (status, created) = harness
        .call(
            Method::POST,
            "/api/access-keys",
            Some(VIEWER_KEY),
            Some(CURRENT),
            Some(json!({ "userID": viewer_id, "name": "viewer-laptop" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["issuedFor"], viewer_id.as_str());

    let (status, body) = harness
        .call(
            Method::POST,
            "/api/access-keys",
            Some(VIEWER_KEY),
            Some(CURRENT),
            Some(json!({ "userID": admin_id })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["message"],
        "you do not have permission to create access key, requires role admin"
    );

    let (status, listed) = harness
        .call(
            Method::GET,
            &format!("/api/access-keys?user_id={viewer_id}"),
            Some(VIEWER_KEY),
            Some(CURRENT),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["totalCount"], 2);

    let id = created["id"].as_str().unwrap();
    let (status, _) = harness
        .call(
            Method::DELETE,
            &format!("/api/access-keys/{id}"),
            Some(VIEWER_KEY),
            Some(CURRENT),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    harness.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn renamed_and_removed_routes() {
    let harness = Harness::start().await;

    let response = harness
        .client
        .get(harness.url("/v1/identities/42/grants"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(
        response.headers()[reqwest::header::LOCATION],
        "/api/grants?user=42"
    );

    let (status, body) = harness
        .call(Method::GET, "/v1/machines", None, None, None)
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["message"], "removed in version 0.9.0");

    let addr = harness.server.addr();
    harness.server.shutdown().await.unwrap();
    assert!(Client::new()
        .get(format!("http://{addr}/healthz"))
        .send()
        .await
        .is_err());
}
