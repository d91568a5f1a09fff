//! ---
//! warden_section: "14-versioning"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Versioned route registry: handler overrides, payload migrations and redirects."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
//! Every route has a current handler owned by the transport. The registry only
//! records older shapes: a list of `(version, handler)` overrides per route and
//! a list of migrations. It is built once at startup and read-only afterwards.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use semver::Version;
use serde_json::Value;

/// Mutates a JSON payload in place.
pub type Rewrite = Arc<dyn Fn(&mut Value) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: String,
    pub path: String,
}

impl RouteKey {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_owned(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A change made to a route in `version`. Clients older than `version` get
/// their payloads rewritten to and from the current shape.
#[derive(Clone)]
pub struct Migration {
    pub method: String,
    /// Current path template.
    pub path: String,
    pub version: Version,
    /// Path template the route was served under before `version`.
    pub renamed_from: Option<String>,
    pub request_rewrite: Option<Rewrite>,
    pub response_rewrite: Option<Rewrite>,
}

impl Migration {
    pub fn new(method: &str, path: &str, version: Version) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_owned(),
            version,
            renamed_from: None,
            request_rewrite: None,
            response_rewrite: None,
        }
    }

    pub fn renamed_from(mut self, old_path: &str) -> Self {
        self.renamed_from = Some(old_path.to_owned());
        self
    }

    pub fn rewrite_request(
        mut self,
        rewrite: impl Fn(&mut Value) + Send + Sync + 'static,
    ) -> Self {
        self.request_rewrite = Some(Arc::new(rewrite));
        self
    }

    pub fn rewrite_response(
        mut self,
        rewrite: impl Fn(&mut Value) + Send + Sync + 'static,
    ) -> Self {
        self.response_rewrite = Some(Arc::new(rewrite));
        self
    }

    /// Hooks run only for clients older than the migration.
    pub fn applies_to(&self, requested: &Version) -> bool {
        requested < &self.version
    }

    fn key(&self) -> RouteKey {
        RouteKey::new(&self.method, self.path.split('?').next().unwrap_or_default())
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("version", &self.version.to_string())
            .field("renamed_from", &self.renamed_from)
            .field("request_rewrite", &self.request_rewrite.is_some())
            .field("response_rewrite", &self.response_rewrite.is_some())
            .finish()
    }
}

/// Permanent redirect from a deprecated path template to its replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub method: String,
    pub from: String,
    pub to: String,
}

#[derive(Clone)]
pub struct RouteRegistryBuilder<H> {
    versions: HashMap<RouteKey, Vec<(Version, H)>>,
    migrations: Vec<Migration>,
}

impl<H> Default for RouteRegistryBuilder<H> {
    fn default() -> Self {
        Self {
            versions: HashMap::new(),
            migrations: Vec::new(),
        }
    }
}

impl<H> RouteRegistryBuilder<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `handler` to clients at or below `version`.
    pub fn add_version(&mut self, method: &str, path: &str, version: Version, handler: H) {
        let entries = self.versions.entry(RouteKey::new(method, path)).or_default();
        let position = entries.partition_point(|(existing, _)| existing <= &version);
        entries.insert(position, (version, handler));
    }

    pub fn add_migration(&mut self, migration: Migration) {
        self.migrations.push(migration);
    }

    pub fn build(self) -> RouteRegistry<H> {
        let redirects = self
            .migrations
            .iter()
            .filter_map(|m| {
                m.renamed_from.as_ref().map(|from| Redirect {
                    method: m.method.clone(),
                    from: from.clone(),
                    to: m.path.clone(),
                })
            })
            .collect();
        RouteRegistry {
            versions: self.versions,
            migrations: self.migrations,
            redirects,
        }
    }
}

/// Immutable after [`RouteRegistryBuilder::build`]; safe to share across requests.
pub struct RouteRegistry<H> {
    versions: HashMap<RouteKey, Vec<(Version, H)>>,
    migrations: Vec<Migration>,
    redirects: Vec<Redirect>,
}

impl<H> RouteRegistry<H> {
    /// Oldest override whose version is not below `requested`. `None` means
    /// the current handler serves the request.
    pub fn handler_for_version(
        &self,
        method: &str,
        path: &str,
        requested: &Version,
    ) -> Option<&H> {
        self.versions
            .get(&RouteKey::new(method, path))?
            .iter()
            .find(|(version, _)| version >= requested)
            .map(|(_, handler)| handler)
    }

    pub fn versions_for(&self, method: &str, path: &str) -> Vec<&Version> {
        self.versions
            .get(&RouteKey::new(method, path))
            .map(|entries| entries.iter().map(|(version, _)| version).collect())
            .unwrap_or_default()
    }

    /// Migrations for this route that apply to `requested`, in registration order.
    pub fn migrations_for<'a>(
        &'a self,
        method: &str,
        path: &str,
        requested: &'a Version,
    ) -> impl Iterator<Item = &'a Migration> + 'a {
        let key = RouteKey::new(method, path);
        self.migrations
            .iter()
            .filter(move |m| m.key() == key && m.applies_to(requested))
    }

    pub fn rewrite_request(
        &self,
        method: &str,
        path: &str,
        requested: &Version,
        body: &mut Value,
    ) {
        for migration in self.migrations_for(method, path, requested) {
            if let Some(rewrite) = &migration.request_rewrite {
                rewrite(body);
            }
        }
    }

    pub fn rewrite_response(
        &self,
        method: &str,
        path: &str,
        requested: &Version,
        body: &mut Value,
    ) {
        for migration in self.migrations_for(method, path, requested) {
            if let Some(rewrite) = &migration.response_rewrite {
                rewrite(body);
            }
        }
    }

    pub fn redirects(&self) -> &[Redirect] {
        &self.redirects
    }

    /// Redirects whose old path is `path`.
    pub fn redirects_for<'a>(
        &'a self,
        method: &'a str,
        path: &'a str,
    ) -> impl Iterator<Item = &'a Redirect> + 'a {
        self.redirects
            .iter()
            .filter(move |r| r.method.eq_ignore_ascii_case(method) && r.from == path)
    }
}

/// Fill `:name` segments of `template` from `params`. Unknown names are kept.
pub fn substitute_params(template: &str, params: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find(':') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..end];
        match params.get(name) {
            Some(value) if !name.is_empty() => out.push_str(value),
            _ => {
                out.push(':');
                out.push_str(name);
            }
        }
        rest = &after[end..];
    }
    out.push_str(rest);
    out
}
