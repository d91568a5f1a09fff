//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Daemon configuration: TOML loading, defaults and validation."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_organization_name() -> String {
    "default".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_access_key_ttl() -> Duration {
    Duration::from_secs(12 * 60 * 60)
}

/// Primary configuration object for the Warden daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub access_keys: AccessKeyConfig,
    #[serde(default)]
    pub versioning: VersioningConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "WARDEN_CONFIG";

    /// Load configuration from disk, respecting the `WARDEN_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.access_keys.validate()?;
        self.bootstrap.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Upper bound for a single request, store calls included.
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
    /// Name of the organization (tenant) served by this process.
    #[serde(default = "default_organization_name")]
    pub organization: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            request_timeout: default_request_timeout(),
            organization: default_organization_name(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(anyhow!("server.request_timeout must be greater than zero"));
        }
        if self.organization.trim().is_empty() {
            return Err(anyhow!("server.organization must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeyConfig {
    /// Lifetime applied to keys created without an explicit expiry.
    #[serde(default = "default_access_key_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub default_ttl: Duration,
}

impl Default for AccessKeyConfig {
    fn default() -> Self {
        Self {
            default_ttl: default_access_key_ttl(),
        }
    }
}

impl AccessKeyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl.is_zero() {
            return Err(anyhow!("access_keys.default_ttl must be greater than zero"));
        }
        Ok(())
    }
}

/// Protocol version negotiation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersioningConfig {
    /// Version assumed for requests without a version header. Unset means such
    /// requests are rejected.
    #[serde(default)]
    pub legacy_default: Option<Version>,
}

/// Identities, groups and grants seeded into an empty store at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub groups: Vec<BootstrapGroup>,
    #[serde(default)]
    pub identities: Vec<BootstrapIdentity>,
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(anyhow!("bootstrap group names must not be empty"));
            }
            if !seen.insert(format!("group:{}", group.name)) {
                return Err(anyhow!("bootstrap group '{}' declared twice", group.name));
            }
        }
        for identity in &self.identities {
            if identity.name.trim().is_empty() {
                return Err(anyhow!("bootstrap identity names must not be empty"));
            }
            if !seen.insert(format!("identity:{}", identity.name)) {
                return Err(anyhow!(
                    "bootstrap identity '{}' declared twice",
                    identity.name
                ));
            }
            for group in &identity.groups {
                if !self.groups.iter().any(|g| &g.name == group) {
                    return Err(anyhow!(
                        "bootstrap identity '{}' references unknown group '{}'",
                        identity.name,
                        group
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapGroup {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapIdentity {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    /// Fixed `{key_id}.{secret}` credential issued to the identity.
    #[serde(default)]
    pub access_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
listen = "127.0.0.1:9090"
request_timeout = 30
organization = "acme"

[access_keys]
default_ttl = 3600

[versioning]
legacy_default = "0.0.0"

[[bootstrap.groups]]
name = "operators"
roles = ["view"]

[[bootstrap.identities]]
name = "admin@example.com"
roles = ["admin"]
groups = ["operators"]
access_key = "aaaaaaaaaa.bbbbbbbbbbbbbbbbbbbbbbbb"
"#;

    #[test]
    fn parses_full_configuration() {
        let config: AppConfig = SAMPLE.parse().unwrap();
        assert_eq!(config.server.listen.port(), 9090);
        assert_eq!(config.server.request_timeout, Duration::from_secs(30));
        assert_eq!(config.server.organization, "acme");
        assert_eq!(config.access_keys.default_ttl, Duration::from_secs(3600));
        assert_eq!(
            config.versioning.legacy_default,
            Some(Version::new(0, 0, 0))
        );
        assert_eq!(config.bootstrap.identities[0].groups, vec!["operators"]);
    }

    #[test]
    fn defaults_apply_to_empty_document() {
        let config: AppConfig = "".parse().unwrap();
        assert_eq!(config.access_keys.default_ttl, default_access_key_ttl());
        assert!(config.versioning.legacy_default.is_none());
        assert_eq!(config.server.organization, "default");
    }

    #[test]
    fn unknown_bootstrap_group_is_rejected() {
        let err = r#"
[[bootstrap.identities]]
name = "someone"
groups = ["ghosts"]
"#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("unknown group 'ghosts'"));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let err = "[access_keys]\ndefault_ttl = 0\n"
            .parse::<AppConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("default_ttl"));
    }

    #[test]
    fn loads_from_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let missing = dir.path().join("missing.toml");
        let loaded = AppConfig::load_with_source(&[missing, path.clone()]).unwrap();
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.server.organization, "acme");
    }
}
