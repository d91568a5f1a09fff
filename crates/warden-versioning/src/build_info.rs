//! ---
//! warden_section: "14-versioning"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Build metadata and the protocol version served by this build."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use semver::Version;
use serde::Serialize;

/// Version metadata captured at compile time.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    /// Workspace semantic version.
    pub semver: String,
    /// Git commit hash, when the build environment provides one.
    pub git_sha: String,
    /// Cargo profile used during compilation.
    pub profile: String,
}

impl VersionInfo {
    #[must_use]
    pub fn current() -> Self {
        Self {
            semver: env!("CARGO_PKG_VERSION").to_owned(),
            git_sha: option_env!("WARDEN_GIT_SHA").unwrap_or("UNKNOWN").to_owned(),
            profile: if cfg!(debug_assertions) {
                "debug".to_owned()
            } else {
                "release".to_owned()
            },
        }
    }

    /// Version announced to clients; the same value they send back in the
    /// version header.
    #[must_use]
    pub fn protocol_version(&self) -> Version {
        Version::parse(&self.semver).unwrap_or_else(|_| Version::new(0, 0, 0))
    }

    #[must_use]
    pub fn banner(&self) -> String {
        format!("Warden v{} (git {})", self.semver, self.git_sha)
    }

    /// Long form for `--version`.
    #[must_use]
    pub fn extended(&self) -> String {
        format!("{}\nProfile: {}", self.banner(), self.profile)
    }
}

#[must_use]
pub fn clap_long_version() -> String {
    VersionInfo::current().extended()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_contains_semver() {
        let info = VersionInfo::current();
        assert!(info.extended().contains(&info.semver));
        assert_eq!(info.protocol_version().to_string(), info.semver);
    }
}
