//! ---
//! warden_section: "14-versioning"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Parsing of the client's declared protocol version."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use semver::Version;
use thiserror::Error;
use warden_common::VersioningConfig;

pub const VERSION_HEADER: &str = "Warden-Version";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Warden-Version header is required")]
    Missing,
    #[error("invalid Warden-Version header: {reason}")]
    Invalid { value: String, reason: String },
}

/// What to do with requests that carry no version header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MissingVersionPolicy {
    #[default]
    Reject,
    /// Treat the request as coming from a client of this version.
    AssumeLegacy(Version),
}

impl MissingVersionPolicy {
    pub fn from_config(config: &VersioningConfig) -> Self {
        match &config.legacy_default {
            Some(version) => MissingVersionPolicy::AssumeLegacy(version.clone()),
            None => MissingVersionPolicy::Reject,
        }
    }
}

/// Resolve the requested version from the raw header value.
pub fn parse_requested_version(
    header: Option<&str>,
    policy: &MissingVersionPolicy,
) -> Result<Version, VersionError> {
    let value = header.map(str::trim).filter(|v| !v.is_empty());
    match (value, policy) {
        (Some(value), _) => parse_lenient(value).map_err(|err| VersionError::Invalid {
            value: value.to_owned(),
            reason: err.to_string(),
        }),
        (None, MissingVersionPolicy::AssumeLegacy(version)) => Ok(version.clone()),
        (None, MissingVersionPolicy::Reject) => Err(VersionError::Missing),
    }
}

/// Accepts `v0.12.3`, `0.12` and `0` as well as full semver. Missing minor
/// and patch components are zero.
fn parse_lenient(value: &str) -> Result<Version, semver::Error> {
    let value = value
        .strip_prefix('v')
        .or_else(|| value.strip_prefix('V'))
        .unwrap_or(value);
    let split = value.find(['-', '+']).unwrap_or(value.len());
    let (core, suffix) = value.split_at(split);
    let components = core.split('.').count();
    if (1..3).contains(&components) && !core.is_empty() {
        let padded = format!("{core}{}{suffix}", ".0".repeat(3 - components));
        if let Ok(version) = Version::parse(&padded) {
            return Ok(version);
        }
    }
    Version::parse(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_follows_policy() {
        let err = parse_requested_version(None, &MissingVersionPolicy::Reject).unwrap_err();
        assert_eq!(err.to_string(), "Warden-Version header is required");

        let legacy = MissingVersionPolicy::AssumeLegacy(Version::new(0, 0, 0));
        assert_eq!(
            parse_requested_version(Some("  "), &legacy).unwrap(),
            Version::new(0, 0, 0)
        );
    }

    #[test]
    fn parses_and_rejects_values() {
        let policy = MissingVersionPolicy::default();
        assert_eq!(
            parse_requested_version(Some("0.12.3"), &policy).unwrap(),
            Version::new(0, 12, 3)
        );
        let err = parse_requested_version(Some("twelve"), &policy).unwrap_err();
        assert!(err.to_string().starts_with("invalid Warden-Version header"));
    }

    #[test]
    fn short_and_prefixed_versions_are_accepted() {
        let policy = MissingVersionPolicy::default();
        for (raw, expected) in [
            ("0.12", Version::new(0, 12, 0)),
            ("v0.12.3", Version::new(0, 12, 3)),
            ("V0.13", Version::new(0, 13, 0)),
            ("1", Version::new(1, 0, 0)),
        ] {
            assert_eq!(parse_requested_version(Some(raw), &policy).unwrap(), expected);
        }
        let pre = parse_requested_version(Some("0.14-rc.1"), &policy).unwrap();
        assert_eq!(pre, Version::parse("0.14.0-rc.1").unwrap());

        for raw in ["v", "0.12.", "0..1", "0.12.3.4"] {
            let err = parse_requested_version(Some(raw), &policy).unwrap_err();
            assert!(matches!(err, VersionError::Invalid { .. }), "{raw}");
        }
    }

    #[test]
    fn policy_from_config() {
        let config = VersioningConfig {
            legacy_default: Some(Version::new(0, 0, 0)),
        };
        assert_eq!(
            MissingVersionPolicy::from_config(&config),
            MissingVersionPolicy::AssumeLegacy(Version::new(0, 0, 0))
        );
        assert_eq!(
            MissingVersionPolicy::from_config(&VersioningConfig::default()),
            MissingVersionPolicy::Reject
        );
    }
}
