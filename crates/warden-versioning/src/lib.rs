//! ---
//! warden_section: "14-versioning"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Protocol version negotiation and the versioned route registry."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
//! Clients declare the protocol version they were built against in the
//! `Warden-Version` header. Routes keep serving older response shapes to
//! older clients through version overrides and payload migrations.

pub mod build_info;
pub mod header;
pub mod router;

pub use build_info::{clap_long_version, VersionInfo};
pub use header::{parse_requested_version, MissingVersionPolicy, VersionError, VERSION_HEADER};
pub use router::{
    substitute_params, Migration, Redirect, Rewrite, RouteKey, RouteRegistry,
    RouteRegistryBuilder,
};
pub use semver::Version;
