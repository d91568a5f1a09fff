//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Shared primitives and utilities for the core runtime."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
//! Shared primitives for the Warden workspace: configuration loading,
//! tracing initialisation and the clock used for credential expiry.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AccessKeyConfig, AppConfig, BootstrapConfig, BootstrapGroup, BootstrapIdentity,
    LoggingConfig, ServerConfig, VersioningConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use time::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
