//! ---
//! warden_section: "03-logging"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Structured logging context and security event helpers."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Request-scoped logging context. Credential material must never be passed
//! into any of these fields; key ids are public and may be logged.

use tracing::Level;

pub mod macros;

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Organization (tenant) the event belongs to.
    pub organization: Option<&'a str>,
    /// Authenticated identity, when known.
    pub identity: Option<&'a str>,
    /// HTTP method of the request being served.
    pub method: Option<&'a str>,
    /// Route template of the request being served.
    pub route: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an organization identifier.
    pub fn with_organization(mut self, organization: &'a str) -> Self {
        self.organization = Some(organization);
        self
    }

    /// Attach an identity identifier.
    pub fn with_identity(mut self, identity: &'a str) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Attach the request method and route template.
    pub fn with_route(mut self, method: &'a str, route: &'a str) -> Self {
        self.method = Some(method);
        self.route = Some(route);
        self
    }
}

/// Outcome attached to security relevant events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityOutcome {
    /// The credential or privilege check passed.
    Allowed,
    /// The check failed.
    Denied,
}

impl SecurityOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SecurityOutcome::Allowed => "allowed",
            SecurityOutcome::Denied => "denied",
        }
    }
}

/// Emit a standardized security event (credential use, privilege check, revocation).
pub fn log_security_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SecurityOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    match outcome {
        SecurityOutcome::Allowed => tracing::event!(
            Level::INFO,
            event = %event,
            outcome = outcome.as_str(),
            organization = ctx.organization.unwrap_or(""),
            identity = ctx.identity.unwrap_or(""),
            method = ctx.method.unwrap_or(""),
            route = ctx.route.unwrap_or(""),
            message = %message
        ),
        SecurityOutcome::Denied => tracing::event!(
            Level::WARN,
            event = %event,
            outcome = outcome.as_str(),
            organization = ctx.organization.unwrap_or(""),
            identity = ctx.identity.unwrap_or(""),
            method = ctx.method.unwrap_or(""),
            route = ctx.route.unwrap_or(""),
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

    /// Test-only subscriber so the events are actually dispatched.
    fn init() {
        let _ = Registry::default()
            .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
            .with(subscriber_fmt::layer())
            .try_init();
    }

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_organization("org-1")
            .with_identity("i:42");
        warden_info!(context = ctx.clone(), "access key issued");
        warden_debug!("debug message");
        warden_warn!(context = ctx, "denied for roles: {}", "admin");
    }

    #[test]
    fn security_event_helper_emits() {
        init();
        let ctx = LogContext::new()
            .with_organization("org-1")
            .with_route("GET", "/api/grants");
        log_security_event(
            Some(&ctx),
            "grant.check",
            "privilege check passed",
            SecurityOutcome::Allowed,
        );
        log_security_event(
            None,
            "access_key.validate",
            "invalid secret",
            SecurityOutcome::Denied,
        );
    }
}
