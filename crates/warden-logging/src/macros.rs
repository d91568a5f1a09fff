//! ---
//! warden_section: "03-logging"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Structured logging context and security event helpers."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
/// Emit an informational log enriched with request context.
#[macro_export]
macro_rules! warden_info {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::INFO,
            organization = ctx.organization.unwrap_or(""),
            identity = ctx.identity.unwrap_or(""),
            method = ctx.method.unwrap_or(""),
            route = ctx.route.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::warden_info!(context = $crate::LogContext::default(), $($arg)+)
    }};
}

/// Emit a debug log enriched with request context.
#[macro_export]
macro_rules! warden_debug {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::DEBUG,
            organization = ctx.organization.unwrap_or(""),
            identity = ctx.identity.unwrap_or(""),
            method = ctx.method.unwrap_or(""),
            route = ctx.route.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::warden_debug!(context = $crate::LogContext::default(), $($arg)+)
    }};
}

/// Emit a warning enriched with request context.
#[macro_export]
macro_rules! warden_warn {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::WARN,
            organization = ctx.organization.unwrap_or(""),
            identity = ctx.identity.unwrap_or(""),
            method = ctx.method.unwrap_or(""),
            route = ctx.route.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::warden_warn!(context = $crate::LogContext::default(), $($arg)+)
    }};
}
