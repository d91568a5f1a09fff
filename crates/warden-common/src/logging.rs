//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Tracing subscriber setup with rolling file output."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "WARDEN_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Flushes buffered lines for both writers on process exit.
static GUARDS: OnceCell<[WorkerGuard; 2]> = OnceCell::new();

/// Output format of the stdout sink. The file sink is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Install the global subscriber for `service_name`.
///
/// The filter comes from `WARDEN_LOG`, then `RUST_LOG`, then `info`. An
/// unparsable `WARDEN_LOG` is reported on stderr and ignored. Calling this
/// twice keeps the first subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;

    let file_name = log_file_name(service_name, config);
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(rolling::daily(&config.directory, &file_name));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set([file_guard, stdout_guard]);

    let warden_log = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(warden_log.as_deref(), rust_log.as_deref());

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer(config.format, stdout_writer))
        .with(file_layer(file_writer))
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            service = %service_name,
            log_file = %config.directory.join(&file_name).display(),
            format = ?config.format,
            "tracing initialised"
        );
    }
    Ok(())
}

fn stdout_layer<S>(format: LogFormat, writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer);
    match format {
        LogFormat::StructuredJson => layer
            .json()
            .flatten_event(true)
            .with_target(false)
            .boxed(),
        LogFormat::Pretty => layer.with_target(true).boxed(),
    }
}

fn file_layer<S>(writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
{
    fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_ansi(false)
        .json()
        .flatten_event(true)
        .with_writer(writer)
        .boxed()
}

/// Daily files are named `<prefix>.log.<date>`; the prefix defaults to the service.
fn log_file_name(service_name: &str, config: &LoggingConfig) -> String {
    let prefix = config
        .file_prefix
        .as_deref()
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or(service_name);
    format!("{prefix}.log")
}

fn log_filter(warden_log: Option<&str>, rust_log: Option<&str>) -> EnvFilter {
    if let Some(directive) = warden_log {
        match EnvFilter::try_new(directive) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("invalid {LOG_ENV} directive ({err}); ignoring it"),
        }
    }
    rust_log
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warden_log_wins_over_rust_log() {
        let filter = log_filter(Some("debug"), Some("warn"));
        assert_eq!(filter.to_string(), "debug");

        let filter = log_filter(None, Some("warn"));
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn bad_directives_fall_back() {
        let filter = log_filter(Some("warden_api=loud"), Some("warn"));
        assert_eq!(filter.to_string(), "warn");

        let filter = log_filter(None, None);
        assert_eq!(filter.to_string(), DEFAULT_DIRECTIVE);
    }

    #[test]
    fn file_prefix_defaults_to_the_service() {
        let mut config = LoggingConfig::default();
        assert_eq!(log_file_name("wardend", &config), "wardend.log");

        config.file_prefix = Some(String::new());
        assert_eq!(log_file_name("wardend", &config), "wardend.log");

        config.file_prefix = Some("audit".into());
        assert_eq!(log_file_name("wardend", &config), "audit.log");
    }
}
