//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "binary"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Binary entrypoint for the Warden daemon."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tokio::signal;
use tracing::info;
use warden_api::{build_router, openapi_document, spawn_api_server, ApiServices};
use warden_common::{init_tracing, system_clock, AppConfig};
use warden_security::{bootstrap, AccessKeys, Grants, MemoryStore, Organization, Store};
use warden_versioning::{clap_long_version, MissingVersionPolicy, VersionInfo};

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = env!("CARGO_PKG_VERSION"),
    about = "Warden access broker daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the API")]
    Run,
    #[command(about = "Print the OpenAPI document and exit")]
    Openapi,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", clap_long_version());
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Openapi => {
            let document = openapi_document(&VersionInfo::current());
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
        Commands::Run => {
            let mut candidates = Vec::new();
            if let Some(path) = &cli.config {
                candidates.push(path.clone());
            }
            candidates.push(PathBuf::from("configs/warden.toml"));
            candidates.push(PathBuf::from("configs/warden.example.toml"));

            let loaded = AppConfig::load_with_source(&candidates)?;
            init_tracing("wardend", &loaded.config.logging)?;
            info!(
                config_path = %loaded.source.display(),
                version = %VersionInfo::current().banner(),
                "configuration loaded"
            );
            run_daemon(loaded.config).await
        }
    }
}

async fn ensure_organization(store: &MemoryStore, name: &str) -> Result<Organization> {
    match store.organization_by_name(name).await {
        Ok(organization) => Ok(organization),
        Err(err) if err.is_not_found() => Ok(store.create_organization(name).await?),
        Err(err) => Err(err.into()),
    }
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let clock = system_clock();
    let access_keys = AccessKeys::from_config(&config.access_keys, clock.clone());
    let grants = Grants::new(clock);

    let store = Arc::new(MemoryStore::new());
    let organization = ensure_organization(&store, &config.server.organization).await?;
    let mut tx = store.begin(organization.id).await?;
    let summary = bootstrap::apply(tx.as_mut(), &config.bootstrap, &access_keys, &grants)
        .await
        .context("failed to apply bootstrap configuration")?;
    tx.commit().await?;
    info!(
        organization = %organization.name,
        identities = summary.identities,
        access_keys = summary.access_keys,
        "store ready"
    );

    let router = build_router(ApiServices {
        store,
        organization_id: organization.id,
        access_keys,
        grants,
        policy: MissingVersionPolicy::from_config(&config.versioning),
        request_timeout: config.server.request_timeout,
    });
    let server = spawn_api_server(router, config.server.listen)?;
    info!(address = %server.addr(), "daemon running; waiting for termination signal");

    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    server.shutdown().await
}
