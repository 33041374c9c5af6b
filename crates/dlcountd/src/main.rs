//! dlcountd — the download counter daemon.
//!
//! Runs as a mirror sidecar next to a package registry: the front proxy
//! copies tarball requests here, the interceptor counts them into the
//! per-day Redis records, and every mirrored request gets `204`.
//!
//! # Usage
//!
//! ```text
//! dlcountd serve --config /etc/dlcount.toml --port 4874
//! dlcountd serve --memory            # no Redis, counts kept in-process
//! dlcountd config --config /etc/dlcount.toml
//! ```

mod app;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::app::{Backend, build_counter, load_config};

#[derive(Parser)]
#[command(name = "dlcountd", about = "Package download counter daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the counting sidecar.
    Serve {
        /// Configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long, default_value = "4874")]
        port: u16,

        /// Keep counts in memory instead of Redis.
        #[arg(long)]
        memory: bool,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dlcountd=debug,dlcount=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            memory,
        } => {
            let backend = if memory { Backend::memory() } else { Backend::Redis };
            run_serve(config, port, backend).await
        }
        Command::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run_serve(config: Option<PathBuf>, port: u16, backend: Backend) -> anyhow::Result<()> {
    let config = load_config(config.as_deref())?;
    info!(
        redis = %format!("{}:{}", config.redis.host, config.redis.port),
        db = config.redis.db,
        backend = backend.name(),
        "dlcount daemon starting"
    );

    let counter = build_counter(&config, backend).await?;
    let router = dlcount_api::build_router(counter);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "sidecar listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("dlcount daemon stopped");
    Ok(())
}
