//! esherdd — the esherd daemon.
//!
//! Single binary that assembles the whole control loop:
//! - Membership store (the persisted server list)
//! - Lifecycle client (provision / decommission pipelines)
//! - Proxy synchronizer (config regeneration + reload ladder)
//! - Poller + reporter (health windowing and watermark decisions)
//! - Control surface (API-key-gated REST endpoints)
//!
//! # Usage
//!
//! ```text
//! esherdd run --config esherd.toml
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use esherd_api::ApiState;
use esherd_lifecycle::LifecycleClient;
use esherd_membership::MembershipStore;
use esherd_proxy::{ConfigSynchronizer, HaproxyProcess};
use esherd_reporter::{DecommissionFn, Poller, ProvisionFn, Reporter};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "esherdd", about = "esherd daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller.
    Run {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the control surface listen address.
        #[arg(long)]
        listen: Option<String>,

        /// Tracing filter directive, overriding RUST_LOG.
        #[arg(long)]
        log_filter: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            listen,
            log_filter,
        } => {
            init_tracing(log_filter.as_deref())?;
            let mut config = Config::load(config.as_deref())?;
            if let Some(listen) = listen {
                config.api.listen = listen;
            }
            run(config).await
        }
    }
}

fn init_tracing(filter: Option<&str>) -> anyhow::Result<()> {
    let filter = match filter {
        Some(directive) => directive.parse()?,
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,esherd=debug,esherdd=debug".parse().unwrap()),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("esherd daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    // Membership store.
    let membership = MembershipStore::load(&config.membership.path)?;
    info!(
        path = %config.membership.path.display(),
        nodes = membership.len().await,
        "membership store loaded"
    );

    // Lifecycle client.
    let lifecycle = Arc::new(LifecycleClient::new(
        config.lifecycle.clone(),
        membership.clone(),
    )?);
    info!(node_name = lifecycle.node_name(), "lifecycle client initialized");

    // Proxy synchronizer. The boot reset stops any stale proxy and brings
    // one up against the current membership; a failure here is logged and
    // the next trigger retries.
    let proxy = HaproxyProcess::new(config.proxy.clone());
    let synchronizer = ConfigSynchronizer::new(membership.clone(), config.proxy.clone(), proxy);
    if let Err(e) = synchronizer.reset_on_boot().await {
        error!(error = %e, "proxy boot reset failed, continuing");
    }

    // Reporter, with its scale actions wired to the lifecycle pipelines.
    // Errors surface here as a plain failure signal; details are logged.
    let provision: ProvisionFn = {
        let lifecycle = lifecycle.clone();
        Arc::new(move || {
            let lifecycle = lifecycle.clone();
            Box::pin(async move {
                match lifecycle.provision().await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(error = %e, "provisioning pipeline failed");
                        false
                    }
                }
            })
        })
    };
    let decommission: DecommissionFn = {
        let lifecycle = lifecycle.clone();
        Arc::new(move |ip: String| {
            let lifecycle = lifecycle.clone();
            Box::pin(async move {
                match lifecycle.decommission(&ip).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(%ip, error = %e, "decommissioning pipeline failed");
                        false
                    }
                }
            })
        })
    };
    let reporter = Arc::new(Reporter::new(
        config.reporter.clone(),
        provision,
        decommission,
    ));
    let poller = Poller::new(membership.clone(), reporter, &config.reporter)?;
    info!(
        interval_ms = config.reporter.poll_interval_ms,
        "reporter initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_shutdown = shutdown_rx.clone();
    let poll_shutdown = shutdown_rx;

    // ── Start background tasks ─────────────────────────────────

    let sync_handle = tokio::spawn(async move {
        synchronizer.run(sync_shutdown).await;
    });

    let poll_handle = tokio::spawn(async move {
        poller.run(poll_shutdown).await;
    });

    // ── Start control surface ──────────────────────────────────

    let router = esherd_api::build_router(ApiState {
        membership,
        lifecycle,
        api_key: config.api.api_key.clone(),
    });
    let addr: SocketAddr = config
        .api
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address {:?}: {e}", config.api.listen))?;

    info!(%addr, "control surface starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = sync_handle.await;
    let _ = poll_handle.await;

    info!("esherd daemon stopped");
    Ok(())
}
