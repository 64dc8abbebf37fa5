//! `vigild`, the Vigil control-plane daemon.

use std::path::PathBuf;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use vigil_daemon::bootstrap::Daemon;
use vigil_daemon::config::VigilConfig;

#[derive(Debug, Parser)]
#[command(name = "vigild", about = "Self-healing control plane daemon", version)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured listen address.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match VigilConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("vigild: {err}");
            std::process::exit(1);
        }
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let daemon = match Daemon::build(config).await {
        Ok(daemon) => daemon,
        Err(err) => {
            error!(%err, "Failed to build daemon");
            std::process::exit(1);
        }
    };

    if let Err(err) = daemon.run(shutdown_signal()).await {
        error!(%err, "Daemon exited with error");
        std::process::exit(1);
    }
}

/// Resolve on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
