//! dcc-free-mem - serve `dcc_free_mem` alongside distccd's statistics.
//!
//! ```bash
//! dcc-free-mem 3633 3634 --access-log /var/log/access.log
//! ```

use std::path::PathBuf;
use anyhow::Context;
use clap::Parser;

use dccinit_stats::{StatsConfig, StatsServer};

/// Serve `dcc_free_mem` alongside the reported statistics of a distccd server.
#[derive(Debug, Parser)]
#[command(name = "dcc-free-mem", version)]
struct Args {
    /// TCP port to listen on for the extended statistics.
    listen_port: u16,

    /// The statistics server's port, as passed to `distccd --stats-port`.
    #[arg(value_name = "PORT")]
    stats_port: u16,

    /// Web server access log.
    #[arg(long, default_value = "/var/log/access.log")]
    access_log: PathBuf,

    /// Web server error log.
    #[arg(long, default_value = "/var/log/error.log")]
    error_log: PathBuf,

    /// Syslog-style file.
    #[arg(long, default_value = "/var/log/syslog")]
    system_log: PathBuf,
}

impl Args {
    fn into_config(self) -> StatsConfig {
        StatsConfig {
            access_log: self.access_log,
            error_log: self.error_log,
            system_log: self.system_log,
            ..StatsConfig::new(self.listen_port, self.stats_port)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let server = StatsServer::new(args.into_config());
    server
        .run(shutdown_signal())
        .await
        .context("dcc-free-mem failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutting down");
}
