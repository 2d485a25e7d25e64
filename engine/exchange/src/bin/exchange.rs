//! Exchange server binary.
//!
//! `exchange [port] [io_threads] [--log-dir DIR]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use exchange::{Exchange, ExchangeConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "exchange", about = "Single-instrument limit-order-book exchange")]
struct Args {
    /// TCP port to listen on
    #[arg(default_value_t = 16000)]
    port: u16,

    /// Number of I/O worker threads
    #[arg(default_value_t = 3)]
    io_threads: usize,

    /// Directory for the binary event log (disabled when omitted)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    exchange::logging::init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.io_threads.max(1))
        .enable_all()
        .build()
        .context("failed to build I/O runtime")?;

    runtime.block_on(async move {
        let mut exchange =
            Exchange::bind(ExchangeConfig { port: args.port, log_dir: args.log_dir })
                .await
                .context("failed to start exchange")?;
        info!(port = exchange.local_addr().port(), io_threads = args.io_threads, "exchange up");

        shutdown_signal().await;
        info!("shutdown signal received");
        exchange.stop();
        Ok(())
    })
}

/// Resolves on SIGINT (ctrl-c) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
