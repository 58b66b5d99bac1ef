//! # Hoist Agent
//!
//! Long-running sender process: watches configured directory trees and
//! pushes new or changed files to the hoist receiver. Wiring order
//! matters: the watcher starts before the initial scan so no window is
//! lost between the two, and the queue dedups the overlap.

use anyhow::Context;
use clap::Parser;
use hoist_core::{restart, AgentConfig, Catalog, Processor, Scanner, UploadQueue, Uploader, WatchService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hoist-agent")]
#[command(about = "One-way file synchronisation agent")]
struct Args {
    /// Path to the agent TOML configuration
    #[arg(short, long, env = "HOIST_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(
        AgentConfig::load(&args.config)
            .with_context(|| format!("failed to load config from {}", args.config.display()))?,
    );

    let catalog = Catalog::open(&config.database.path)
        .await
        .context("failed to open catalogue")?;
    let queue = Arc::new(UploadQueue::new());
    let uploader = Uploader::new(&config.server.url, &config.server.api_key);

    let mut watcher = WatchService::new(queue.clone(), config.clone())
        .context("failed to create watcher")?;
    watcher.start().context("failed to start watcher")?;

    Scanner::new(queue.clone(), config.clone()).scan();

    info!(roots = config.watches.len(), "agent started");

    let processor = Arc::new(Processor::new(
        queue.clone(),
        catalog.clone(),
        uploader,
        config.clone(),
    ));
    {
        let processor = processor.clone();
        tokio::spawn(async move { processor.run().await });
    }
    {
        let processor = processor.clone();
        let hour = config.restart.hour;
        tokio::spawn(async move { restart::run(processor, hour).await });
    }

    shutdown_signal().await;
    info!("shutting down");

    processor.stop();
    processor.wait_drained().await;
    catalog.close().await;

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::error!("failed to install SIGTERM handler: {e}");
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
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
