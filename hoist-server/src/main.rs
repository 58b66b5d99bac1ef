use anyhow::Context;
use clap::Parser;
use hoist_server::{AppState, LocalStorage, ReceiverConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hoist-server")]
#[command(about = "Authenticated upload receiver for the hoist agent")]
struct Args {
    /// Path to the receiver TOML configuration
    #[arg(short, long, env = "HOIST_SERVER_CONFIG")]
    config: PathBuf,

    /// Override the configured port
    #[arg(short, long, env = "HOIST_SERVER_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ReceiverConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let storage = Arc::new(LocalStorage::new(
        config.storage.root.clone(),
        config.storage.prefix.clone(),
    ));
    info!(
        root = %config.storage.root.display(),
        prefix = %config.storage.prefix,
        clients = config.clients.len(),
        "storage configured"
    );

    let state = AppState::new(storage, config.clients.clone(), config.max_upload_mb);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.host, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, hoist_server::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    Ok(())
}
