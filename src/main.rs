mod config;
mod donation;
mod error;
mod extract;
mod messaging;
mod normalize;
mod server;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::donation::SourceKind;
use crate::messaging::MessagingClient;
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,donation_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional TOML file; environment variables override it
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path.display());
    }
    let config = Config::load(config_path.as_deref())
        .context("Invalid configuration; set ROBLOX_API_KEY and UNIVERSE_ID")?;

    let messaging = MessagingClient::new(&config.roblox)?;

    info!("{}", server::SERVICE_NAME);
    info!("  Universe ID: {}", config.roblox.universe_id);
    info!("  Messaging topic: {}", config.roblox.topic);
    info!("  API endpoint: {}", messaging.endpoint());
    info!("  API key: {}", config.roblox.masked_api_key());

    let port = config.server.port;
    let state = Arc::new(AppState::new(config, messaging));
    let app = server::router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on port {}", port);
    for kind in SourceKind::ALL {
        info!("  {}: http://localhost:{}{}", kind, port, kind.webhook_path());
    }
    info!("  Test:  http://localhost:{}/test", port);
    info!("  Debug: http://localhost:{}/debug", port);
    info!("  Stats: http://localhost:{}/stats", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(tokio::signal::ctrl_c()))
        .await
        .context("Server error")?;

    Ok(())
}

/// Resolve once `signal` fires. If the signal handler cannot be installed,
/// keep serving instead of shutting down straight away.
async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
