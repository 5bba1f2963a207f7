mod error;
mod handlers;
mod models;
mod router;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use lifecycle::{AutoConfirmDispatcher, Exchange, ExchangeConfig};
use router::create_router;
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    tracing::info!("Starting marketplace gateway");

    let data_dir = std::env::var("MARKET_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let config = ExchangeConfig {
        data_dir: data_dir.into(),
        ..ExchangeConfig::default()
    };

    // The on-chain settlement collaborator; the auto-confirming stand-in
    // keeps the demo self-contained.
    let exchange = Exchange::open(config, Arc::new(AutoConfirmDispatcher)).await?;
    let app = create_router(AppState::new(exchange.clone()));

    let addr: SocketAddr = std::env::var("MARKET_LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Quiescent now; cut a checkpoint so the next boot replays less
    tracing::info!("Shutting down; writing checkpoint");
    if let Err(err) = exchange.checkpoint().await {
        tracing::error!(%err, "checkpoint on shutdown failed");
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
