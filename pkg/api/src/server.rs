use axum::{Router, routing::get};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::AppState;
use crate::handlers::health;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::healthcheck))
        .route("/metrics", get(health::metrics))
        .with_state(state)
}

/// Bind the healthcheck listener. Serving happens on the returned task.
pub async fn start_healthcheck(
    addr: SocketAddr,
    state: AppState,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(addr).await?;
    info!("Healthcheck listening on {}", listener.local_addr()?);
    let app = router(state);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Healthcheck server stopped: {}", e);
        }
    }))
}
