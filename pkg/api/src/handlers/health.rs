use axum::{extract::State, http::StatusCode, http::header, response::IntoResponse};
use tracing::{debug, error};

use crate::AppState;

/// GET / — probe the metadata service, then the active provider.
pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.metadata.probe().await {
        error!("Healthcheck: metadata probe failed: {:#}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to reach metadata server".to_string(),
        );
    }
    if let Err(e) = state.provider.health_check().await {
        error!("Healthcheck: {} probe failed: {:#}", state.provider.name(), e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to reach an external provider: {}", e),
        );
    }
    debug!("Healthcheck OK");
    (StatusCode::OK, "OK".to_string())
}

/// GET /metrics — reconciliation counters in Prometheus text format.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
