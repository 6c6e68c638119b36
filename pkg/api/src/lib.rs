pub mod handlers;
pub mod server;

use std::sync::Arc;

use pkg_controllers::MetadataSource;
use pkg_metrics::ReconcileMetrics;
use pkg_providers::Provider;

/// Shared state injected into the healthcheck handlers.
///
/// Read-only references only; nothing here is written by the handlers.
#[derive(Clone)]
pub struct AppState {
    pub metadata: Arc<dyn MetadataSource>,
    pub provider: Arc<dyn Provider>,
    pub metrics: Arc<ReconcileMetrics>,
}
