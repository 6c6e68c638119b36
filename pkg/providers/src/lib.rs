//! Load-balancer backends the reconciliation engine drives.
//!
//! Every backend implements [`Provider`]. The binary selects exactly one of
//! them at startup through a [`ProviderRegistry`].

pub mod f5;
pub mod registry;
pub mod rest;
pub mod zevenet;

use anyhow::Result;
use async_trait::async_trait;
use pkg_types::EndpointConfig;

pub use registry::{ProviderFactory, ProviderRegistry};

/// A pluggable adapter to one load-balancer / API-gateway product.
///
/// Every method may block on network I/O. Mutating methods wrap their errors
/// with the endpoint they were acting on.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Lightweight connectivity probe.
    async fn health_check(&self) -> Result<()>;

    /// All endpoints currently configured on the backend that the controller
    /// can discover. Ownership filtering happens in the engine.
    async fn get_lb_configs(&self) -> Result<Vec<EndpointConfig>>;

    /// Make the backend's membership for `config.endpoint` a superset of
    /// `config.targets`. Idempotent. May return the endpoint's FQDN.
    async fn add_lb_config(&self, config: &EndpointConfig) -> Result<Option<String>>;

    /// Converge the backend's membership to exactly `config.targets`.
    /// May return the endpoint's FQDN.
    async fn update_lb_config(&self, config: &EndpointConfig) -> Result<Option<String>>;

    /// Drop all membership state for the endpoint. Absent state is not an error.
    async fn remove_lb_config(&self, config: &EndpointConfig) -> Result<()>;
}
