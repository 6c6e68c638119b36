use anyhow::Result;
use async_trait::async_trait;
use pkg_types::EndpointMap;

/// Where desired state comes from.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Environment identifier used to scope target pool names.
    fn environment_uuid(&self) -> &str;

    /// Cheap token that changes whenever desired state may have changed.
    /// It may also change spuriously.
    async fn version(&self) -> Result<String>;

    /// Full desired state, keyed by endpoint. Pool names end in
    /// `_<environment_uuid>_<suffix>`.
    async fn desired_endpoints(&self, suffix: &str) -> Result<EndpointMap>;

    /// Connectivity probe for the healthcheck endpoint.
    async fn probe(&self) -> Result<()>;
}

/// Publishes FQDNs discovered by providers to the orchestration platform's DNS.
#[async_trait]
pub trait FqdnRegistrar: Send + Sync {
    async fn register_fqdn(&self, service: &str, stack: &str, fqdn: &str) -> Result<()>;
}
