//! Metadata service constants.

/// Default base URL of the Rancher metadata service.
pub const DEFAULT_METADATA_URL: &str = "http://rancher-metadata/2015-12-19";

/// Service label holding the external endpoint name.
pub const SERVICE_LABEL_ENDPOINT: &str = "io.rancher.service.external_lb.endpoint";

/// Legacy spelling of [`SERVICE_LABEL_ENDPOINT`].
pub const SERVICE_LABEL_ENDPOINT_LEGACY: &str = "io.rancher.service.external_lb_endpoint";

/// Prefix of service labels passed through to providers (prefix stripped).
pub const SERVICE_LABEL_PREFIX: &str = "io.rancher.service.external_lb.";

/// First delay of the environment discovery backoff, in seconds.
/// Each subsequent delay doubles.
pub const ENV_DISCOVERY_INITIAL_DELAY_SECS: u64 = 1;

/// Discovery gives up once the next delay would reach this budget.
pub const ENV_DISCOVERY_BUDGET_SECS: u64 = 30;
