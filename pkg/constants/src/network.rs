//! Network-related constants.

/// Default port for the healthcheck HTTP responder.
pub const DEFAULT_HEALTHCHECK_PORT: u16 = 1000;

/// Timeout applied to every outbound HTTP request (metadata, Cattle, providers).
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default config file path for the controller.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/external-lb/config.yaml";
