use anyhow::{Result, bail};
use std::collections::HashSet;

use crate::endpoint::{EndpointConfig, PoolName};

/// Validate an endpoint configuration before it enters desired state.
/// Rules: non-empty endpoint and target port, a `<service>_<stack>_...` pool
/// name, no duplicate `HostIP:Port` targets.
pub fn validate_endpoint_config(config: &EndpointConfig) -> Result<()> {
    if config.endpoint.trim().is_empty() {
        bail!("endpoint must not be empty");
    }
    if config.target_port.is_empty() {
        bail!("endpoint '{}' has no target port", config.endpoint);
    }
    PoolName::parse(&config.target_pool_name)?;

    let mut seen = HashSet::new();
    for target in &config.targets {
        if !seen.insert(target) {
            bail!(
                "endpoint '{}' lists target {} more than once",
                config.endpoint,
                target
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Target;

    fn valid() -> EndpointConfig {
        EndpointConfig {
            endpoint: "svc.example.com".to_string(),
            target_pool_name: "svc_stack_env_sfx".to_string(),
            target_port: "80".to_string(),
            targets: vec![Target::new("10.0.0.1", "80"), Target::new("10.0.0.2", "80")],
            ..Default::default()
        }
    }

    #[test]
    fn valid_config() {
        assert!(validate_endpoint_config(&valid()).is_ok());
    }

    #[test]
    fn invalid_configs() {
        let mut c = valid();
        c.endpoint = " ".to_string();
        assert!(validate_endpoint_config(&c).is_err());

        let mut c = valid();
        c.target_port.clear();
        assert!(validate_endpoint_config(&c).is_err());

        let mut c = valid();
        c.target_pool_name = "nounderscore".to_string();
        assert!(validate_endpoint_config(&c).is_err());

        let mut c = valid();
        c.targets.push(Target::new("10.0.0.1", "80"));
        assert!(validate_endpoint_config(&c).is_err());
    }
}
