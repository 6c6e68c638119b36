use pkg_constants::metadata::{
    SERVICE_LABEL_ENDPOINT, SERVICE_LABEL_ENDPOINT_LEGACY, SERVICE_LABEL_PREFIX,
};
use pkg_types::validate::validate_endpoint_config;
use pkg_types::{EndpointConfig, EndpointMap, OwnershipScope, Target};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, error, warn};

use crate::model::Service;

/// Build desired endpoint state from the metadata service list.
///
/// Services without an endpoint label are ignored. When two services claim the
/// same endpoint the first one keeps it, even if that service is then skipped
/// for a bad port spec or a config that fails validation.
pub fn desired_endpoints(services: &[Service], scope: &OwnershipScope) -> EndpointMap {
    let mut configs = EndpointMap::new();
    let mut claimed = HashSet::new();
    for service in services {
        let Some(endpoint) = endpoint_label(service) else {
            continue;
        };
        debug!("LB label exists for service {}", service.name);

        if !claimed.insert(endpoint) {
            error!(
                "Endpoint {} already used by another service, skipping service {}",
                endpoint, service.name
            );
            continue;
        }

        let Some(spec) = service.ports.first() else {
            warn!(
                "Skipping LB configuration for service {}: no ports exposed",
                service.name
            );
            continue;
        };
        let Some(target_port) = service_port(spec) else {
            warn!(
                "Skipping LB configuration for service {}: unexpected port spec {}",
                service.name, spec
            );
            continue;
        };

        let config = EndpointConfig {
            endpoint: endpoint.to_string(),
            target_pool_name: scope.pool_name(&service.name, &service.stack_name),
            target_port: target_port.to_string(),
            targets: targets(service, target_port),
            labels: passthrough_labels(service),
        };
        if let Err(e) = validate_endpoint_config(&config) {
            warn!("Skipping LB configuration for service {}: {}", service.name, e);
            continue;
        }
        debug!(
            "Found {} targets for service {}",
            config.targets.len(),
            service.name
        );
        configs.insert(config.endpoint.clone(), config);
    }
    configs
}

fn endpoint_label(service: &Service) -> Option<&str> {
    service
        .labels
        .get(SERVICE_LABEL_ENDPOINT)
        .or_else(|| service.labels.get(SERVICE_LABEL_ENDPOINT_LEGACY))
        .map(String::as_str)
}

/// Public port of a `public:private` service port spec.
fn service_port(spec: &str) -> Option<&str> {
    match spec.split(':').collect::<Vec<_>>().as_slice() {
        [public, _] if !public.is_empty() => Some(*public),
        _ => None,
    }
}

fn targets(service: &Service, target_port: &str) -> Vec<Target> {
    let mut targets = Vec::new();
    for container in &service.containers {
        if container.service_name.is_empty() {
            continue;
        }
        if container.service_name != service.name || container.stack_name != service.stack_name {
            continue;
        }
        if !container.is_serving() {
            debug!(
                "Skipping container {} with state '{}' and health '{}'",
                container.name, container.state, container.health_state
            );
            continue;
        }
        for spec in &container.ports {
            let parts: Vec<&str> = spec.split(':').collect();
            let [ip, port, _] = parts.as_slice() else {
                warn!(
                    "Unexpected port spec for container {}: {}",
                    container.name, spec
                );
                continue;
            };
            if *port != target_port {
                continue;
            }
            targets.push(Target::new(*ip, *port));
        }
    }
    targets.sort();
    targets.dedup();
    targets
}

fn passthrough_labels(service: &Service) -> BTreeMap<String, String> {
    service
        .labels
        .iter()
        .filter(|(k, _)| k.as_str() != SERVICE_LABEL_ENDPOINT)
        .filter_map(|(k, v)| {
            k.strip_prefix(SERVICE_LABEL_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| (name.to_string(), v.clone()))
        })
        .collect()
}
