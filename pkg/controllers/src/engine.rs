use anyhow::{Context, Result};
use pkg_metrics::{Op, ReconcileMetrics};
use pkg_providers::Provider;
use pkg_types::{EndpointConfig, EndpointMap, OwnershipScope, diff};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// FQDNs learned from the provider during a pass, mapped to the config that produced them.
pub type FqdnMap = HashMap<String, EndpointConfig>;

/// Runs one reconciliation pass: read the provider, classify endpoints into
/// remove / add / update, apply them in that order.
///
/// Per-endpoint failures are logged and skipped. Only a failure to read the
/// provider's state fails the pass.
pub struct Reconciler {
    provider: Arc<dyn Provider>,
    scope: OwnershipScope,
    metrics: Arc<ReconcileMetrics>,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn Provider>,
        scope: OwnershipScope,
        metrics: Arc<ReconcileMetrics>,
    ) -> Self {
        Self {
            provider,
            scope,
            metrics,
        }
    }

    pub fn scope(&self) -> &OwnershipScope {
        &self.scope
    }

    /// Provider entries owned by this controller, keyed by endpoint.
    pub async fn observed(&self) -> Result<EndpointMap> {
        let all = self
            .provider
            .get_lb_configs()
            .await
            .with_context(|| format!("{} error reading lb configs", self.provider.name()))?;

        let mut owned = EndpointMap::with_capacity(all.len());
        for cfg in all {
            if !self.scope.owns(&cfg.target_pool_name) {
                continue;
            }
            if cfg.endpoint.is_empty() {
                warn!("Ignoring provider entry with empty endpoint (pool {})", cfg.target_pool_name);
                continue;
            }
            if let Some(first) = owned.get(&cfg.endpoint) {
                warn!(
                    "Endpoint {} is mapped by pools {} and {}; keeping the first",
                    cfg.endpoint, first.target_pool_name, cfg.target_pool_name
                );
                continue;
            }
            owned.insert(cfg.endpoint.clone(), cfg);
        }
        Ok(owned)
    }

    pub async fn reconcile(&self, desired: &EndpointMap) -> Result<FqdnMap> {
        let observed = self.observed().await?;
        debug!("LB configs owned on provider: {}", observed.len());
        self.metrics.set_owned_endpoints(observed.len());

        let current: HashSet<String> = observed.keys().cloned().collect();
        let wanted: HashSet<String> = desired.keys().cloned().collect();
        let delta = diff(&current, &wanted);

        let mut fqdns = FqdnMap::new();

        let to_remove: Vec<&EndpointConfig> = delta
            .sorted_to_remove()
            .iter()
            .filter_map(|k| observed.get(k))
            .collect();
        self.apply(Op::Remove, &to_remove, &mut fqdns).await;

        let to_add: Vec<&EndpointConfig> = delta
            .sorted_to_add()
            .iter()
            .filter_map(|k| desired.get(k))
            .collect();
        self.apply(Op::Add, &to_add, &mut fqdns).await;

        let mut to_update = Vec::new();
        for key in delta.sorted_to_retain() {
            let (Some(want), Some(have)) = (desired.get(&key), observed.get(&key)) else {
                continue;
            };
            if want.is_equivalent(have) {
                continue;
            }
            if !want
                .target_pool_name
                .eq_ignore_ascii_case(&have.target_pool_name)
            {
                debug!(
                    "Endpoint {} will be remapped from pool {} to {}",
                    key, have.target_pool_name, want.target_pool_name
                );
            }
            to_update.push(want);
        }
        self.apply(Op::Update, &to_update, &mut fqdns).await;

        Ok(fqdns)
    }

    async fn apply(&self, op: Op, configs: &[&EndpointConfig], fqdns: &mut FqdnMap) {
        if configs.is_empty() {
            debug!("No LB configs to {}", op);
            return;
        }
        info!("LB configs to {}: {}", op, configs.len());

        for cfg in configs {
            info!("{} LB config: {}", op, cfg);
            let result = match op {
                Op::Remove => self.provider.remove_lb_config(cfg).await.map(|()| None),
                Op::Add => self.provider.add_lb_config(cfg).await,
                Op::Update => self.provider.update_lb_config(cfg).await,
            };
            match result {
                Ok(fqdn) => {
                    self.metrics.op_succeeded(op);
                    if let Some(fqdn) = fqdn.filter(|f| !f.is_empty()) {
                        debug!("Endpoint {} resolved to FQDN {}", cfg.endpoint, fqdn);
                        fqdns.insert(fqdn, (*cfg).clone());
                    }
                }
                Err(e) => {
                    self.metrics.op_failed(op);
                    error!("Failed to {} LB config {}: {:#}", op, cfg.endpoint, e);
                }
            }
        }
    }
}
