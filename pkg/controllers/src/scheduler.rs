use pkg_constants::reconcile::{
    DEFAULT_FORCE_UPDATE_INTERVAL_MIN, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TARGET_POOL_SUFFIX,
    INITIAL_VERSION_TOKEN,
};
use pkg_metrics::ReconcileMetrics;
use pkg_types::{EndpointMap, PoolName};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::engine::{FqdnMap, Reconciler};
use crate::source::{FqdnRegistrar, MetadataSource};

#[derive(Debug, Clone)]
pub struct LbControllerConfig {
    pub poll_interval: Duration,
    /// A pass is forced once this much time has passed since the last sync,
    /// even if the version token has not moved.
    pub force_update_interval: Duration,
    pub target_pool_suffix: String,
}

impl Default for LbControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            force_update_interval: Duration::from_secs(DEFAULT_FORCE_UPDATE_INTERVAL_MIN * 60),
            target_pool_suffix: DEFAULT_TARGET_POOL_SUFFIX.to_string(),
        }
    }
}

/// What a single poll tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Version token unchanged and no forced update due.
    Unchanged,
    /// Token moved but desired state equals the last snapshot.
    Skipped,
    Reconciled { forced: bool, fqdns: usize },
    /// Metadata or provider state could not be read; retried next tick.
    Failed,
}

/// Poll/debounce loop driving the [`Reconciler`].
///
/// Owns the only state carried between passes: last version token, last sync
/// time and last desired snapshot.
pub struct LbController {
    metadata: Arc<dyn MetadataSource>,
    reconciler: Reconciler,
    registrar: Option<Arc<dyn FqdnRegistrar>>,
    metrics: Arc<ReconcileMetrics>,
    config: LbControllerConfig,
    last_version: String,
    last_sync: Instant,
    last_desired: Option<EndpointMap>,
}

impl LbController {
    pub fn new(
        metadata: Arc<dyn MetadataSource>,
        reconciler: Reconciler,
        registrar: Option<Arc<dyn FqdnRegistrar>>,
        metrics: Arc<ReconcileMetrics>,
        config: LbControllerConfig,
    ) -> Self {
        Self {
            metadata,
            reconciler,
            registrar,
            metrics,
            config,
            last_version: INITIAL_VERSION_TOKEN.to_string(),
            last_sync: Instant::now(),
            last_desired: None,
        }
    }

    pub async fn run(mut self) {
        info!(
            "LbController started (poll={}ms, force_update={}s, scope={})",
            self.config.poll_interval.as_millis(),
            self.config.force_update_interval.as_secs(),
            self.reconciler.scope().pool_suffix()
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let version = match self.metadata.version().await {
            Ok(v) => v,
            Err(e) => {
                error!("Error reading metadata version: {:#}", e);
                self.metrics.pass_failed();
                return TickOutcome::Failed;
            }
        };

        let forced = self.last_sync.elapsed() >= self.config.force_update_interval;
        if version == self.last_version && !forced {
            return TickOutcome::Unchanged;
        }
        if forced {
            debug!("Forcing LB update after {}s", self.last_sync.elapsed().as_secs());
        } else {
            debug!("Metadata version changed: {} -> {}", self.last_version, version);
        }

        let desired = match self
            .metadata
            .desired_endpoints(&self.config.target_pool_suffix)
            .await
        {
            Ok(d) => d,
            Err(e) => {
                error!("Failed to get LB configs from metadata: {:#}", e);
                self.metrics.pass_failed();
                return TickOutcome::Failed;
            }
        };

        if !forced && self.last_desired.as_ref() == Some(&desired) {
            debug!("LB configs from metadata did not change");
            self.last_version = version;
            self.metrics.pass_skipped();
            return TickOutcome::Skipped;
        }

        let fqdns = match self.reconciler.reconcile(&desired).await {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to update provider: {:#}", e);
                self.metrics.pass_failed();
                return TickOutcome::Failed;
            }
        };

        self.last_desired = Some(desired);
        self.last_version = version;
        self.last_sync = Instant::now();

        self.register_fqdns(&fqdns).await;
        self.metrics.pass_completed();
        TickOutcome::Reconciled {
            forced,
            fqdns: fqdns.len(),
        }
    }

    async fn register_fqdns(&self, fqdns: &FqdnMap) {
        let Some(registrar) = &self.registrar else {
            return;
        };
        let mut names: Vec<&String> = fqdns.keys().collect();
        names.sort();
        for fqdn in names {
            let cfg = &fqdns[fqdn];
            let pool = match PoolName::parse(&cfg.target_pool_name) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Cannot register FQDN {}: {}", fqdn, e);
                    self.metrics.dns_registration_failed();
                    continue;
                }
            };
            match registrar.register_fqdn(&pool.service, &pool.stack, fqdn).await {
                Ok(()) => info!("Registered FQDN {} for {}/{}", fqdn, pool.stack, pool.service),
                Err(e) => {
                    error!("Failed to register FQDN {}: {:#}", fqdn, e);
                    self.metrics.dns_registration_failed();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeMetadata, FakeProvider, FakeRegistrar, endpoint, owned_pool};
    use pkg_types::OwnershipScope;

    struct Harness {
        provider: Arc<FakeProvider>,
        metadata: Arc<FakeMetadata>,
        registrar: Arc<FakeRegistrar>,
        metrics: Arc<ReconcileMetrics>,
        controller: LbController,
    }

    fn harness(force_update_interval: Duration) -> Harness {
        let provider = Arc::new(FakeProvider::new());
        let metadata = Arc::new(FakeMetadata::new(
            "v1",
            vec![endpoint("svc.example.com", &owned_pool("svc"), &[("10.0.0.1", "80")])],
        ));
        let registrar = Arc::new(FakeRegistrar::default());
        let metrics = Arc::new(ReconcileMetrics::new());
        let reconciler = Reconciler::new(
            provider.clone(),
            OwnershipScope::new("env1", "suffix"),
            metrics.clone(),
        );
        let controller = LbController::new(
            metadata.clone(),
            reconciler,
            Some(registrar.clone()),
            metrics.clone(),
            LbControllerConfig {
                poll_interval: Duration::from_millis(10),
                force_update_interval,
                target_pool_suffix: "suffix".to_string(),
            },
        );
        Harness {
            provider,
            metadata,
            registrar,
            metrics,
            controller,
        }
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn first_tick_reconciles_and_registers_fqdns() {
        let mut h = harness(HOUR);
        h.provider.set_fqdn("svc.example.com", "svc.lb.net");

        let outcome = h.controller.tick().await;

        assert_eq!(outcome, TickOutcome::Reconciled { forced: false, fqdns: 1 });
        assert_eq!(h.provider.calls().len(), 1);
        assert_eq!(
            h.registrar.registered(),
            vec![("svc".to_string(), "stack".to_string(), "svc.lb.net".to_string())]
        );
        assert_eq!(h.metrics.passes(), 1);
    }

    #[tokio::test]
    async fn unchanged_version_does_not_fetch_or_reconcile() {
        let mut h = harness(HOUR);
        h.controller.tick().await;
        let reads = h.provider.reads();

        assert_eq!(h.controller.tick().await, TickOutcome::Unchanged);
        assert_eq!(h.controller.tick().await, TickOutcome::Unchanged);

        assert_eq!(h.metadata.fetches(), 1);
        assert_eq!(h.provider.reads(), reads);
    }

    #[tokio::test]
    async fn spurious_version_bump_is_debounced() {
        let mut h = harness(HOUR);
        h.controller.tick().await;
        let reads = h.provider.reads();

        h.metadata.set_version("v2");
        assert_eq!(h.controller.tick().await, TickOutcome::Skipped);
        assert_eq!(h.provider.reads(), reads);
        assert_eq!(h.metrics.passes_skipped(), 1);

        // token was recorded, so the next tick does not refetch
        assert_eq!(h.controller.tick().await, TickOutcome::Unchanged);
        assert_eq!(h.metadata.fetches(), 2);
    }

    #[tokio::test]
    async fn changed_desired_state_triggers_pass() {
        let mut h = harness(HOUR);
        h.controller.tick().await;

        h.metadata.set_version("v2");
        h.metadata.set_desired(vec![endpoint(
            "svc.example.com",
            &owned_pool("svc"),
            &[("10.0.0.1", "80"), ("10.0.0.2", "80")],
        )]);

        assert!(matches!(
            h.controller.tick().await,
            TickOutcome::Reconciled { forced: false, .. }
        ));
        let kinds: Vec<&str> = h.provider.calls().iter().map(Call::kind).collect();
        assert_eq!(kinds, vec!["add", "update"]);
    }

    #[tokio::test]
    async fn force_interval_bypasses_debounce() {
        let mut h = harness(Duration::ZERO);
        h.controller.tick().await;
        let reads = h.provider.reads();

        assert_eq!(
            h.controller.tick().await,
            TickOutcome::Reconciled { forced: true, fqdns: 0 }
        );
        assert_eq!(h.provider.reads(), reads + 1);
        // provider already converged, nothing to mutate
        assert_eq!(h.provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_metadata_fetch_is_retried_next_tick() {
        let mut h = harness(HOUR);
        h.metadata.fail_desired(true);

        assert_eq!(h.controller.tick().await, TickOutcome::Failed);
        assert!(h.provider.calls().is_empty());

        h.metadata.fail_desired(false);
        assert!(matches!(h.controller.tick().await, TickOutcome::Reconciled { .. }));
        assert_eq!(h.metrics.passes_failed(), 1);
    }

    #[tokio::test]
    async fn failed_version_read_leaves_state_alone() {
        let mut h = harness(HOUR);
        h.metadata.fail_version(true);

        assert_eq!(h.controller.tick().await, TickOutcome::Failed);
        assert_eq!(h.metadata.fetches(), 0);

        h.metadata.fail_version(false);
        assert!(matches!(h.controller.tick().await, TickOutcome::Reconciled { .. }));
    }

    #[tokio::test]
    async fn provider_read_failure_keeps_snapshot_for_retry() {
        let mut h = harness(HOUR);
        h.provider.fail_reads(true);

        assert_eq!(h.controller.tick().await, TickOutcome::Failed);

        h.provider.fail_reads(false);
        // same token, but nothing was recorded so the pass runs again
        assert!(matches!(h.controller.tick().await, TickOutcome::Reconciled { .. }));
        assert_eq!(h.provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn dns_failures_are_isolated() {
        let mut h = harness(HOUR);
        h.metadata.set_desired(vec![
            endpoint("a.example.com", &owned_pool("a"), &[("10.0.0.1", "80")]),
            endpoint("b.example.com", &owned_pool("b"), &[("10.0.0.2", "80")]),
        ]);
        h.provider.set_fqdn("a.example.com", "a.lb.net");
        h.provider.set_fqdn("b.example.com", "b.lb.net");
        h.registrar.fail_on("a.lb.net");

        let outcome = h.controller.tick().await;

        assert_eq!(outcome, TickOutcome::Reconciled { forced: false, fqdns: 2 });
        assert_eq!(
            h.registrar.registered(),
            vec![("b".to_string(), "stack".to_string(), "b.lb.net".to_string())]
        );
        assert!(
            h.metrics
                .render()
                .contains("external_lb_dns_registration_failures_total 1\n")
        );
    }
}
