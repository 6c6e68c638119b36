//! Zevenet adapter speaking ZAPI v3.
//!
//! One farm per process. Each endpoint is a farm service whose id encodes the
//! target pool name; targets are the service's backends.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use pkg_types::config::{ProviderSettings, ZevenetSettings};
use pkg_types::{EndpointConfig, Target, diff_targets};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::Provider;
use crate::rest::{Auth, RestClient};

/// Label carrying an HTTP redirect URL; honoured on HTTP farms only.
pub const LABEL_HTTP_REDIRECT_URL: &str = "httpRedirectUrl";

const LISTENER_HTTP: &str = "http";

#[derive(Debug, Deserialize)]
struct Farm {
    params: FarmParams,
    #[serde(default)]
    services: Vec<Service>,
}

#[derive(Debug, Deserialize)]
struct FarmParams {
    #[serde(default)]
    listener: String,
    #[serde(default)]
    vport: u16,
}

#[derive(Debug, Deserialize)]
struct Service {
    id: String,
    #[serde(default)]
    hostpattern: String,
    #[serde(default)]
    backends: Vec<Backend>,
}

#[derive(Debug, Clone, Deserialize)]
struct Backend {
    id: u32,
    ip: String,
    port: u16,
}

impl Backend {
    fn target(&self) -> Target {
        Target::new(self.ip.clone(), self.port.to_string())
    }
}

#[derive(Serialize)]
struct NewService<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct ServiceSettings<'a> {
    hostpattern: &'a str,
    redirect: &'a str,
}

#[derive(Serialize)]
struct NewBackend<'a> {
    ip: &'a str,
    port: u16,
}

#[derive(Serialize)]
struct FarmAction {
    action: &'static str,
}

pub struct ZevenetProvider {
    rest: RestClient,
    farm: String,
}

impl ZevenetProvider {
    pub const NAME: &'static str = "Zevenet";
    pub const SLUG: &'static str = "zevenet";

    pub fn new(settings: &ZevenetSettings) -> Result<Self> {
        if settings.host.is_empty() {
            bail!("ZAPI_HOST is not set");
        }
        if settings.key.is_empty() {
            bail!("ZAPI_KEY is not set");
        }
        if settings.farm.is_empty() {
            bail!("ZAPI_FARM is not set");
        }
        debug!(
            "Initializing Zevenet provider with farm {} on host: {}, key-length: {}",
            settings.farm,
            settings.host,
            settings.key.len()
        );
        let rest = RestClient::new(
            &settings.host,
            "/zapi/v3/zapi.cgi",
            Auth::Header {
                name: "ZAPI_KEY",
                value: settings.key.clone(),
            },
            settings.insecure,
        )?;
        Ok(Self {
            rest,
            farm: settings.farm.clone(),
        })
    }

    pub fn factory(settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
        let z = settings
            .zevenet
            .as_ref()
            .ok_or_else(|| anyhow!("ZAPI_HOST is not set"))?;
        Ok(Arc::new(Self::new(z)?))
    }

    async fn farm(&self) -> Result<Farm> {
        self.rest
            .get(&format!("/farms/{}", self.farm))
            .await
            .context("Failed to get farm from Zevenet loadbalancer")?
            .ok_or_else(|| anyhow!("Farm not found on Zevenet loadbalancer: {}", self.farm))
    }

    async fn restart(&self) -> Result<()> {
        self.rest
            .post(
                &format!("/farms/{}/actions", self.farm),
                &FarmAction { action: "restart" },
            )
            .await
            .context("Failed to restart farm on Zevenet loadbalancer")
    }

    /// Shared body of add and update. With `prune` set, backends not in
    /// `config.targets` are deleted as well.
    async fn apply(&self, config: &EndpointConfig, prune: bool) -> Result<()> {
        let farm = self.farm().await?;
        let name = service_name(&config.target_pool_name);

        let redirect = if farm.params.listener == LISTENER_HTTP {
            config.label(LABEL_HTTP_REDIRECT_URL).unwrap_or_default()
        } else {
            ""
        };

        let existing: Vec<Backend> = match farm.services.iter().find(|s| s.id == name) {
            Some(service) => service.backends.clone(),
            None => {
                self.rest
                    .post(
                        &format!("/farms/{}/services", self.farm),
                        &NewService { id: &name },
                    )
                    .await
                    .context("Failed to create service on Zevenet loadbalancer")?;
                Vec::new()
            }
        };

        self.rest
            .put(
                &format!("/farms/{}/services/{}", self.farm, name),
                &ServiceSettings {
                    hostpattern: &config.endpoint,
                    redirect,
                },
            )
            .await
            .context("Failed to update service on Zevenet loadbalancer")?;

        // a redirecting service has no backends
        let desired: &[Target] = if redirect.is_empty() {
            &config.targets
        } else {
            &[]
        };
        let current: Vec<Target> = existing.iter().map(Backend::target).collect();
        let delta = diff_targets(&current, desired);

        for target in delta.sorted_to_add() {
            let port: u16 = target
                .port
                .parse()
                .with_context(|| format!("Failed to parse port number '{}'", target.port))?;
            self.rest
                .post(
                    &format!("/farms/{}/services/{}/backends", self.farm, name),
                    &NewBackend {
                        ip: &target.host_ip,
                        port,
                    },
                )
                .await
                .context("Failed to create backend on Zevenet loadbalancer")?;
        }

        if prune {
            let stale = farm.services.iter().filter(|s| {
                s.id != name
                    && s.hostpattern == config.endpoint
                    && same_owner(&pool_name(&s.id), &config.target_pool_name)
            });
            for service in stale {
                self.rest
                    .delete(&format!("/farms/{}/services/{}", self.farm, service.id))
                    .await
                    .context("Failed to delete stale service from Zevenet loadbalancer")?;
                info!(
                    "zevenet: removed service {} superseded by {} for {}",
                    service.id, name, config.endpoint
                );
            }

            for backend in existing.iter().filter(|b| delta.to_remove.contains(&b.target())) {
                self.rest
                    .delete(&format!(
                        "/farms/{}/services/{}/backends/{}",
                        self.farm, name, backend.id
                    ))
                    .await
                    .context("Failed to delete backend on Zevenet loadbalancer")?;
            }
        }

        self.restart().await
    }
}

#[async_trait]
impl Provider for ZevenetProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn health_check(&self) -> Result<()> {
        let version: Option<serde_json::Value> = self
            .rest
            .get("/system/version")
            .await
            .context("Failed to ping Zevenet loadbalancer")?;
        version
            .map(|_| ())
            .ok_or_else(|| anyhow!("Failed to ping Zevenet loadbalancer: no version endpoint"))
    }

    async fn get_lb_configs(&self) -> Result<Vec<EndpointConfig>> {
        let farm = self.farm().await?;
        let port = farm.params.vport.to_string();
        Ok(farm
            .services
            .into_iter()
            .map(|service| EndpointConfig {
                endpoint: service.hostpattern,
                target_pool_name: pool_name(&service.id),
                target_port: port.clone(),
                targets: service.backends.iter().map(Backend::target).collect(),
                ..Default::default()
            })
            .collect())
    }

    async fn add_lb_config(&self, config: &EndpointConfig) -> Result<Option<String>> {
        self.apply(config, false)
            .await
            .with_context(|| format!("zevenet add {} on farm {}", config.endpoint, self.farm))?;
        Ok(None)
    }

    async fn update_lb_config(&self, config: &EndpointConfig) -> Result<Option<String>> {
        self.apply(config, true)
            .await
            .with_context(|| format!("zevenet update {} on farm {}", config.endpoint, self.farm))?;
        Ok(None)
    }

    async fn remove_lb_config(&self, config: &EndpointConfig) -> Result<()> {
        let ctx = || format!("zevenet remove {} on farm {}", config.endpoint, self.farm);
        let name = service_name(&config.target_pool_name);
        let deleted = self
            .rest
            .delete(&format!("/farms/{}/services/{}", self.farm, name))
            .await
            .context("Failed to delete service from Zevenet loadbalancer")
            .with_context(ctx)?;
        if !deleted {
            info!("zevenet: service {} already absent", name);
            return Ok(());
        }
        self.restart().await.with_context(ctx)
    }
}

/// Whether two pool names carry the same `<environment>_<suffix>` tail.
fn same_owner(a: &str, b: &str) -> bool {
    fn tail(pool: &str) -> Option<&str> {
        pool.splitn(3, '_').nth(2)
    }
    matches!((tail(a), tail(b)), (Some(x), Some(y)) if x == y)
}

/// Zevenet service ids may not contain `.` or `_`.
pub fn service_name(pool_name: &str) -> String {
    pool_name.replace('.', "--D--").replace('_', "--U--")
}

pub fn pool_name(service_name: &str) -> String {
    service_name.replace("--D--", ".").replace("--U--", "_")
}
