//! F5 BIG-IP adapter speaking iControl REST.
//!
//! Endpoint = virtual server name, target pool = LTM pool, targets = pool
//! members named `ip:port`. Virtual servers are never created or deleted here.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use pkg_types::config::{F5Settings, ProviderSettings};
use pkg_types::{EndpointConfig, Target, diff_targets};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::Provider;
use crate::rest::{Auth, RestClient};

const PARTITION: &str = "/Common/";

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct VirtualServer {
    name: String,
    #[serde(default)]
    pool: Option<String>,
    #[serde(default)]
    destination: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PoolMember {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    address: String,
}

#[derive(Serialize)]
struct NewNode<'a> {
    name: &'a str,
    address: &'a str,
}

#[derive(Serialize)]
struct NewNamed<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolNat {
    allow_nat: &'static str,
    allow_snat: &'static str,
}

#[derive(Serialize)]
struct VirtualPool<'a> {
    pool: &'a str,
}

pub struct F5Provider {
    rest: RestClient,
}

impl F5Provider {
    pub const NAME: &'static str = "F5 BigIP";
    pub const SLUG: &'static str = "f5_BigIP";

    pub fn new(settings: &F5Settings) -> Result<Self> {
        if settings.host.is_empty() {
            bail!("F5_BIGIP_HOST is not set");
        }
        if settings.user.is_empty() {
            bail!("F5_BIGIP_USER is not set");
        }
        if settings.password.is_empty() {
            bail!("F5_BIGIP_PWD is not set");
        }
        debug!(
            "Initializing f5 provider with host: {}, admin: {}, pwd-length: {}",
            settings.host,
            settings.user,
            settings.password.len()
        );
        let rest = RestClient::new(
            &settings.host,
            "/mgmt/tm/ltm",
            Auth::Basic {
                user: settings.user.clone(),
                password: settings.password.clone(),
            },
            settings.insecure,
        )?;
        Ok(Self { rest })
    }

    pub fn factory(settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
        let f5 = settings
            .f5
            .as_ref()
            .ok_or_else(|| anyhow!("F5_BIGIP_HOST is not set"))?;
        Ok(Arc::new(Self::new(f5)?))
    }

    async fn virtual_server(&self, name: &str) -> Result<Option<VirtualServer>> {
        self.rest.get(&format!("/virtual/{}", object_path(name))).await
    }

    async fn pool_exists(&self, pool: &str) -> Result<bool> {
        let found: Option<serde_json::Value> =
            self.rest.get(&format!("/pool/{}", object_path(pool))).await?;
        Ok(found.is_some())
    }

    async fn pool_members(&self, pool: &str) -> Result<Vec<Target>> {
        let members: Option<Collection<PoolMember>> = self
            .rest
            .get(&format!("/pool/{}/members", object_path(pool)))
            .await?;
        Ok(members
            .map(|c| c.items)
            .unwrap_or_default()
            .iter()
            .filter_map(|m| member_target(&m.name))
            .collect())
    }

    async fn ensure_node(&self, ip: &str) -> Result<()> {
        let node: Option<Node> = self.rest.get(&format!("/node/{}", object_path(ip))).await?;
        if node.is_some_and(|n| n.address == ip) {
            return Ok(());
        }
        self.rest
            .post("/node", &NewNode { name: ip, address: ip })
            .await
            .with_context(|| format!("creating node {}", ip))?;
        debug!("f5: created node {}", ip);
        Ok(())
    }

    /// Shared body of add and update. With `prune` set, members not in
    /// `config.targets` are removed as well.
    async fn apply(&self, config: &EndpointConfig, prune: bool) -> Result<()> {
        if self.virtual_server(&config.endpoint).await?.is_none() {
            bail!("virtual server '{}' does not exist", config.endpoint);
        }

        let mut ips: Vec<&str> = config.targets.iter().map(|t| t.host_ip.as_str()).collect();
        ips.sort_unstable();
        ips.dedup();
        for ip in ips {
            self.ensure_node(ip).await?;
        }

        let pool = config.target_pool_name.as_str();
        if !self.pool_exists(pool).await? {
            self.rest
                .post("/pool", &NewNamed { name: pool })
                .await
                .with_context(|| format!("creating pool {}", pool))?;
        }
        self.rest
            .patch(
                &format!("/pool/{}", object_path(pool)),
                &PoolNat {
                    allow_nat: "yes",
                    allow_snat: "yes",
                },
            )
            .await
            .with_context(|| format!("modifying pool {}", pool))?;

        let current = self.pool_members(pool).await?;
        let delta = diff_targets(&current, &config.targets);
        for target in delta.sorted_to_add() {
            self.rest
                .post(
                    &format!("/pool/{}/members", object_path(pool)),
                    &NewNamed { name: &target.key() },
                )
                .await
                .with_context(|| format!("adding member {} to pool {}", target, pool))?;
        }
        if prune {
            for target in delta.sorted_to_remove() {
                self.rest
                    .delete(&format!(
                        "/pool/{}/members/{}",
                        object_path(pool),
                        object_path(&target.key())
                    ))
                    .await
                    .with_context(|| format!("removing member {} from pool {}", target, pool))?;
            }
        }

        self.rest
            .patch(
                &format!("/virtual/{}", object_path(&config.endpoint)),
                &VirtualPool { pool },
            )
            .await
            .with_context(|| format!("attaching pool {} to {}", pool, config.endpoint))?;
        Ok(())
    }
}

#[async_trait]
impl Provider for F5Provider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn health_check(&self) -> Result<()> {
        let pools: Option<Collection<serde_json::Value>> = self
            .rest
            .get("/pool")
            .await
            .context("Failed to list f5 pools")?;
        pools
            .map(|_| ())
            .ok_or_else(|| anyhow!("Failed to list f5 pools: pool collection not found"))
    }

    async fn get_lb_configs(&self) -> Result<Vec<EndpointConfig>> {
        let servers: Collection<VirtualServer> = self
            .rest
            .get("/virtual")
            .await
            .context("listing f5 virtual servers")?
            .unwrap_or(Collection { items: Vec::new() });

        let mut configs = Vec::new();
        for vs in servers.items {
            let Some(pool) = vs.pool.as_deref().map(strip_partition) else {
                continue;
            };
            if pool.is_empty() {
                continue;
            }
            let targets = match self.pool_members(pool).await {
                Ok(t) => t,
                Err(e) => {
                    error!("f5: listing members of pool {} failed: {:#}", pool, e);
                    continue;
                }
            };
            configs.push(EndpointConfig {
                endpoint: vs.name.clone(),
                target_pool_name: pool.to_string(),
                target_port: vs
                    .destination
                    .as_deref()
                    .and_then(destination_port)
                    .unwrap_or_default(),
                targets,
                ..Default::default()
            });
        }
        debug!("f5: {} virtual servers with pools", configs.len());
        Ok(configs)
    }

    async fn add_lb_config(&self, config: &EndpointConfig) -> Result<Option<String>> {
        self.apply(config, false)
            .await
            .with_context(|| format!("f5 add {}", config.endpoint))?;
        Ok(None)
    }

    async fn update_lb_config(&self, config: &EndpointConfig) -> Result<Option<String>> {
        self.apply(config, true)
            .await
            .with_context(|| format!("f5 update {}", config.endpoint))?;
        Ok(None)
    }

    async fn remove_lb_config(&self, config: &EndpointConfig) -> Result<()> {
        let ctx = || format!("f5 remove {}", config.endpoint);
        if self.virtual_server(&config.endpoint).await.with_context(ctx)?.is_none() {
            info!("f5: virtual server {} already gone", config.endpoint);
            return Ok(());
        }
        self.rest
            .patch(
                &format!("/virtual/{}", object_path(&config.endpoint)),
                &VirtualPool { pool: "None" },
            )
            .await
            .with_context(ctx)?;

        let pool = config.target_pool_name.as_str();
        let members = self.pool_members(pool).await.with_context(ctx)?;
        if !self
            .rest
            .delete(&format!("/pool/{}", object_path(pool)))
            .await
            .with_context(ctx)?
        {
            debug!("f5: pool {} already gone", pool);
        }

        for member in members {
            if let Err(e) = self
                .rest
                .delete(&format!("/node/{}", object_path(&member.host_ip)))
                .await
            {
                // nodes may still back other pools
                warn!("f5: could not remove node {}: {:#}", member.host_ip, e);
            }
        }
        Ok(())
    }
}

/// `name` → `~Common~name`, the iControl REST object path form.
fn object_path(name: &str) -> String {
    format!("~Common~{}", strip_partition(name))
}

fn strip_partition(name: &str) -> &str {
    name.strip_prefix(PARTITION).unwrap_or(name)
}

fn member_target(name: &str) -> Option<Target> {
    Target::parse(strip_partition(name)).ok()
}

/// `/Common/10.0.0.1:443` → `443`. Route-domain suffixes (`%1`) are dropped.
fn destination_port(destination: &str) -> Option<String> {
    let (_, port) = destination.rsplit_once(':')?;
    let port = port.split('%').next().unwrap_or(port);
    (!port.is_empty()).then(|| port.to_string())
}
