//! Rancher metadata service client: version token, environment discovery and
//! desired endpoint state.

pub mod extract;
pub mod model;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use pkg_constants::metadata::{ENV_DISCOVERY_BUDGET_SECS, ENV_DISCOVERY_INITIAL_DELAY_SECS};
use pkg_constants::network::HTTP_REQUEST_TIMEOUT_SECS;
use pkg_controllers::MetadataSource;
use pkg_types::{EndpointMap, OwnershipScope};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::model::{Service, Stack};

/// Doubling retry schedule for environment discovery.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub budget: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(ENV_DISCOVERY_INITIAL_DELAY_SECS),
            budget: Duration::from_secs(ENV_DISCOVERY_BUDGET_SECS),
        }
    }
}

impl Backoff {
    /// Delays slept after each failed attempt: `initial`, doubling, while below `budget`.
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut next = self.initial;
        while next < self.budget && !next.is_zero() {
            delays.push(next);
            next *= 2;
        }
        delays
    }
}

pub struct MetadataClient {
    client: reqwest::Client,
    base: String,
    environment_uuid: String,
}

impl MetadataClient {
    /// Connect and resolve the environment UUID, retrying per `backoff`.
    pub async fn connect(url: &str, backoff: Backoff) -> Result<Self> {
        debug!("Initializing rancher-metadata client for {}", url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()?;
        let mut this = Self {
            client,
            base: url.trim_end_matches('/').to_string(),
            environment_uuid: String::new(),
        };
        this.environment_uuid = this.discover_environment(backoff).await?;
        info!("Metadata environment UUID: {}", this.environment_uuid);
        Ok(this)
    }

    async fn discover_environment(&self, backoff: Backoff) -> Result<String> {
        let mut last = anyhow!("no discovery attempt made");
        let delays = backoff.delays();
        for (attempt, delay) in delays.iter().enumerate() {
            match self.self_stack().await {
                Ok(stack) if !stack.environment_uuid.is_empty() => {
                    return Ok(stack.environment_uuid);
                }
                Ok(_) => last = anyhow!("stack metadata has no environment_uuid"),
                Err(e) => last = e,
            }
            if attempt + 1 == delays.len() {
                break;
            }
            error!("Error reading stack info: {:#}...will retry", last);
            tokio::time::sleep(*delay).await;
        }
        Err(last.context("Error reading stack metadata info"))
    }

    async fn self_stack(&self) -> Result<Stack> {
        self.get_json("/self/stack").await
    }

    pub async fn services(&self) -> Result<Vec<Service>> {
        self.get_json("/services").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        if !resp.status().is_success() {
            bail!("GET {} returned {}", url, resp.status());
        }
        resp.json()
            .await
            .with_context(|| format!("GET {}: unexpected response body", url))
    }
}

#[async_trait]
impl MetadataSource for MetadataClient {
    fn environment_uuid(&self) -> &str {
        &self.environment_uuid
    }

    async fn version(&self) -> Result<String> {
        let url = format!("{}/version", self.base);
        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        if !resp.status().is_success() {
            bail!("GET {} returned {}", url, resp.status());
        }
        let body = resp.text().await?;
        Ok(body.trim().trim_matches('"').to_string())
    }

    async fn desired_endpoints(&self, suffix: &str) -> Result<EndpointMap> {
        let services = self
            .services()
            .await
            .context("Error reading services")?;
        let scope = OwnershipScope::new(self.environment_uuid.clone(), suffix);
        Ok(extract::desired_endpoints(&services, &scope))
    }

    async fn probe(&self) -> Result<()> {
        self.self_stack().await.map(|_| ())
    }
}
