use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Endpoint configurations keyed by their external endpoint name.
pub type EndpointMap = HashMap<String, EndpointConfig>;

/// One backend instance receiving traffic for an endpoint.
///
/// Equality is by value: two targets are the same member iff both the host IP
/// and the port match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub host_ip: String,
    pub port: String,
}

impl Target {
    pub fn new(host_ip: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host_ip: host_ip.into(),
            port: port.into(),
        }
    }

    /// Composite `HostIP:Port` key used for member names on provider side.
    pub fn key(&self) -> String {
        format!("{}:{}", self.host_ip, self.port)
    }

    /// Parse a `HostIP:Port` member key. Splits on the last `:`.
    pub fn parse(key: &str) -> Result<Self> {
        let Some((ip, port)) = key.rsplit_once(':') else {
            bail!("target '{}' is not in HostIP:Port form", key);
        };
        if ip.is_empty() || port.is_empty() {
            bail!("target '{}' has an empty host or port", key);
        }
        Ok(Self::new(ip, port))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_ip, self.port)
    }
}

/// One externally reachable service endpoint and the backends behind it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Externally visible identifier (hostname, VIP, virtual-service name).
    pub endpoint: String,
    /// `<service>_<stack>_<environment>_<suffix>`; see [`OwnershipScope`].
    pub target_pool_name: String,
    pub target_port: String,
    pub targets: Vec<Target>,
    /// Provider-specific passthrough settings. A missing key means "provider default".
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl EndpointConfig {
    pub fn target_set(&self) -> HashSet<&Target> {
        self.targets.iter().collect()
    }

    /// Whether `self` and `other` describe the same provider state for
    /// reconciliation purposes: pool names match case-insensitively and the
    /// target sets are equal. Labels and target port are not compared.
    pub fn is_equivalent(&self, other: &EndpointConfig) -> bool {
        self.target_pool_name
            .eq_ignore_ascii_case(&other.target_pool_name)
            && self.targets.len() == other.targets.len()
            && self.target_set() == other.target_set()
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut targets: Vec<&Target> = self.targets.iter().collect();
        targets.sort();
        write!(
            f,
            "LBConfig [Endpoint: {}, Pool Name: {}, TargetPort: {}, Targets: ",
            self.endpoint, self.target_pool_name, self.target_port
        )?;
        for t in targets {
            write!(f, "({}) ", t)?;
        }
        write!(f, "]")
    }
}

/// The tenant scope a controller instance owns on a shared provider account.
///
/// Only pool names ending in `_<environment_uuid>_<suffix>` belong to this
/// controller; everything else on the provider is invisible to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipScope {
    pub environment_uuid: String,
    pub suffix: String,
}

impl OwnershipScope {
    pub fn new(environment_uuid: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            environment_uuid: environment_uuid.into(),
            suffix: suffix.into(),
        }
    }

    /// The trailing marker every owned pool name carries.
    pub fn pool_suffix(&self) -> String {
        format!("_{}_{}", self.environment_uuid, self.suffix)
    }

    pub fn pool_name(&self, service: &str, stack: &str) -> String {
        format!("{}_{}{}", service, stack, self.pool_suffix())
    }

    pub fn owns(&self, pool_name: &str) -> bool {
        pool_name.ends_with(&self.pool_suffix())
    }
}

/// Service and stack parsed back out of a target pool name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolName {
    pub service: String,
    pub stack: String,
}

impl PoolName {
    /// Take the first two `_`-delimited components of `pool`.
    pub fn parse(pool: &str) -> Result<Self> {
        let mut parts = pool.split('_');
        match (parts.next(), parts.next()) {
            (Some(service), Some(stack)) if !service.is_empty() && !stack.is_empty() => {
                Ok(Self {
                    service: service.to_string(),
                    stack: stack.to_string(),
                })
            }
            _ => bail!(
                "target pool name '{}' has no <service>_<stack> prefix",
                pool
            ),
        }
    }
}
