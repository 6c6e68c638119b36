use serde::{Deserialize, Serialize};

/// Controller configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// provider: f5_BigIP
/// poll-interval-ms: 1000
/// force-update-interval-min: 1
/// target-pool-suffix: rancher.internal
/// metadata-url: http://rancher-metadata/2015-12-19
/// healthcheck-port: 1000
/// providers:
///   f5:
///     host: 10.1.1.245
///     user: admin
///     password: secret
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfigFile {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default, alias = "poll-interval-ms")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, alias = "force-update-interval-min")]
    pub force_update_interval_min: Option<u64>,
    #[serde(default, alias = "target-pool-suffix")]
    pub target_pool_suffix: Option<String>,
    #[serde(default, alias = "metadata-url")]
    pub metadata_url: Option<String>,
    #[serde(default, alias = "healthcheck-port")]
    pub healthcheck_port: Option<u16>,
    #[serde(default)]
    pub cattle: Option<CattleSettings>,
    #[serde(default)]
    pub providers: ProviderSettings,
}

/// Credentials for the Cattle API used to publish external DNS events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CattleSettings {
    pub url: String,
    #[serde(alias = "access-key")]
    pub access_key: String,
    #[serde(alias = "secret-key")]
    pub secret_key: String,
}

/// Per-provider connection settings. Only the selected provider's section is read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub f5: Option<F5Settings>,
    #[serde(default)]
    pub zevenet: Option<ZevenetSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct F5Settings {
    pub host: String,
    pub user: String,
    pub password: String,
    /// Accept self-signed management certificates.
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZevenetSettings {
    pub host: String,
    pub key: String,
    pub farm: String,
    #[serde(default)]
    pub insecure: bool,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg: ControllerConfigFile =
            load_config_file("/nonexistent/external-lb/config.yaml").unwrap();
        assert!(cfg.provider.is_none());
        assert!(cfg.providers.f5.is_none());
    }

    #[test]
    fn parses_kebab_case_keys() {
        let yaml = r#"
provider: zevenet
poll-interval-ms: 500
force-update-interval-min: 5
target-pool-suffix: lb.internal
providers:
  zevenet:
    host: lb.example.com:444
    key: abc
    farm: MainHTTP
"#;
        let cfg: ControllerConfigFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.provider.as_deref(), Some("zevenet"));
        assert_eq!(cfg.poll_interval_ms, Some(500));
        assert_eq!(cfg.force_update_interval_min, Some(5));
        assert_eq!(cfg.target_pool_suffix.as_deref(), Some("lb.internal"));
        let z = cfg.providers.zevenet.unwrap();
        assert_eq!(z.farm, "MainHTTP");
        assert!(!z.insecure);
    }
}
