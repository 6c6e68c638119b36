//! Command line / environment parsing and the merge with the YAML config file.

use anyhow::{Result, bail};
use clap::{Args, Parser};
use pkg_constants::metadata::DEFAULT_METADATA_URL;
use pkg_constants::network::{DEFAULT_CONFIG_PATH, DEFAULT_HEALTHCHECK_PORT};
use pkg_constants::reconcile::{
    DEFAULT_FORCE_UPDATE_INTERVAL_MIN, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TARGET_POOL_SUFFIX,
};
use pkg_types::config::{
    CattleSettings, ControllerConfigFile, F5Settings, ProviderSettings, ZevenetSettings,
};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "external-lb",
    about = "Keeps an external load balancer in sync with Rancher service metadata"
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(long, short, env = "EXTERNAL_LB_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Provider to use (f5_BigIP, zevenet)
    #[arg(long, env = "LB_PROVIDER")]
    pub provider: Option<String>,

    /// Metadata poll interval in milliseconds
    #[arg(long, env = "POLL_INTERVAL")]
    pub poll_interval_ms: Option<u64>,

    /// Force a reconciliation pass after this many minutes without one
    #[arg(long, env = "FORCE_UPDATE_INTERVAL")]
    pub force_update_interval_min: Option<u64>,

    /// Trailing token of every target pool name this instance owns
    #[arg(long, env = "LB_TARGET_RANCHER_SUFFIX")]
    pub target_pool_suffix: Option<String>,

    #[arg(long, env = "METADATA_URL")]
    pub metadata_url: Option<String>,

    #[arg(long, env = "HEALTH_CHECK_PORT")]
    pub healthcheck_port: Option<u16>,

    /// Debug logging
    #[arg(long, env = "EXTERNAL_LB_DEBUG", default_value_t = false)]
    pub debug: bool,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<String>,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    pub log_json: bool,

    #[command(flatten)]
    pub f5: F5Args,

    #[command(flatten)]
    pub zevenet: ZevenetArgs,

    #[command(flatten)]
    pub cattle: CattleArgs,
}

#[derive(Args, Debug, Default)]
pub struct F5Args {
    #[arg(id = "f5_host", long = "f5-host", env = "F5_BIGIP_HOST")]
    pub host: Option<String>,
    #[arg(long = "f5-user", env = "F5_BIGIP_USER")]
    pub user: Option<String>,
    #[arg(long = "f5-password", env = "F5_BIGIP_PWD", hide_env_values = true)]
    pub password: Option<String>,
    #[arg(id = "f5_insecure", long = "f5-insecure", env = "F5_BIGIP_INSECURE")]
    pub insecure: Option<bool>,
}

#[derive(Args, Debug, Default)]
pub struct ZevenetArgs {
    #[arg(id = "zapi_host", long = "zapi-host", env = "ZAPI_HOST")]
    pub host: Option<String>,
    #[arg(long = "zapi-key", env = "ZAPI_KEY", hide_env_values = true)]
    pub key: Option<String>,
    #[arg(long = "zapi-farm", env = "ZAPI_FARM")]
    pub farm: Option<String>,
    #[arg(id = "zapi_insecure", long = "zapi-insecure", env = "ZAPI_INSECURE")]
    pub insecure: Option<bool>,
}

#[derive(Args, Debug, Default)]
pub struct CattleArgs {
    #[arg(long = "cattle-url", env = "CATTLE_URL")]
    pub url: Option<String>,
    #[arg(long = "cattle-access-key", env = "CATTLE_ACCESS_KEY")]
    pub access_key: Option<String>,
    #[arg(long = "cattle-secret-key", env = "CATTLE_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,
}

/// Fully merged runtime settings.
#[derive(Debug)]
pub struct Settings {
    pub provider: String,
    pub poll_interval: Duration,
    pub force_update_interval: Duration,
    pub target_pool_suffix: String,
    pub metadata_url: String,
    pub healthcheck_port: u16,
    pub providers: ProviderSettings,
    pub cattle: Option<CattleSettings>,
}

impl Settings {
    /// Merge: CLI args / env > config file > defaults.
    pub fn merge(cli: Cli, file: ControllerConfigFile) -> Result<Self> {
        let Some(provider) = cli.provider.or(file.provider).filter(|p| !p.is_empty()) else {
            bail!("LB_PROVIDER is not set");
        };

        let poll_ms = cli
            .poll_interval_ms
            .or(file.poll_interval_ms)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if poll_ms == 0 {
            bail!("poll interval must be greater than zero");
        }
        let force_min = cli
            .force_update_interval_min
            .or(file.force_update_interval_min)
            .unwrap_or(DEFAULT_FORCE_UPDATE_INTERVAL_MIN);
        if force_min == 0 {
            bail!("force update interval must be greater than zero");
        }

        Ok(Self {
            provider,
            poll_interval: Duration::from_millis(poll_ms),
            force_update_interval: Duration::from_secs(force_min * 60),
            target_pool_suffix: cli
                .target_pool_suffix
                .or(file.target_pool_suffix)
                .unwrap_or_else(|| DEFAULT_TARGET_POOL_SUFFIX.to_string()),
            metadata_url: cli
                .metadata_url
                .or(file.metadata_url)
                .unwrap_or_else(|| DEFAULT_METADATA_URL.to_string()),
            healthcheck_port: cli
                .healthcheck_port
                .or(file.healthcheck_port)
                .unwrap_or(DEFAULT_HEALTHCHECK_PORT),
            providers: ProviderSettings {
                f5: merge_f5(cli.f5, file.providers.f5),
                zevenet: merge_zevenet(cli.zevenet, file.providers.zevenet),
            },
            cattle: merge_cattle(cli.cattle, file.cattle)?,
        })
    }
}

fn merge_f5(args: F5Args, file: Option<F5Settings>) -> Option<F5Settings> {
    let file = file.unwrap_or_default();
    let host = args.host.unwrap_or(file.host);
    if host.is_empty() {
        return None;
    }
    Some(F5Settings {
        host,
        user: args.user.unwrap_or(file.user),
        password: args.password.unwrap_or(file.password),
        insecure: args.insecure.unwrap_or(file.insecure),
    })
}

fn merge_zevenet(args: ZevenetArgs, file: Option<ZevenetSettings>) -> Option<ZevenetSettings> {
    let file = file.unwrap_or_default();
    let host = args.host.unwrap_or(file.host);
    if host.is_empty() {
        return None;
    }
    Some(ZevenetSettings {
        host,
        key: args.key.unwrap_or(file.key),
        farm: args.farm.unwrap_or(file.farm),
        insecure: args.insecure.unwrap_or(file.insecure),
    })
}

/// `None` when no Cattle URL is configured; both keys are then required.
fn merge_cattle(args: CattleArgs, file: Option<CattleSettings>) -> Result<Option<CattleSettings>> {
    let file = file.unwrap_or_default();
    let url = args.url.unwrap_or(file.url);
    if url.is_empty() {
        return Ok(None);
    }
    let access_key = args.access_key.unwrap_or(file.access_key);
    if access_key.is_empty() {
        bail!("CATTLE_ACCESS_KEY is not set");
    }
    let secret_key = args.secret_key.unwrap_or(file.secret_key);
    if secret_key.is_empty() {
        bail!("CATTLE_SECRET_KEY is not set");
    }
    Ok(Some(CattleSettings {
        url,
        access_key,
        secret_key,
    }))
}
