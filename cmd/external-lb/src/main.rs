mod settings;

use anyhow::Context;
use clap::Parser;
use pkg_api::AppState;
use pkg_api::server::start_healthcheck;
use pkg_cattle::CattleClient;
use pkg_controllers::{
    FqdnRegistrar, LbController, LbControllerConfig, MetadataSource, Reconciler,
};
use pkg_metadata::{Backoff, MetadataClient};
use pkg_metrics::ReconcileMetrics;
use pkg_providers::registry::ProviderRegistry;
use pkg_types::OwnershipScope;
use pkg_types::config::{ControllerConfigFile, load_config_file};
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::settings::{Cli, Settings};

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let default = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let writer = match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if cli.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_writer(writer).boxed()
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    // Load config file (returns defaults if file not found)
    let file_cfg: ControllerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);
    let settings = Settings::merge(cli, file_cfg)?;

    info!("Starting external-lb");
    info!("  Provider:       {}", settings.provider);
    info!("  Poll interval:  {}ms", settings.poll_interval.as_millis());
    info!("  Force update:   {}s", settings.force_update_interval.as_secs());
    info!("  Pool suffix:    {}", settings.target_pool_suffix);
    info!("  Metadata:       {}", settings.metadata_url);

    let metadata = Arc::new(
        MetadataClient::connect(&settings.metadata_url, Backoff::default())
            .await
            .context("Failed to initialize Rancher metadata client")?,
    );

    let registry = ProviderRegistry::with_builtin();
    let provider = registry.build(&settings.provider, &settings.providers)?;
    provider
        .health_check()
        .await
        .with_context(|| format!("Failed to reach {} provider", provider.name()))?;

    let registrar: Option<Arc<dyn FqdnRegistrar>> = match &settings.cattle {
        Some(cattle) => {
            let client = CattleClient::new(cattle)?;
            if let Err(e) = client.test_connect().await {
                warn!("Failed to connect to Cattle API at {}: {:#}", cattle.url, e);
            }
            Some(Arc::new(client) as Arc<dyn FqdnRegistrar>)
        }
        None => {
            info!("CATTLE_URL not set, FQDN registration disabled");
            None
        }
    };

    let metrics = Arc::new(ReconcileMetrics::new());

    start_healthcheck(
        SocketAddr::from(([0, 0, 0, 0], settings.healthcheck_port)),
        AppState {
            metadata: metadata.clone(),
            provider: provider.clone(),
            metrics: metrics.clone(),
        },
    )
    .await?;

    let scope = OwnershipScope::new(metadata.environment_uuid(), &settings.target_pool_suffix);
    let reconciler = Reconciler::new(provider, scope, metrics.clone());
    let controller = LbController::new(
        metadata,
        reconciler,
        registrar,
        metrics,
        LbControllerConfig {
            poll_interval: settings.poll_interval,
            force_update_interval: settings.force_update_interval,
            target_pool_suffix: settings.target_pool_suffix,
        },
    );

    tokio::select! {
        _ = controller.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl-C, shutting down");
        }
    }

    Ok(())
}
