//! ads-exporter Binary Entry Point
//!
//! Loads the collector catalog, serves the Prometheus endpoint and runs the
//! scrape loop. Core functionality is provided by the `ads_exporter` library.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ads_exporter::{
    catalog::{CollectorStore, DefinitionSource},
    config::{AppConfig, parse_duration, parse_key_value},
    exporter::{Exporter, StatusHandle},
    exposition::GaugeRegistry,
    fetch::DryRunFetcher,
    registry::RegistryIndex,
    server::{AppState, create_router},
};
use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ads-exporter - advertising metrics for Prometheus
#[derive(Parser, Debug)]
#[command(name = "ads-exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "ADS_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Comma separated collectors and registries (overrides config file)
    #[arg(long, env = "ADS_EXPORTER_COLLECTORS")]
    collectors: Option<String>,

    /// Extra collector definition file or directory (overrides config file)
    #[arg(long, env = "ADS_EXPORTER_DEFINITIONS")]
    definitions: Option<PathBuf>,

    /// Metric namespace (overrides config file)
    #[arg(long, env = "ADS_EXPORTER_NAMESPACE")]
    namespace: Option<String>,

    /// Delay between iterations, e.g. "15m" (overrides config file)
    #[arg(long, env = "ADS_EXPORTER_DELAY", value_parser = parse_duration)]
    delay: Option<Duration>,

    /// Number of iterations before exiting (overrides config file)
    #[arg(long, env = "ADS_EXPORTER_ITERATIONS")]
    iterations: Option<u64>,

    /// Macro value as KEY=VALUE, repeatable (merged over config file)
    #[arg(long = "macro", value_parser = parse_key_value)]
    macros: Vec<(String, String)>,

    /// Expose metrics with zero values
    #[arg(long, env = "ADS_EXPORTER_EXPOSE_ZERO")]
    expose_zero: bool,

    /// Do not add a `mapping` service collector to sets without one
    #[arg(long, env = "ADS_EXPORTER_NO_SERVICE_COLLECTORS")]
    no_service_collectors: bool,

    /// Keep collectors similar to a more granular one
    #[arg(long, env = "ADS_EXPORTER_NO_DEDUPLICATE_COLLECTORS")]
    no_deduplicate_collectors: bool,

    /// Server bind address (overrides config file)
    #[arg(long, env = "ADS_EXPORTER_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "ADS_EXPORTER_SERVER_PORT")]
    server_port: Option<u16>,

    /// Default log directive when RUST_LOG is unset
    #[arg(long, env = "ADS_EXPORTER_LOG_LEVEL", default_value = "info,ads_exporter=debug")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ads-exporter - advertising metrics for Prometheus");

    // Load configuration from file, or start from defaults
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(collectors) = cli.collectors {
        config.collectors.selection = Some(collectors);
    }
    if let Some(definitions) = cli.definitions {
        config.collectors.definitions = Some(definitions);
    }
    if let Some(namespace) = cli.namespace {
        config.exporter.namespace = namespace;
    }
    if let Some(delay) = cli.delay {
        config.exporter.delay = delay;
    }
    if let Some(iterations) = cli.iterations {
        config.exporter.iterations = Some(iterations);
    }
    if cli.expose_zero {
        config.exporter.expose_metrics_with_zero_values = true;
    }
    if cli.no_service_collectors {
        config.exporter.service_collectors = false;
    }
    if cli.no_deduplicate_collectors {
        config.exporter.deduplicate = false;
    }
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    config.macros.extend(cli.macros);
    config.validate()?;

    // Load the collector catalog; a malformed catalog stops the process here
    let mut sources = DefinitionSource::builtin()?;
    if let Some(ref path) = config.collectors.definitions {
        tracing::info!("Loading collector definitions from: {}", path.display());
        sources.extend(DefinitionSource::from_path(path)?);
    }
    let store = Arc::new(CollectorStore::load(sources)?);
    let index = Arc::new(RegistryIndex::from_store(&store));
    tracing::info!(
        collectors = store.len(),
        registries = index.len(),
        "Collector catalog loaded"
    );

    let gauges = GaugeRegistry::new();
    let status = StatusHandle::new();

    tracing::warn!("No reporting API client configured, fetching in dry-run mode");
    let exporter = Exporter::new(
        store,
        index,
        Arc::new(DryRunFetcher),
        Arc::new(gauges.clone()),
        config.exporter_options(),
    )
    .with_selection(config.selection())
    .with_macros(config.macros())
    .with_overrides(config.collector_overrides()?)
    .with_status(status.clone());

    tracing::info!(
        selection = %config.selection(),
        namespace = %config.exporter.namespace,
        delay = ?config.exporter.delay,
        "Exporter configured"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let exporter_task = tokio::spawn(async move { exporter.run(shutdown_rx).await });

    // Build Axum router
    let app = create_router(AppState { gauges, status });
    let addr = config.socket_addr()?;

    tracing::info!("Metrics endpoint listening on: http://{}/metrics", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx, exporter_task))
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup graceful shutdown signal handler.
///
/// Resolves on Ctrl+C, SIGTERM, or when the exporter stops on its own after
/// its iteration limit.
async fn shutdown_signal(shutdown: watch::Sender<bool>, mut exporter: JoinHandle<()>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
        result = &mut exporter => {
            match result {
                Ok(()) => tracing::info!("Exporter finished, stopping server"),
                Err(e) => tracing::error!("Exporter task failed: {}", e),
            }
            return;
        }
    }

    tracing::info!("Stopping exporter...");
    let _ = shutdown.send(true);
    if let Err(e) = exporter.await {
        tracing::error!("Exporter task failed: {}", e);
    }
}
