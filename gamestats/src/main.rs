mod config;

use clap::Parser;
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
enum CliCommand {
    /// Run the game stats aggregator
    Run {
        #[arg(long, default_value = "gamestats.yaml")]
        config_file_path: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Aggregator(#[from] aggregator::AggregatorError),
}

fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(metrics: Option<&MetricsConfig>) -> Result<(), CliError> {
    if let Some(metrics) = metrics {
        let recorder = StatsdBuilder::from(metrics.statsd_host.as_str(), metrics.statsd_port)
            .build(Some("gamestats"))
            .map_err(|e| CliError::Metrics(e.to_string()))?;
        metrics::set_global_recorder(recorder)
            .map_err(|_| CliError::Metrics("a recorder is already installed".into()))?;
    }
    shared::metrics_defs::describe_all(aggregator::metrics_defs::ALL_METRICS);
    Ok(())
}

fn run(config_file_path: &std::path::Path) -> Result<(), CliError> {
    let config = Config::from_file(config_file_path)?;

    let _sentry = init_logging(config.common.logging.as_ref());
    init_metrics(config.common.metrics.as_ref())?;

    tracing::info!(config = %config_file_path.display(), "Starting gamestats");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(aggregator::run(config.aggregator))?;
    Ok(())
}

fn main() {
    let cli = CliCommand::parse();

    match &cli {
        CliCommand::Run { config_file_path } => {
            if let Err(e) = run(config_file_path) {
                eprintln!("gamestats failed: {e}");
                process::exit(1);
            }
        }
    }
}
