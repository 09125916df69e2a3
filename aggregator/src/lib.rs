pub mod api;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod merge;
pub mod metrics_defs;
pub mod rate_limit;
pub mod request_cache;
pub mod response_cache;
pub mod service;
pub mod types;
pub mod upstream;

#[cfg(test)]
mod testutils;

use api::{Api, ApiServeError};
use config::{Config, ConfigValidationError};
use service::GameStatsService;
use std::sync::Arc;
use upstream::SteamClient;

#[derive(thiserror::Error, Debug)]
pub enum AggregatorError {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigValidationError),
    #[error(transparent)]
    Serve(#[from] ApiServeError),
}

pub async fn run(config: Config) -> Result<(), AggregatorError> {
    config.validate()?;

    let upstream = Arc::new(SteamClient::new(config.upstream.settings()));
    let service = GameStatsService::new(upstream, config.achievement_concurrency);
    let api = Arc::new(Api::new(&config, service));

    tracing::info!(
        upstream = %config.upstream.base_url,
        achievement_concurrency = config.achievement_concurrency,
        "Starting aggregator"
    );
    api::serve(&config.listener, api).await?;
    Ok(())
}
