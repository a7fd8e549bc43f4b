mod cache;
mod config;
mod forecast;
mod server;
mod service;
mod telemetry;
mod views;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::{FileStore, PredictionCache};
use crate::config::{Config, SourceKind};
use crate::forecast::mock::MockForecastSource;
use crate::forecast::{ForecastClient, ForecastSource};
use crate::server::AppState;
use crate::service::{PredictionService, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let cfg = Config::load()?;

    let source: Arc<dyn ForecastSource> = match cfg.forecast.source {
        SourceKind::Remote => {
            info!(base_url = %cfg.forecast.base_url, "using remote forecast backend");
            Arc::new(ForecastClient::new(
                cfg.forecast.base_url.clone(),
                cfg.forecast.http_timeout(),
                cfg.forecast.warmup_delay(),
            )?)
        }
        SourceKind::Mock => {
            info!("using mock forecast source");
            Arc::new(MockForecastSource::new(cfg.forecast.mock_seed))
        }
    };

    let store = FileStore::new(&cfg.cache.dir);
    info!(dir = %store.dir().display(), "prediction cache");
    let cache = PredictionCache::new(Box::new(store), cfg.cache.ttl()?);

    let service = Arc::new(PredictionService::new(source, cache, Arc::new(SystemClock)));
    let shutdown = CancellationToken::new();

    // The refresh schedule starts independently of the initial load.
    let refresher =
        service.spawn_auto_refresh(cfg.forecast.refresh_interval(), shutdown.child_token());
    tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.initialize().await }
    });

    let state = AppState {
        service,
        default_panels: cfg.display.default_panels,
    };
    server::start_server(&cfg, state, shutdown.clone()).await?;

    shutdown.cancel();
    refresher.await?;
    info!("shutdown complete");
    Ok(())
}
