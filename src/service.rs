//! Owner of the dashboard's forecast state.
//!
//! [`PredictionService`] decides whether to serve cached predictions or fetch new ones,
//! derives the display records, persists them, and keeps the last outcome for the views.
//! At most one fetch runs at a time: callers arriving while a fetch is in flight wait for
//! it and share its outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, PredictionCache};
use crate::forecast::analysis::{to_daily_aggregates, to_hourly};
use crate::forecast::{AnalyticsReport, ForecastError, ForecastSource};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What the views get to see.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub entry: Option<CacheEntry>,
    pub error: Option<String>,
    pub loading: bool,
}

#[derive(Default)]
struct State {
    entry: Option<CacheEntry>,
    last_error: Option<ForecastError>,
}

/// Set while a fetch runs. Cleared on drop, including when the fetch future is abandoned.
struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PredictionService {
    source: Arc<dyn ForecastSource>,
    cache: PredictionCache,
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
    in_flight: Mutex<()>,
    completed: AtomicU64,
    loading: AtomicBool,
}

impl PredictionService {
    pub fn new(
        source: Arc<dyn ForecastSource>,
        cache: PredictionCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            cache,
            clock,
            state: RwLock::new(State::default()),
            in_flight: Mutex::new(()),
            completed: AtomicU64::new(0),
            loading: AtomicBool::new(false),
        }
    }

    /// Fresh cached entry, if any. Never fails.
    pub fn load(&self) -> Option<CacheEntry> {
        self.cache.load(self.clock.now())
    }

    /// Serve the cache if it is fresh, otherwise fetch.
    pub async fn initialize(&self) {
        if let Some(cached) = self.load() {
            let mut state = self.state.write().await;
            // a refresh may have landed between the read and the lock
            if state
                .entry
                .as_ref()
                .is_none_or(|current| current.last_update < cached.last_update)
            {
                state.entry = Some(cached);
            } else {
                debug!("keeping newer predictions over cached entry");
            }
            return;
        }

        info!("no fresh cached predictions, fetching");
        if let Err(e) = self.fetch().await {
            warn!(error = %e, "initial fetch failed");
        }
    }

    /// Fetch, derive, persist. On failure the current predictions stay in place and the
    /// error is recorded for the views.
    pub async fn fetch(&self) -> Result<CacheEntry, ForecastError> {
        let observed = self.completed.load(Ordering::Acquire);
        let _guard = self.in_flight.lock().await;

        if self.completed.load(Ordering::Acquire) != observed {
            debug!("joined in-flight fetch");
            return self.last_outcome().await;
        }

        let loading = LoadingFlag::raise(&self.loading);
        let outcome = self.fetch_and_store().await;

        {
            let mut state = self.state.write().await;
            match &outcome {
                Ok(entry) => {
                    state.entry = Some(entry.clone());
                    state.last_error = None;
                }
                Err(e) => state.last_error = Some(e.clone()),
            }
        }
        drop(loading);
        self.completed.fetch_add(1, Ordering::Release);

        outcome
    }

    /// Manual refresh, same path as the scheduled one.
    pub async fn refresh(&self) -> Result<CacheEntry, ForecastError> {
        info!("manual refresh requested");
        self.fetch().await
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.read().await;
        Snapshot {
            entry: state.entry.clone(),
            error: state.last_error.as_ref().map(|e| e.user_message().to_string()),
            loading: self.loading.load(Ordering::Acquire),
        }
    }

    pub async fn analytics(&self) -> Result<AnalyticsReport, ForecastError> {
        self.source.analytics().await
    }

    /// Fetch every `period` until `token` is cancelled. The first run happens one period
    /// from now.
    pub fn spawn_auto_refresh(
        self: &Arc<Self>,
        period: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        info!("auto-refreshing predictions");
                        tokio::select! {
                            _ = token.cancelled() => break,
                            result = service.fetch() => {
                                if let Err(e) = result {
                                    warn!(error = %e, "scheduled refresh failed");
                                }
                            }
                        }
                    }
                }
            }
            info!("auto-refresh stopped");
        })
    }

    async fn fetch_and_store(&self) -> Result<CacheEntry, ForecastError> {
        if !self.source.wake().await {
            warn!("backend did not report healthy, fetching anyway");
        }

        let raw = self.source.predict().await.map_err(|e| {
            warn!(error = %e, "prediction fetch failed");
            e
        })?;

        let now = self.clock.now();
        let entry = CacheEntry {
            gru: to_hourly(&raw.gru, now),
            autoformer_daily: to_daily_aggregates(&raw.autoformer, now),
            autoformer_raw: raw.autoformer,
            last_update: now,
        };

        if let Err(e) = self.cache.save(&entry) {
            warn!(error = %e, "failed to persist predictions");
        }
        info!(
            hours = entry.gru.len(),
            days = entry.autoformer_daily.len(),
            "predictions updated"
        );

        Ok(entry)
    }

    async fn last_outcome(&self) -> Result<CacheEntry, ForecastError> {
        let state = self.state.read().await;
        match (&state.last_error, &state.entry) {
            (Some(e), _) => Err(e.clone()),
            (None, Some(entry)) => Ok(entry.clone()),
            (None, None) => Err(ForecastError::Unsuccessful(
                "no predictions available".to_string(),
            )),
        }
    }
}
