pub(crate) mod analysis;
pub(crate) mod mock;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Length of the short-horizon (GRU) forecast.
pub const GRU_HORIZON_HOURS: usize = 24;
/// Length of the long-horizon (Autoformer) forecast, four days of hourly values.
pub const AUTOFORMER_HORIZON_HOURS: usize = 96;

const USER_MESSAGE: &str = "Failed to fetch predictions. Please try again.";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("HTTP request failed: {0}")]
    Transport(String),
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),
    #[error("Backend reported failure: {0}")]
    Unsuccessful(String),
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl ForecastError {
    /// Message shown to dashboard users, regardless of the underlying cause.
    pub fn user_message(&self) -> &'static str {
        USER_MESSAGE
    }
}

impl From<reqwest::Error> for ForecastError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ForecastError::Status(status.as_u16()),
            None => ForecastError::Transport(err.to_string()),
        }
    }
}

/// Ordered hourly power values in watts, starting one hour after the fetch.
pub type RawForecast = Vec<f64>;

/// Raw arrays of both models as they come off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPredictions {
    pub gru: RawForecast,
    pub autoformer: RawForecast,
}

/// One hour of the short-term forecast, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPrediction {
    pub time: DateTime<Utc>,
    pub label: String,
    pub predicted_power: f64,
}

/// Aggregate of one 24-hour slice of the long-term forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub avg_power: f64,
    pub min_power: f64,
    pub max_power: f64,
}

impl DailyAggregate {
    pub fn label(&self) -> String {
        self.date.format("%b %-d, %Y").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAnalytics {
    #[serde(rename = "Success_Rate_%")]
    pub success_rate_pct: f64,
    #[serde(rename = "Conditional_MAE")]
    pub conditional_mae: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub gru: ModelAnalytics,
    pub autoformer: ModelAnalytics,
}

/// Anything that can produce forecasts for the dashboard.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Wake the backend before a prediction request. Returns whether it reported healthy.
    async fn wake(&self) -> bool {
        true
    }

    async fn predict(&self) -> Result<RawPredictions, ForecastError>;

    async fn analytics(&self) -> Result<AnalyticsReport, ForecastError>;
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    success: bool,
    predictions: Option<ModelPredictions>,
}

#[derive(Debug, Deserialize)]
struct ModelPredictions {
    gru: ModelForecast,
    autoformer: ModelForecast,
}

#[derive(Debug, Deserialize)]
struct ModelForecast {
    forecast: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct AnalyticsResponse {
    success: bool,
    gru: Option<ModelAnalytics>,
    autoformer: Option<ModelAnalytics>,
}

/// Client of the remote prediction backend.
pub struct ForecastClient {
    client: Client,
    base_url: String,
    warmup_delay: Duration,
}

impl ForecastClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        warmup_delay: Duration,
    ) -> Result<Self, ForecastError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            warmup_delay,
        })
    }

    /// Liveness probe, `GET /`
    pub async fn check_health(&self) -> Result<bool, ForecastError> {
        let url = format!("{}/", self.base_url);
        let body = self.get_body(&url).await?;
        let health: HealthResponse =
            serde_json::from_str(&body).map_err(|e| ForecastError::Malformed(e.to_string()))?;
        Ok(health.status == "healthy")
    }

    /// Fetch both model forecasts, `GET /api/predict`
    pub async fn fetch_predictions(&self) -> Result<RawPredictions, ForecastError> {
        let url = format!("{}/api/predict", self.base_url);
        let body = self.get_body(&url).await?;

        let response: PredictResponse =
            serde_json::from_str(&body).map_err(|e| ForecastError::Malformed(e.to_string()))?;
        if !response.success {
            return Err(ForecastError::Unsuccessful(
                "prediction request failed".to_string(),
            ));
        }
        let predictions = response
            .predictions
            .ok_or_else(|| ForecastError::Malformed("missing predictions".to_string()))?;

        check_length("gru", &predictions.gru.forecast, GRU_HORIZON_HOURS)?;
        check_length(
            "autoformer",
            &predictions.autoformer.forecast,
            AUTOFORMER_HORIZON_HOURS,
        )?;

        Ok(RawPredictions {
            gru: predictions.gru.forecast,
            autoformer: predictions.autoformer.forecast,
        })
    }

    /// Fetch model accuracy figures, `GET /api/analytics`
    pub async fn fetch_analytics(&self) -> Result<AnalyticsReport, ForecastError> {
        let url = format!("{}/api/analytics", self.base_url);
        let body = self.get_body(&url).await?;

        let response: AnalyticsResponse =
            serde_json::from_str(&body).map_err(|e| ForecastError::Malformed(e.to_string()))?;
        if !response.success {
            return Err(ForecastError::Unsuccessful(
                "analytics request failed".to_string(),
            ));
        }
        match (response.gru, response.autoformer) {
            (Some(gru), Some(autoformer)) => Ok(AnalyticsReport { gru, autoformer }),
            _ => Err(ForecastError::Malformed(
                "missing model analytics".to_string(),
            )),
        }
    }

    async fn get_body(&self, url: &str) -> Result<String, ForecastError> {
        debug!(url, "GET");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ForecastError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

fn check_length(model: &str, forecast: &[f64], expected: usize) -> Result<(), ForecastError> {
    if forecast.len() != expected {
        return Err(ForecastError::Malformed(format!(
            "{model} forecast has {} values, expected {expected}",
            forecast.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl ForecastSource for ForecastClient {
    async fn wake(&self) -> bool {
        info!("waking up backend");
        let healthy = match self.check_health().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(error = %e, "health check failed");
                false
            }
        };
        if !self.warmup_delay.is_zero() {
            tokio::time::sleep(self.warmup_delay).await;
        }
        healthy
    }

    async fn predict(&self) -> Result<RawPredictions, ForecastError> {
        self.fetch_predictions().await
    }

    async fn analytics(&self) -> Result<AnalyticsReport, ForecastError> {
        self.fetch_analytics().await
    }
}
