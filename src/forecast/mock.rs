use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::forecast::{
    AUTOFORMER_HORIZON_HOURS, AnalyticsReport, ForecastError, ForecastSource, GRU_HORIZON_HOURS,
    ModelAnalytics, RawPredictions,
};

// Reference panel at standard test conditions
const RATED_POWER_W: f64 = 1000.0;
const IRRADIANCE_STC: f64 = 1000.0; // W/m²
const TEMPERATURE_STC: f64 = 25.0; // °C
const TEMPERATURE_COEFFICIENT: f64 = -0.004; // per °C

/// Weather sample driving the mock PV model.
#[derive(Debug, Clone, Copy)]
pub struct WeatherSample {
    pub temperature: f64,
    pub irradiance: f64,
}

/// PV output for one panel: `P = C * (G / G_stc) * (1 + alpha * (T - T_stc))`, never negative.
pub fn pv_power(sample: WeatherSample) -> f64 {
    let power = RATED_POWER_W
        * (sample.irradiance / IRRADIANCE_STC)
        * (1.0 + TEMPERATURE_COEFFICIENT * (sample.temperature - TEMPERATURE_STC));
    power.max(0.0)
}

/// Offline forecast source producing plausible random data.
pub struct MockForecastSource {
    rng: Mutex<StdRng>,
}

impl MockForecastSource {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    fn weather(rng: &mut StdRng) -> WeatherSample {
        WeatherSample {
            temperature: rng.gen_range(15.0..30.0),
            irradiance: rng.gen_range(200.0..1000.0),
        }
    }

    fn series(&self, hours: usize) -> Vec<f64> {
        let mut rng = self.rng.lock();
        (0..hours).map(|_| pv_power(Self::weather(&mut rng))).collect()
    }

    fn model_analytics(&self) -> ModelAnalytics {
        let mut rng = self.rng.lock();
        ModelAnalytics {
            success_rate_pct: rng.gen_range(85.0..95.0),
            conditional_mae: rng.gen_range(45.0..55.0),
        }
    }
}

#[async_trait]
impl ForecastSource for MockForecastSource {
    async fn predict(&self) -> Result<RawPredictions, ForecastError> {
        Ok(RawPredictions {
            gru: self.series(GRU_HORIZON_HOURS),
            autoformer: self.series(AUTOFORMER_HORIZON_HOURS),
        })
    }

    async fn analytics(&self) -> Result<AnalyticsReport, ForecastError> {
        Ok(AnalyticsReport {
            gru: self.model_analytics(),
            autoformer: self.model_analytics(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pv_power_at_stc() {
        let power = pv_power(WeatherSample {
            temperature: 25.0,
            irradiance: 1000.0,
        });
        assert_eq!(power, 1000.0);
    }

    #[test]
    fn test_pv_power_derates_with_heat() {
        let power = pv_power(WeatherSample {
            temperature: 35.0,
            irradiance: 500.0,
        });
        assert!((power - 480.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mock_shapes() {
        let source = MockForecastSource::new(Some(7));
        let predictions = source.predict().await.unwrap();

        assert_eq!(predictions.gru.len(), GRU_HORIZON_HOURS);
        assert_eq!(predictions.autoformer.len(), AUTOFORMER_HORIZON_HOURS);
        assert!(predictions.autoformer.iter().all(|&p| p >= 0.0));
    }

    #[tokio::test]
    async fn test_seeded_mock_is_repeatable() {
        let a = MockForecastSource::new(Some(42)).predict().await.unwrap();
        let b = MockForecastSource::new(Some(42)).predict().await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_mock_analytics_ranges() {
        let report = MockForecastSource::new(Some(1)).analytics().await.unwrap();
        assert!((85.0..95.0).contains(&report.gru.success_rate_pct));
        assert!((45.0..55.0).contains(&report.autoformer.conditional_mae));
    }
}
