//! Derived metrics over hourly power forecasts.
//!
//! Everything here is pure: the same input always yields the same output and nothing
//! suspends or touches storage.

use chrono::{DateTime, Duration, Utc};

use crate::forecast::{DailyAggregate, HourlyPrediction};

pub const HOURS_PER_DAY: usize = 24;

/// Turn a raw forecast into display records. Negative values are clamped to zero and
/// element `i` is stamped `base + (i + 1)` hours.
pub fn to_hourly(raw: &[f64], base: DateTime<Utc>) -> Vec<HourlyPrediction> {
    raw.iter()
        .enumerate()
        .map(|(i, &power)| {
            let time = base + Duration::hours(i as i64 + 1);
            HourlyPrediction {
                time,
                label: time.format("%H:%M").to_string(),
                predicted_power: power.max(0.0),
            }
        })
        .collect()
}

/// Aggregate a long-horizon forecast into one record per 24-hour chunk.
///
/// Zero (night) hours are excluded from the average and minimum but take part in the
/// maximum. A chunk without any positive hour yields all zeros.
pub fn to_daily_aggregates(raw: &[f64], base: DateTime<Utc>) -> Vec<DailyAggregate> {
    raw.chunks(HOURS_PER_DAY)
        .enumerate()
        .map(|(day, chunk)| {
            let positives: Vec<f64> = chunk.iter().copied().filter(|&v| v > 0.0).collect();

            let (avg_power, min_power) = if positives.is_empty() {
                (0.0, 0.0)
            } else {
                let sum: f64 = positives.iter().sum();
                let min = positives.iter().copied().fold(f64::INFINITY, f64::min);
                (sum / positives.len() as f64, min)
            };
            let max_power = chunk.iter().copied().fold(0.0, f64::max);

            DailyAggregate {
                date: (base + Duration::days(day as i64 + 1)).date_naive(),
                avg_power,
                min_power,
                max_power,
            }
        })
        .collect()
}

/// Estimated energy of a day in Wh.
///
/// Multiplies the daytime-only average by all 24 hours, so this overestimates a real
/// integral and must only be shown as an estimate.
pub fn daily_energy(day: &DailyAggregate) -> f64 {
    day.avg_power * HOURS_PER_DAY as f64
}

pub fn total_energy(days: &[DailyAggregate]) -> f64 {
    days.iter().map(daily_energy).sum()
}

/// Energy of an hourly series in Wh, each value held for one hour.
pub fn hourly_energy(predictions: &[HourlyPrediction]) -> f64 {
    predictions.iter().map(|p| p.predicted_power).sum()
}

/// Hour with the highest predicted power. Ties go to the earliest hour.
pub fn peak_hour(predictions: &[HourlyPrediction]) -> Option<&HourlyPrediction> {
    first_max_by(predictions, |p| p.predicted_power)
}

/// Day with the highest maximum power. Ties go to the earliest day.
pub fn peak_day(days: &[DailyAggregate]) -> Option<&DailyAggregate> {
    first_max_by(days, |d| d.max_power)
}

/// Highest `max_power` over the given days, 0 if empty.
pub fn peak_power(days: &[DailyAggregate]) -> f64 {
    peak_day(days).map(|d| d.max_power).unwrap_or(0.0)
}

/// Mean of the daily averages, 0 if empty.
pub fn mean_avg_power(days: &[DailyAggregate]) -> f64 {
    if days.is_empty() {
        return 0.0;
    }
    days.iter().map(|d| d.avg_power).sum::<f64>() / days.len() as f64
}

/// Hourly records of one day (1-based) of a long-horizon forecast.
pub fn hours_for_day(raw: &[f64], base: DateTime<Utc>, day: usize) -> Vec<HourlyPrediction> {
    if day == 0 {
        return Vec::new();
    }
    let start = (day - 1) * HOURS_PER_DAY;
    if start >= raw.len() {
        return Vec::new();
    }
    let end = (start + HOURS_PER_DAY).min(raw.len());

    to_hourly(&raw[start..end], base + Duration::hours(start as i64))
}

/// Values are forecast per panel; the installation has `panels` of them.
pub fn scale_for_panels(value: f64, panels: u32) -> f64 {
    value * f64::from(panels)
}

pub fn wh_to_kwh(wh: f64) -> f64 {
    wh / 1000.0
}

// Iterator::max_by keeps the last of equal elements, we want the first.
fn first_max_by<T>(items: &[T], key: impl Fn(&T) -> f64) -> Option<&T> {
    items.iter().fold(None, |best: Option<&T>, item| match best {
        Some(b) if key(b) >= key(item) => Some(b),
        _ => Some(item),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Timelike};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    fn solar_day() -> Vec<f64> {
        let mut day = vec![0.0; 6];
        day.extend([500.0; 12]);
        day.extend([0.0; 6]);
        day
    }

    #[test]
    fn test_to_hourly_clamps_and_offsets() {
        let hourly = to_hourly(&[-12.0, 0.0, 340.5], base());

        assert_eq!(hourly.len(), 3);
        assert_eq!(hourly[0].predicted_power, 0.0);
        assert_eq!(hourly[2].predicted_power, 340.5);
        assert_eq!(hourly[0].time.hour(), 10);
        assert_eq!(hourly[0].label, "10:00");
        assert_eq!(hourly[2].label, "12:00");
    }

    #[test]
    fn test_all_zero_forecast() {
        let days = to_daily_aggregates(&[0.0; 96], base());

        assert_eq!(days.len(), 4);
        for day in &days {
            assert_eq!(day.avg_power, 0.0);
            assert_eq!(day.min_power, 0.0);
            assert_eq!(day.max_power, 0.0);
            assert!(day.avg_power.is_finite());
        }
    }

    #[test]
    fn test_negative_only_chunk_is_zero() {
        let days = to_daily_aggregates(&[-3.0; 24], base());

        assert_eq!(days[0].max_power, 0.0);
        assert_eq!(days[0].min_power, 0.0);
    }

    #[test]
    fn test_max_covers_every_hour() {
        let raw: Vec<f64> = (0..96).map(|i| ((i * 37) % 101) as f64).collect();
        let days = to_daily_aggregates(&raw, base());

        for (day, chunk) in days.iter().zip(raw.chunks(HOURS_PER_DAY)) {
            assert!(chunk.iter().all(|&v| day.max_power >= v));
        }
    }

    #[test]
    fn test_min_ignores_night() {
        let mut chunk = vec![0.0; 24];
        chunk[10] = 120.0;
        chunk[11] = 80.0;
        chunk[12] = 400.0;
        let days = to_daily_aggregates(&chunk, base());

        assert_eq!(days[0].min_power, 80.0);
        assert_eq!(days[0].max_power, 400.0);
        assert_eq!(days[0].avg_power, 200.0);
    }

    #[test]
    fn test_dates_start_tomorrow() {
        let days = to_daily_aggregates(&[1.0; 96], base());

        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(days[3].date, NaiveDate::from_ymd_opt(2026, 10, 22).unwrap());
    }

    #[test]
    fn test_daily_energy_is_avg_times_24() {
        let day = DailyAggregate {
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            avg_power: 123.456,
            min_power: 1.0,
            max_power: 300.0,
        };
        assert_eq!(daily_energy(&day), 123.456 * 24.0);
    }

    #[test]
    fn test_solar_day_scenario() {
        let raw: Vec<f64> = solar_day().repeat(4);
        let days = to_daily_aggregates(&raw, base());

        assert_eq!(days.len(), 4);
        for day in &days {
            assert_eq!(day.avg_power, 500.0);
            assert_eq!(day.min_power, 500.0);
            assert_eq!(day.max_power, 500.0);
            assert_eq!(daily_energy(day), 12000.0);
        }
        assert_eq!(total_energy(&days), 48000.0);
    }

    #[test]
    fn test_peak_hour_first_wins() {
        let hourly = to_hourly(&[10.0, 50.0, 20.0, 50.0], base());

        let peak = peak_hour(&hourly).unwrap();
        assert_eq!(peak.label, "11:00");
        assert!(peak_hour(&[]).is_none());
    }

    #[test]
    fn test_peak_day_first_wins() {
        let mut raw = vec![100.0; 96];
        raw[30] = 700.0;
        raw[80] = 700.0;
        let days = to_daily_aggregates(&raw, base());

        assert_eq!(peak_day(&days).unwrap().date, days[1].date);
        assert_eq!(peak_power(&days), 700.0);
        assert_eq!(peak_power(&[]), 0.0);
    }

    #[test]
    fn test_hourly_energy_and_panels() {
        let hourly = to_hourly(&[100.0, -5.0, 250.0], base());

        assert_eq!(hourly_energy(&hourly), 350.0);
        assert_eq!(scale_for_panels(350.0, 10), 3500.0);
        assert_eq!(wh_to_kwh(3500.0), 3.5);
    }

    #[test]
    fn test_mean_avg_power() {
        let raw: Vec<f64> = [vec![100.0; 24], vec![300.0; 24]].concat();
        let days = to_daily_aggregates(&raw, base());

        assert_eq!(mean_avg_power(&days), 200.0);
        assert_eq!(mean_avg_power(&[]), 0.0);
    }

    #[test]
    fn test_hours_for_day() {
        let raw: Vec<f64> = (0..96).map(|i| i as f64).collect();

        let second = hours_for_day(&raw, base(), 2);
        assert_eq!(second.len(), 24);
        assert_eq!(second[0].predicted_power, 24.0);
        assert_eq!(second[0].time, base() + Duration::hours(25));
        assert!(hours_for_day(&raw, base(), 0).is_empty());
        assert!(hours_for_day(&raw, base(), 5).is_empty());
    }
}
