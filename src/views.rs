//! Read models for the short- and long-term pages.
//!
//! Per-panel forecast values are scaled by the installation's panel count here, so the
//! HTTP layer only picks a view and serializes it.

use serde::Serialize;

use crate::cache::CacheEntry;
use crate::forecast::analysis::{
    daily_energy, hourly_energy, hours_for_day, mean_avg_power, peak_day, peak_hour, peak_power,
    scale_for_panels, total_energy, wh_to_kwh,
};
use crate::forecast::{DailyAggregate, HourlyPrediction};

pub const MAX_DAYS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourRow {
    pub time: String,
    pub label: String,
    pub predicted_power: f64,
    pub installation_power: f64,
}

impl HourRow {
    fn new(prediction: &HourlyPrediction, panels: u32) -> Self {
        Self {
            time: prediction.time.to_rfc3339(),
            label: prediction.label.clone(),
            predicted_power: prediction.predicted_power,
            installation_power: scale_for_panels(prediction.predicted_power, panels),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortTermView {
    pub panels: u32,
    pub hours: Vec<HourRow>,
    pub total_energy_wh: f64,
    pub installation_energy_kwh: f64,
    pub peak_hour: Option<HourRow>,
}

impl ShortTermView {
    pub fn build(entry: &CacheEntry, panels: u32) -> Self {
        let total = hourly_energy(&entry.gru);
        Self {
            panels,
            hours: entry.gru.iter().map(|p| HourRow::new(p, panels)).collect(),
            total_energy_wh: total,
            installation_energy_kwh: wh_to_kwh(scale_for_panels(total, panels)),
            peak_hour: peak_hour(&entry.gru).map(|p| HourRow::new(p, panels)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayRow {
    pub date: String,
    pub label: String,
    pub avg_power: f64,
    pub min_power: f64,
    pub max_power: f64,
    /// Estimate, see [`daily_energy`].
    pub energy_wh: f64,
    pub installation_energy_kwh: f64,
    pub installation_peak_power: f64,
}

impl DayRow {
    fn new(day: &DailyAggregate, panels: u32) -> Self {
        let energy = daily_energy(day);
        Self {
            date: day.date.to_string(),
            label: day.label(),
            avg_power: day.avg_power,
            min_power: day.min_power,
            max_power: day.max_power,
            energy_wh: energy,
            installation_energy_kwh: wh_to_kwh(scale_for_panels(energy, panels)),
            installation_peak_power: scale_for_panels(day.max_power, panels),
        }
    }
}

/// Statistics over the days selected for the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceSummary {
    pub avg_power: f64,
    pub peak_power: f64,
    pub energy_wh: f64,
    pub installation_energy_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongTermView {
    pub panels: u32,
    pub days_shown: usize,
    pub selected_day: usize,
    pub days: Vec<DayRow>,
    pub shown: SliceSummary,
    /// Always over every forecast day, independent of `days_shown`.
    pub total_energy_wh: f64,
    pub installation_energy_kwh: f64,
    pub peak_day: Option<DayRow>,
    pub selected_day_hours: Vec<HourRow>,
}

impl LongTermView {
    pub fn build(entry: &CacheEntry, panels: u32, days_shown: usize, selected_day: usize) -> Self {
        let days_shown = days_shown.clamp(1, MAX_DAYS);
        let selected_day = selected_day.clamp(1, MAX_DAYS);
        let all = &entry.autoformer_daily;
        let shown = &all[..days_shown.min(all.len())];

        let shown_energy = total_energy(shown);
        let total = total_energy(all);
        let hours = hours_for_day(&entry.autoformer_raw, entry.last_update, selected_day);

        Self {
            panels,
            days_shown,
            selected_day,
            days: shown.iter().map(|d| DayRow::new(d, panels)).collect(),
            shown: SliceSummary {
                avg_power: mean_avg_power(shown),
                peak_power: peak_power(shown),
                energy_wh: shown_energy,
                installation_energy_kwh: wh_to_kwh(scale_for_panels(shown_energy, panels)),
            },
            total_energy_wh: total,
            installation_energy_kwh: wh_to_kwh(scale_for_panels(total, panels)),
            peak_day: peak_day(all).map(|d| DayRow::new(d, panels)),
            selected_day_hours: hours.iter().map(|p| HourRow::new(p, panels)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::analysis::{to_daily_aggregates, to_hourly};
    use chrono::{TimeZone, Utc};

    fn entry() -> CacheEntry {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let mut day = vec![0.0; 6];
        day.extend([500.0; 12]);
        day.extend([0.0; 6]);
        let mut raw = day.repeat(4);
        raw[40] = 800.0;

        let mut gru = vec![0.0; 24];
        gru[5] = 300.0;
        gru[6] = 450.0;
        gru[7] = 450.0;

        CacheEntry {
            gru: to_hourly(&gru, now),
            autoformer_daily: to_daily_aggregates(&raw, now),
            autoformer_raw: raw,
            last_update: now,
        }
    }

    #[test]
    fn test_short_term_totals() {
        let view = ShortTermView::build(&entry(), 10);

        assert_eq!(view.hours.len(), 24);
        assert_eq!(view.total_energy_wh, 1200.0);
        assert_eq!(view.installation_energy_kwh, 12.0);
        let peak = view.peak_hour.unwrap();
        assert_eq!(peak.label, "15:00");
        assert_eq!(peak.installation_power, 4500.0);
    }

    #[test]
    fn test_long_term_slice_and_totals() {
        let view = LongTermView::build(&entry(), 2, 1, 2);

        assert_eq!(view.days.len(), 1);
        assert_eq!(view.shown.energy_wh, 12000.0);
        assert_eq!(view.shown.peak_power, 500.0);
        assert_eq!(view.shown.avg_power, 500.0);
        assert_eq!(view.days[0].installation_energy_kwh, 24.0);
        assert_eq!(view.peak_day.as_ref().unwrap().max_power, 800.0);
        assert_eq!(view.peak_day.unwrap().date, "2026-10-20");
        assert_eq!(view.selected_day_hours.len(), 24);
        assert_eq!(view.selected_day_hours[16].predicted_power, 800.0);
    }

    #[test]
    fn test_long_term_clamps_selection() {
        let view = LongTermView::build(&entry(), 1, 9, 0);

        assert_eq!(view.days_shown, 4);
        assert_eq!(view.selected_day, 1);
        assert_eq!(view.days.len(), 4);
    }
}
