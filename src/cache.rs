//! Persistent prediction cache.
//!
//! The cache lives in a small key-value store holding four JSON documents. An entry is
//! only served while it is younger than the freshness window; stale entries stay on disk
//! until the next successful fetch overwrites them.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::forecast::{DailyAggregate, HourlyPrediction, RawForecast};

pub const KEY_GRU_PREDICTIONS: &str = "gru_predictions";
pub const KEY_AUTOFORMER_DAILY: &str = "autoformer_daily";
pub const KEY_AUTOFORMER_RAW: &str = "autoformer_raw";
pub const KEY_LAST_UPDATE: &str = "last_update";

/// Default freshness window, one hour.
pub const CACHE_DURATION_SECS: i64 = 3600;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable string storage addressed by fixed keys.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let path = self.path_for(key);
        // temp file + rename so readers never see a half-written value
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, value)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

/// In-process store, lost on exit.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: parking_lot::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Everything the dashboard needs, as persisted after a successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub gru: Vec<HourlyPrediction>,
    pub autoformer_daily: Vec<DailyAggregate>,
    pub autoformer_raw: RawForecast,
    pub last_update: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.last_update) < ttl
    }
}

/// Typed view over a [`KeyValueStore`] with a freshness window.
pub struct PredictionCache {
    store: Box<dyn KeyValueStore>,
    ttl: Duration,
}

impl PredictionCache {
    pub fn new(store: Box<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[cfg(test)]
    pub fn with_default_ttl(store: Box<dyn KeyValueStore>) -> Self {
        Self::new(store, Duration::seconds(CACHE_DURATION_SECS))
    }

    /// Return the stored entry if it is complete and fresh at `now`.
    ///
    /// Storage and decoding failures count as a miss.
    pub fn load(&self, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entry = match self.read_entry() {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("prediction cache empty");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "failed to read prediction cache, treating as miss");
                return None;
            }
        };

        if !entry.is_fresh(now, self.ttl) {
            info!(last_update = %entry.last_update, "cached predictions expired");
            return None;
        }

        info!(last_update = %entry.last_update, "serving cached predictions");
        Some(entry)
    }

    pub fn save(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        self.write(KEY_GRU_PREDICTIONS, &entry.gru)?;
        self.write(KEY_AUTOFORMER_DAILY, &entry.autoformer_daily)?;
        self.write(KEY_AUTOFORMER_RAW, &entry.autoformer_raw)?;
        self.write(KEY_LAST_UPDATE, &entry.last_update)?;
        Ok(())
    }

    fn read_entry(&self) -> Result<Option<CacheEntry>, StorageError> {
        let Some(last_update) = self.read::<DateTime<Utc>>(KEY_LAST_UPDATE)? else {
            return Ok(None);
        };
        let Some(gru) = self.read::<Vec<HourlyPrediction>>(KEY_GRU_PREDICTIONS)? else {
            return Ok(None);
        };
        let Some(autoformer_daily) = self.read::<Vec<DailyAggregate>>(KEY_AUTOFORMER_DAILY)? else {
            return Ok(None);
        };
        let Some(autoformer_raw) = self.read::<RawForecast>(KEY_AUTOFORMER_RAW)? else {
            return Ok(None);
        };

        Ok(Some(CacheEntry {
            gru,
            autoformer_daily,
            autoformer_raw,
            last_update,
        }))
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.store.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::analysis::{to_daily_aggregates, to_hourly};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 30, 0).unwrap()
    }

    fn entry(last_update: DateTime<Utc>) -> CacheEntry {
        let raw: Vec<f64> = (0..96).map(|i| (i % 24) as f64 * 12.5).collect();
        CacheEntry {
            gru: to_hourly(&[0.0, 120.25, 333.3], last_update),
            autoformer_daily: to_daily_aggregates(&raw, last_update),
            autoformer_raw: raw,
            last_update,
        }
    }

    #[test]
    fn test_round_trip_file_store() {
        let dir = TempDir::new().unwrap();
        let cache = PredictionCache::with_default_ttl(Box::new(FileStore::new(dir.path())));
        let written = entry(now());

        cache.save(&written).unwrap();

        assert_eq!(cache.load(now()), Some(written));
        assert!(dir.path().join("last_update.json").exists());
    }

    #[test]
    fn test_last_update_stored_as_iso_string() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("cache"));
        let cache = PredictionCache::with_default_ttl(Box::new(store.clone()));

        cache.save(&entry(now())).unwrap();

        assert_eq!(
            store.get(KEY_LAST_UPDATE).unwrap().as_deref(),
            Some("\"2026-10-18T12:30:00Z\"")
        );
    }

    #[test]
    fn test_expired_entry_is_miss() {
        let cache = PredictionCache::with_default_ttl(Box::new(MemoryStore::new()));
        cache
            .save(&entry(now() - Duration::seconds(3601)))
            .unwrap();

        assert_eq!(cache.load(now()), None);
    }

    #[test]
    fn test_entry_at_exact_ttl_is_miss() {
        let cache = PredictionCache::with_default_ttl(Box::new(MemoryStore::new()));
        cache
            .save(&entry(now() - Duration::seconds(3600)))
            .unwrap();

        assert_eq!(cache.load(now()), None);
    }

    #[test]
    fn test_entry_within_ttl_is_served() {
        let cache = PredictionCache::with_default_ttl(Box::new(MemoryStore::new()));
        let written = entry(now() - Duration::seconds(3599));
        cache.save(&written).unwrap();

        assert_eq!(cache.load(now()), Some(written));
    }

    #[test]
    fn test_empty_store_is_miss() {
        let cache = PredictionCache::with_default_ttl(Box::new(MemoryStore::new()));
        assert_eq!(cache.load(now()), None);
    }

    #[test]
    fn test_corrupt_json_is_miss() {
        let store = MemoryStore::new();
        store.set(KEY_LAST_UPDATE, "\"2026-10-18T12:30:00Z\"").unwrap();
        store.set(KEY_GRU_PREDICTIONS, "{not json").unwrap();
        store.set(KEY_AUTOFORMER_DAILY, "[]").unwrap();
        store.set(KEY_AUTOFORMER_RAW, "[]").unwrap();
        let cache = PredictionCache::with_default_ttl(Box::new(store));

        assert_eq!(cache.load(now()), None);
    }

    #[test]
    fn test_partial_entry_is_miss() {
        let store = MemoryStore::new();
        store.set(KEY_LAST_UPDATE, "\"2026-10-18T12:30:00Z\"").unwrap();
        let cache = PredictionCache::with_default_ttl(Box::new(store));

        assert_eq!(cache.load(now()), None);
    }
}
