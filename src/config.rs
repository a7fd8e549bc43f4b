use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::CACHE_DURATION_SECS;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub forecast: ForecastConfig,
    pub cache: CacheConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3044,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Remote,
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub source: SourceKind,
    pub base_url: String,
    /// Pause after the liveness probe while the backend spins up.
    pub warmup_delay_secs: u64,
    pub http_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub mock_seed: Option<u64>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Remote,
            base_url: "http://127.0.0.1:8000".to_string(),
            warmup_delay_secs: 2,
            http_timeout_secs: 120,
            refresh_interval_secs: 3600,
            mock_seed: None,
        }
    }
}

impl ForecastConfig {
    pub fn warmup_delay(&self) -> Duration {
        Duration::from_secs(self.warmup_delay_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/cache"),
            ttl_secs: CACHE_DURATION_SECS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Result<chrono::TimeDelta> {
        chrono::TimeDelta::try_seconds(self.ttl_secs)
            .filter(|ttl| *ttl > chrono::TimeDelta::zero())
            .with_context(|| format!("cache.ttl_secs out of range: {}", self.ttl_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Panel count used when a request does not name one.
    pub default_panels: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { default_panels: 1 }
    }
}

impl Config {
    /// Defaults, then `config/default.toml` if present, then `SOLAR__*` environment variables
    /// (e.g. `SOLAR__FORECAST__BASE_URL`).
    pub fn load() -> Result<Self> {
        Self::figment(Toml::file("config/default.toml"))
    }

    fn figment(file: figment::providers::Data<Toml>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed("SOLAR__").split("__"));
        let cfg: Config = figment.extract()?;
        cfg.cache.ttl()?;
        Ok(cfg)
    }
}
