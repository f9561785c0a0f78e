/// Configuration management for Forum Service
///
/// Everything is read from environment variables (a `.env` file is loaded by
/// the binary first).
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ForumError;
use crate::services::ranking::{DEFAULT_HOT_AGE_OFFSET_HOURS, DEFAULT_HOT_GRAVITY};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageBackend,
    /// Only read when `storage` is `postgres`
    pub database: Option<DatabaseConfig>,
    pub change_feed: ChangeFeedConfig,
    pub ranking: RankingConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow!("unknown STORAGE_BACKEND: {}", other)),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFeedBackend {
    Memory,
    Redis,
}

/// Realtime change feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeFeedConfig {
    pub backend: ChangeFeedBackend,
    pub redis_url: Option<String>,
    pub channel: String,
}

/// Ranked view configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Exponent applied to the age term of the hot score
    pub hot_gravity: f64,
    /// Hours added to an item's age before decay
    pub hot_age_offset_hours: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            max_page_size: 100,
            hot_gravity: DEFAULT_HOT_GRAVITY,
            hot_age_offset_hours: DEFAULT_HOT_AGE_OFFSET_HOURS,
        }
    }
}

impl RankingConfig {
    /// Hot scores are only defined for a positive, finite gravity and offset.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ForumError::Config(format!(
                "FEED_DEFAULT_PAGE_SIZE must be between 1 and FEED_MAX_PAGE_SIZE ({})",
                self.max_page_size
            )));
        }
        for (name, value) in [
            ("HOT_GRAVITY", self.hot_gravity),
            ("HOT_AGE_OFFSET_HOURS", self.hot_age_offset_hours),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ForumError::Config(format!(
                    "{} must be a positive finite number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow!("invalid {}={:?}: {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let storage: StorageBackend = env_or("STORAGE_BACKEND", StorageBackend::Postgres)?;

        let database = match storage {
            StorageBackend::Memory => None,
            StorageBackend::Postgres => Some(DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .context("DATABASE_URL must be set when STORAGE_BACKEND=postgres")?,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 20)?,
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", 2)?,
                acquire_timeout_secs: env_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 10)?,
            }),
        };

        let change_feed = {
            let backend = match std::env::var("CHANGE_FEED_BACKEND")
                .unwrap_or_else(|_| "memory".to_string())
                .to_ascii_lowercase()
                .as_str()
            {
                "memory" => ChangeFeedBackend::Memory,
                "redis" => ChangeFeedBackend::Redis,
                other => return Err(anyhow!("unknown CHANGE_FEED_BACKEND: {}", other)),
            };
            let redis_url = std::env::var("REDIS_URL").ok();
            if backend == ChangeFeedBackend::Redis && redis_url.is_none() {
                return Err(anyhow!("REDIS_URL must be set when CHANGE_FEED_BACKEND=redis"));
            }
            ChangeFeedConfig {
                backend,
                redis_url,
                channel: std::env::var("CHANGE_FEED_CHANNEL")
                    .unwrap_or_else(|_| change_feed::RedisChangeFeed::DEFAULT_CHANNEL.to_string()),
            }
        };

        let defaults = RankingConfig::default();
        let ranking = RankingConfig {
            default_page_size: env_or("FEED_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: env_or("FEED_MAX_PAGE_SIZE", defaults.max_page_size)?,
            hot_gravity: env_or("HOT_GRAVITY", defaults.hot_gravity)?,
            hot_age_offset_hours: env_or("HOT_AGE_OFFSET_HOURS", defaults.hot_age_offset_hours)?,
        };
        ranking.validate()?;

        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                host: std::env::var("FORUM_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("FORUM_SERVICE_PORT", 8085)?,
            },
            storage,
            database,
            change_feed,
            ranking,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.env.eq_ignore_ascii_case("production")
    }
}
