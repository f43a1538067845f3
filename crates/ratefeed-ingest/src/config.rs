//! Engine configuration
//!
//! Everything is read from environment variables (optionally seeded from a
//! `.env` file). Numbers that fail to parse are reported rather than silently
//! replaced by defaults.

use ratefeed_common::{RatefeedError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

use crate::queue::{QueueConfig, MAX_BATCH_SIZE};
use crate::state::postgres::DatabaseConfig;
use crate::storage::config::StorageConfig;

pub const DEFAULT_DAILY_TARGET: u64 = 7500;
pub const DEFAULT_MIN_CHUNK_BYTES: u64 = 8 * 1024;
pub const DEFAULT_MAX_CHUNK_BYTES: u64 = 256 * 1024;
pub const DEFAULT_AVG_BYTES_PER_RECORD: u64 = 510;
pub const DEFAULT_HEADER_READ_BYTES: u64 = 4096;
pub const DEFAULT_TICK_SECS: u64 = 300;

/// Settings that shape a single invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub stream_id: String,
    pub daily_target: u64,
    /// Object key of the source CSV
    pub source_key: String,
    /// Destination queue locator
    pub queue_url: String,
    pub min_chunk_bytes: u64,
    pub max_chunk_bytes: u64,
    pub avg_bytes_per_record: u64,
    pub header_read_bytes: u64,
    pub batch_size: usize,
}

impl EngineConfig {
    pub fn new(stream_id: impl Into<String>, source_key: impl Into<String>, queue_url: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            daily_target: DEFAULT_DAILY_TARGET,
            source_key: source_key.into(),
            queue_url: queue_url.into(),
            min_chunk_bytes: DEFAULT_MIN_CHUNK_BYTES,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            avg_bytes_per_record: DEFAULT_AVG_BYTES_PER_RECORD,
            header_read_bytes: DEFAULT_HEADER_READ_BYTES,
            batch_size: MAX_BATCH_SIZE,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream_id.trim().is_empty() {
            return Err(RatefeedError::config("RATEFEED_STREAM_ID", "must not be empty"));
        }
        if self.source_key.trim().is_empty() {
            return Err(RatefeedError::config("RATEFEED_SOURCE_KEY", "must not be empty"));
        }
        if self.queue_url.trim().is_empty() {
            return Err(RatefeedError::config("RATEFEED_QUEUE_URL", "must not be empty"));
        }
        if self.min_chunk_bytes == 0 {
            return Err(RatefeedError::config("RATEFEED_MIN_CHUNK_BYTES", "must be greater than 0"));
        }
        if self.min_chunk_bytes > self.max_chunk_bytes {
            return Err(RatefeedError::config(
                "RATEFEED_MAX_CHUNK_BYTES",
                format!(
                    "{} is below RATEFEED_MIN_CHUNK_BYTES ({})",
                    self.max_chunk_bytes, self.min_chunk_bytes
                ),
            ));
        }
        if self.avg_bytes_per_record == 0 {
            return Err(RatefeedError::config("RATEFEED_AVG_BYTES_PER_RECORD", "must be greater than 0"));
        }
        if self.header_read_bytes == 0 {
            return Err(RatefeedError::config("RATEFEED_HEADER_READ_BYTES", "must be greater than 0"));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(RatefeedError::config(
                "RATEFEED_BATCH_SIZE",
                format!("must be between 1 and {}", MAX_BATCH_SIZE),
            ));
        }
        Ok(())
    }
}

/// Full process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub engine: EngineConfig,
    /// Interval between invocations in `serve` mode
    pub tick_secs: u64,
    /// Fixed seed for the jitter generator
    pub seed: Option<u64>,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    #[serde(skip)]
    pub database: DatabaseConfig,
}

impl IngestConfig {
    /// Load `.env` if present, then read the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let engine = EngineConfig {
            stream_id: std::env::var("RATEFEED_STREAM_ID").unwrap_or_else(|_| "default".to_string()),
            daily_target: parse_var("RATEFEED_DAILY_TARGET", DEFAULT_DAILY_TARGET)?,
            source_key: required_var("RATEFEED_SOURCE_KEY")?,
            queue_url: required_var("RATEFEED_QUEUE_URL")?,
            min_chunk_bytes: parse_var("RATEFEED_MIN_CHUNK_BYTES", DEFAULT_MIN_CHUNK_BYTES)?,
            max_chunk_bytes: parse_var("RATEFEED_MAX_CHUNK_BYTES", DEFAULT_MAX_CHUNK_BYTES)?,
            avg_bytes_per_record: parse_var("RATEFEED_AVG_BYTES_PER_RECORD", DEFAULT_AVG_BYTES_PER_RECORD)?,
            header_read_bytes: parse_var("RATEFEED_HEADER_READ_BYTES", DEFAULT_HEADER_READ_BYTES)?,
            batch_size: parse_var("RATEFEED_BATCH_SIZE", MAX_BATCH_SIZE)?,
        };

        let config = Self {
            engine,
            tick_secs: parse_var("RATEFEED_TICK_SECS", DEFAULT_TICK_SECS)?,
            seed: optional_var("RATEFEED_SEED")?,
            storage: StorageConfig::from_env(),
            queue: QueueConfig::from_env(),
            database: DatabaseConfig::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if self.tick_secs == 0 {
            return Err(RatefeedError::config("RATEFEED_TICK_SECS", "must be greater than 0"));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Interval for `serve`; a slow invocation delays the next tick instead of bursting
    pub fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval(self.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

fn required_var(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| RatefeedError::config(var, "not set"))
}

pub(crate) fn optional_var<T: FromStr>(var: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| RatefeedError::config(var, format!("invalid value '{}': {}", raw, err))),
        Err(_) => Ok(None),
    }
}

pub(crate) fn parse_var<T: FromStr>(var: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    Ok(optional_var(var)?.unwrap_or(default))
}
