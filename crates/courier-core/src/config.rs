//! Relay configuration.
//!
//! Configuration comes from an optional YAML file (pointed at by
//! `COURIER_CONFIG`) with `COURIER_*` environment variables layered on top.
//! There are no CLI flags. Invalid values are a startup error, never a
//! silent fallback to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading configuration. All of them are fatal to the
/// process at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Complete configuration surface of the relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Base URL of the queue's HTTP endpoint (real service or emulator).
    pub queue_base_url: String,

    /// Project namespace for topic/subscription resource names.
    pub project: String,

    /// Topic the publisher writes to.
    pub topic: String,

    /// Subscription the subscriber loop pulls from.
    pub subscription: String,

    /// Full URL of the delivery target endpoint.
    pub delivery_target_url: String,

    /// TCP port for the ingestion API.
    pub port: u16,

    /// How long a forwarded id is remembered for deduplication.
    pub dedup_retention_secs: u64,

    /// Dedup cache capacity; least-recently-recorded entries evict first.
    pub dedup_max_entries: usize,

    /// Delivery retries after the first attempt (budget = retries + 1).
    pub max_retries: u32,

    /// Messages requested per pull.
    pub pull_batch_size: usize,

    /// Concurrent forwarding workers. `0` means "match the batch size".
    pub worker_concurrency: usize,

    /// Long-poll budget for one pull call.
    pub pull_timeout_secs: u64,

    /// Per-attempt timeout for delivery target calls.
    pub delivery_timeout_secs: u64,

    /// Where undeliverable messages are recorded (JSONL, append-only).
    pub dead_letter_path: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_base_url: "http://localhost:8085".to_string(),
            project: "local-project".to_string(),
            topic: "messages".to_string(),
            subscription: "messages-sub".to_string(),
            delivery_target_url: "http://localhost:8080/send".to_string(),
            port: 8000,
            dedup_retention_secs: 600,
            dedup_max_entries: 10_000,
            max_retries: 5,
            pull_batch_size: 10,
            worker_concurrency: 0,
            pull_timeout_secs: 30,
            delivery_timeout_secs: 10,
            dead_letter_path: PathBuf::from("dead-letters.jsonl"),
        }
    }
}

impl RelayConfig {
    /// Load configuration: the file named by `COURIER_CONFIG` if set,
    /// then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("COURIER_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `COURIER_*` overrides from a lookup function.
    ///
    /// Taking the lookup as a parameter keeps tests off the process
    /// environment.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("COURIER_QUEUE_BASE_URL") {
            self.queue_base_url = value;
        }
        if let Some(value) = lookup("COURIER_PROJECT") {
            self.project = value;
        }
        if let Some(value) = lookup("COURIER_TOPIC") {
            self.topic = value;
        }
        if let Some(value) = lookup("COURIER_SUBSCRIPTION") {
            self.subscription = value;
        }
        if let Some(value) = lookup("COURIER_DELIVERY_TARGET_URL") {
            self.delivery_target_url = value;
        }
        if let Some(value) = lookup("COURIER_PORT") {
            self.port = parse(&value, "COURIER_PORT")?;
        }
        if let Some(value) = lookup("COURIER_DEDUP_RETENTION_SECS") {
            self.dedup_retention_secs = parse(&value, "COURIER_DEDUP_RETENTION_SECS")?;
        }
        if let Some(value) = lookup("COURIER_DEDUP_MAX_ENTRIES") {
            self.dedup_max_entries = parse(&value, "COURIER_DEDUP_MAX_ENTRIES")?;
        }
        if let Some(value) = lookup("COURIER_MAX_RETRIES") {
            self.max_retries = parse(&value, "COURIER_MAX_RETRIES")?;
        }
        if let Some(value) = lookup("COURIER_PULL_BATCH_SIZE") {
            self.pull_batch_size = parse(&value, "COURIER_PULL_BATCH_SIZE")?;
        }
        if let Some(value) = lookup("COURIER_WORKER_CONCURRENCY") {
            self.worker_concurrency = parse(&value, "COURIER_WORKER_CONCURRENCY")?;
        }
        if let Some(value) = lookup("COURIER_PULL_TIMEOUT_SECS") {
            self.pull_timeout_secs = parse(&value, "COURIER_PULL_TIMEOUT_SECS")?;
        }
        if let Some(value) = lookup("COURIER_DELIVERY_TIMEOUT_SECS") {
            self.delivery_timeout_secs = parse(&value, "COURIER_DELIVERY_TIMEOUT_SECS")?;
        }
        if let Some(value) = lookup("COURIER_DEAD_LETTER_PATH") {
            self.dead_letter_path = PathBuf::from(value);
        }
        Ok(())
    }

    /// Worker pool size, with `0` resolved to the pull batch size.
    pub fn effective_concurrency(&self) -> usize {
        if self.worker_concurrency == 0 {
            self.pull_batch_size.max(1)
        } else {
            self.worker_concurrency
        }
    }

    /// Dedup retention window as a [`Duration`].
    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_secs)
    }

    /// Pull long-poll budget as a [`Duration`].
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    /// Delivery attempt timeout as a [`Duration`].
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}
