//! Global configuration types for bioflow.
//!
//! `GlobalConfig` represents the top-level `config.toml` that tunes the event
//! bus, points at the workflow engine, and optionally overrides the database.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.bioflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub bus: EventBusConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// SQLite URL; defaults to `{data_dir}/bioflow.db` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

/// Tuning knobs for the durable event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Worker tasks draining the local queue.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How often the poller looks for due events in the store.
    #[serde(default = "default_sync_period_ms")]
    pub sync_period_ms: u64,

    /// Maximum number of events claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// A `dequeue` claim older than this is reclaimed.
    #[serde(default = "default_dequeue_timeout_secs")]
    pub dequeue_timeout_secs: u64,

    /// A `running` event older than this is reclaimed.
    #[serde(default = "default_running_timeout_secs")]
    pub running_timeout_secs: u64,

    /// Failed attempts before an event is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sustained dispatch rate across all workers.
    #[serde(default = "default_rate_per_second")]
    pub rate_per_second: u32,

    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Attempts when persisting a published event.
    #[serde(default = "default_publish_retries")]
    pub publish_retries: u32,
}

fn default_workers() -> usize {
    4
}

fn default_sync_period_ms() -> u64 {
    1000
}

fn default_batch_size() -> u32 {
    100
}

fn default_dequeue_timeout_secs() -> u64 {
    60
}

fn default_running_timeout_secs() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    5
}

fn default_rate_per_second() -> u32 {
    50
}

fn default_burst() -> u32 {
    50
}

fn default_publish_retries() -> u32 {
    3
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            sync_period_ms: default_sync_period_ms(),
            batch_size: default_batch_size(),
            dequeue_timeout_secs: default_dequeue_timeout_secs(),
            running_timeout_secs: default_running_timeout_secs(),
            max_retries: default_max_retries(),
            rate_per_second: default_rate_per_second(),
            burst: default_burst(),
            publish_retries: default_publish_retries(),
        }
    }
}

impl EventBusConfig {
    pub fn sync_period(&self) -> Duration {
        Duration::from_millis(self.sync_period_ms)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_secs(self.dequeue_timeout_secs)
    }

    pub fn running_timeout(&self) -> Duration {
        Duration::from_secs(self.running_timeout_secs)
    }
}

/// Connection settings for the WES-compatible engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per request on transient failures.
    #[serde(default = "default_engine_max_attempts")]
    pub max_attempts: u32,
}

fn default_engine_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_engine_timeout_secs() -> u64 {
    30
}

fn default_engine_max_attempts() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_engine_base_url(),
            timeout_secs: default_engine_timeout_secs(),
            max_attempts: default_engine_max_attempts(),
        }
    }
}
