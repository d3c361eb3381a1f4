//! Triage engine configuration
//!
//! Configuration is layered: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `TRIAGE__` (sections separated by `__`,
//! e.g. `TRIAGE__DATABASE__URL=sqlite://triage.db?mode=rwc`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};
use crate::logging::LoggingConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Database settings
    pub database: DatabaseConfig,

    /// Queue estimation and concurrency settings
    pub queue: QueueConfig,

    /// Change notifier settings
    pub notifier: NotifierConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the API listens on
    pub bind_address: String,

    /// Interval of the periodic queue statistics log line (seconds, 0 disables)
    pub stats_interval_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL
    pub url: String,

    /// Maximum pooled connections (forced to 1 for in-memory databases)
    pub max_connections: u32,

    /// Insert the default staff roster when the staff table is empty
    pub seed_default_staff: bool,
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Floor of the check-in wait estimate
    pub min_estimated_wait_minutes: i64,

    /// Minutes added to the estimate per patient already waiting
    pub minutes_per_waiting_patient: i64,

    /// Attempts at an update before giving up on version conflicts
    pub max_update_retries: u32,
}

/// Change notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Events buffered per observer before further events are dropped for it
    pub observer_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:10000".to_string(),
            stats_interval_secs: 60,
        }
    }
}

/// SQLite URL of a private in-memory database
pub const IN_MEMORY_URL: &str = "sqlite::memory:";

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://triage.db?mode=rwc".to_string(),
            max_connections: 5,
            seed_default_staff: false,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_estimated_wait_minutes: 5,
            minutes_per_waiting_patient: 10,
            max_update_retries: 3,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { observer_buffer: 256 }
    }
}

impl DatabaseConfig {
    /// Private in-memory database, gone when the pool closes
    pub fn in_memory() -> Self {
        Self {
            url: IN_MEMORY_URL.to_string(),
            ..Default::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

impl QueueConfig {
    /// Linear backlog estimate for a new check-in
    pub fn estimate_wait_minutes(&self, waiting_count: i64) -> i64 {
        waiting_count
            .max(0)
            .saturating_mul(self.minutes_per_waiting_patient)
            .max(self.min_estimated_wait_minutes)
    }
}

impl TriageConfig {
    /// Load defaults, an optional config file, then `TRIAGE__*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("TRIAGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: TriageConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(TriageError::config(format!(
                "Invalid bind address: {}",
                self.server.bind_address
            )));
        }

        if self.database.url.trim().is_empty() {
            return Err(TriageError::config("database url cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(TriageError::config("max_connections must be greater than 0"));
        }

        if self.queue.min_estimated_wait_minutes < 0 || self.queue.minutes_per_waiting_patient < 0 {
            return Err(TriageError::config("wait estimate parameters cannot be negative"));
        }

        if self.queue.max_update_retries == 0 {
            return Err(TriageError::config("max_update_retries must be greater than 0"));
        }

        if self.notifier.observer_buffer == 0 {
            return Err(TriageError::config("observer_buffer must be greater than 0"));
        }

        crate::logging::parse_log_level(&self.logging.level)?;

        Ok(())
    }
}
