//! SQLite persistence through sqlx
//!
//! [`TriageDatabase`] owns the pool and the schema. [`SqliteTriageStore`] and
//! [`SqlitePatientDirectory`] are thin handles over it implementing the
//! storage traits in [`crate::store`].

pub mod patients;
pub mod queue_store;
pub mod schema;
pub mod staff_store;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::error::{Result, TriageError};

pub use patients::SqlitePatientDirectory;
pub use queue_store::SqliteTriageStore;

/// Triage database: connection pool plus schema management
#[derive(Clone)]
pub struct TriageDatabase {
    pool: SqlitePool,
}

impl TriageDatabase {
    /// Connect according to `config` and create the schema
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Initializing triage database at: {}", config.url);

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `sqlite::memory:` is a separate database, and
        // closing the last one discards it
        let pool_options = if config.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;

        let database = Self { pool };
        database.initialize_schema().await?;

        info!("✅ Triage database initialized successfully");
        Ok(database)
    }

    /// Create in-memory database for testing
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(&DatabaseConfig::in_memory()).await
    }

    /// Initialize database schema
    async fn initialize_schema(&self) -> Result<()> {
        debug!("📋 Creating triage database schema");

        schema::create_patients_table(&self.pool).await?;
        schema::create_staff_table(&self.pool).await?;
        schema::create_queue_entries_table(&self.pool).await?;
        schema::create_indexes(&self.pool).await?;

        debug!("✅ Database schema created successfully");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute a health check query
    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => {
                debug!("💚 Database health check passed");
                true
            }
            Err(e) => {
                error!("❌ Database health check failed: {}", e);
                false
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| TriageError::internal(format!("timestamp out of range: {}", millis)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_health() {
        let db = TriageDatabase::new_in_memory().await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_file_database_keeps_schema_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("triage.db").display());
        let config = DatabaseConfig {
            url,
            ..Default::default()
        };

        let db = TriageDatabase::new(&config).await.unwrap();
        db.close().await;

        let reopened = TriageDatabase::new(&config).await.unwrap();
        assert!(reopened.health_check().await);
    }

    #[test]
    fn test_millis_round_trip() {
        let time = from_millis(1_700_000_000_123).unwrap();
        assert_eq!(to_millis(time), 1_700_000_000_123);
    }
}
