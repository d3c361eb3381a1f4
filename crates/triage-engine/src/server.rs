//! # Triage Server
//!
//! Wires the database, stores, notifier and coordinator together, serves the
//! HTTP API and runs a periodic queue statistics log.
//!
//! ```rust,no_run
//! use triage_engine::config::TriageConfig;
//! use triage_engine::server::TriageServerBuilder;
//!
//! # async fn example() -> triage_engine::error::Result<()> {
//! let mut server = TriageServerBuilder::new()
//!     .with_config(TriageConfig::default())
//!     .with_in_memory_database()
//!     .build()
//!     .await?;
//!
//! // Serves until Ctrl-C
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::api::{create_router, ApiState};
use crate::config::{TriageConfig, IN_MEMORY_URL};
use crate::coordinator::QueueCoordinator;
use crate::database::{SqlitePatientDirectory, SqliteTriageStore, TriageDatabase};
use crate::error::{Result, TriageError};
use crate::notifier::ChangeNotifier;

/// A complete triage service: database, coordinator and HTTP API
pub struct TriageServer {
    /// Persistence layer
    database: TriageDatabase,

    /// Queue coordinator shared with the API handlers
    coordinator: QueueCoordinator,

    /// Server configuration
    config: TriageConfig,

    /// Optional handle to the statistics task
    monitor_handle: Option<JoinHandle<()>>,
}

impl TriageServer {
    /// Connect the database and build the coordinator
    pub async fn new(config: TriageConfig) -> Result<Self> {
        config.validate()?;
        info!("🚀 Creating triage server");

        let database = TriageDatabase::new(&config.database).await?;
        let store = Arc::new(SqliteTriageStore::new(database.clone()));
        let patients = Arc::new(SqlitePatientDirectory::new(database.clone()));
        let notifier = ChangeNotifier::new(config.notifier.observer_buffer);

        let coordinator = QueueCoordinator::new(store, patients, notifier, config.queue.clone());

        if config.database.seed_default_staff {
            let seeded = coordinator.seed_default_staff().await?;
            if seeded > 0 {
                info!("👩‍⚕️ Seeded {} default staff members", seeded);
            }
        }

        info!("✅ Triage server initialized");
        Ok(Self {
            database,
            coordinator,
            config,
            monitor_handle: None,
        })
    }

    pub fn coordinator(&self) -> &QueueCoordinator {
        &self.coordinator
    }

    pub fn database(&self) -> &TriageDatabase {
        &self.database
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// HTTP router over this server's coordinator
    pub fn router(&self) -> Router {
        create_router(ApiState::new(self.coordinator.clone()).with_database(self.database.clone()))
    }

    /// Start background tasks
    pub fn start(&mut self) {
        let secs = self.config.server.stats_interval_secs;
        if secs == 0 || self.monitor_handle.is_some() {
            return;
        }

        let coordinator = self.coordinator.clone();
        self.monitor_handle = Some(tokio::spawn(async move {
            Self::monitor_loop(coordinator, Duration::from_secs(secs)).await;
        }));
        info!("✅ Started queue statistics monitor (every {}s)", secs);
    }

    /// Stop background tasks and close the pool
    pub async fn stop(&mut self) {
        info!("🛑 Stopping triage server...");

        if let Some(handle) = self.monitor_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        self.database.close().await;

        info!("✅ Triage server stopped");
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.server.bind_address)
            .await
            .map_err(|e| TriageError::config(format!("cannot bind {}: {}", self.config.server.bind_address, e)))?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves
    pub async fn serve<F>(&mut self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.start();

        match listener.local_addr() {
            Ok(addr) => info!("🏥 Triage API listening on http://{}", addr),
            Err(e) => warn!("Listening on an unknown address: {}", e),
        }

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        self.stop().await;
        served.map_err(|e| TriageError::internal(format!("HTTP server failed: {}", e)))
    }

    async fn monitor_loop(coordinator: QueueCoordinator, every: Duration) {
        let mut ticker = interval(every);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match coordinator.get_stats().await {
                Ok(stats) => info!(
                    "📊 Queue - waiting: {}, in progress: {}, completed: {}, immediate: {}, urgent: {}, avg estimate: {}",
                    stats.waiting_count,
                    stats.in_progress_count,
                    stats.completed_count,
                    stats.immediate_count,
                    stats.urgent_count,
                    stats
                        .avg_wait_time
                        .map(|avg| format!("{:.1} min", avg))
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Err(e) => error!("❌ Failed to collect queue statistics: {}", e),
            }
            info!("👀 Live observers: {}", coordinator.notifier().observer_count());
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Builder for [`TriageServer`]
pub struct TriageServerBuilder {
    config: Option<TriageConfig>,
    database_url: Option<String>,
}

impl TriageServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            database_url: None,
        }
    }

    /// Set the configuration
    pub fn with_config(mut self, config: TriageConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the database URL from the configuration
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Use an in-memory database
    pub fn with_in_memory_database(self) -> Self {
        self.with_database_url(IN_MEMORY_URL)
    }

    pub async fn build(self) -> Result<TriageServer> {
        let mut config = self.config.unwrap_or_default();
        if let Some(url) = self.database_url {
            config.database.url = url;
        }

        TriageServer::new(config).await
    }
}

impl Default for TriageServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_seeds_staff_when_asked() {
        let mut config = TriageConfig::default();
        config.database.seed_default_staff = true;

        let server = TriageServerBuilder::new()
            .with_config(config)
            .with_in_memory_database()
            .build()
            .await
            .unwrap();

        let staff = server.coordinator().list_staff().await.unwrap();
        assert_eq!(staff.len(), 4);
        assert!(server.database().health_check().await);
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let mut server = TriageServerBuilder::new().with_in_memory_database().build().await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
