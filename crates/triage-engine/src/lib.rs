//! # Triage Engine
//!
//! Queue ordering and state-transition engine for hospital patient triage.
//! Patients check in with a triage level, are ordered for treatment by a
//! triage-weighted priority score and check-in time, and move through
//! `waiting → in_progress → completed` (or `cancelled`) while staff are linked
//! to the entries they treat.
//!
//! ## Features
//!
//! - **Priority scoring**: fixed triage weights plus a capped wait bonus
//! - **Ordered queue**: priority descending, earliest check-in first on ties
//! - **State machine**: forward-only transitions, terminal completed/cancelled
//! - **Staff reconciliation**: assignment and release committed with the entry
//! - **Optimistic concurrency**: versioned entries, replanned on conflict
//! - **Live updates**: bounded, non-blocking fan-out to observers (SSE)
//! - **SQLite persistence** through sqlx, plus an in-memory store
//!
//! ## Architecture
//!
//! ```text
//!   HTTP (axum) ──► QueueCoordinator ──► priority
//!                        │     │
//!                        │     └──► ChangeNotifier ──► observers
//!                        ▼
//!        QueueStore + StaffStore + PatientDirectory
//!          (SqliteTriageStore | MemoryTriageStore)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use triage_engine::prelude::*;
//!
//! # async fn example() -> triage_engine::Result<()> {
//! let database = TriageDatabase::new_in_memory().await?;
//! let store = Arc::new(SqliteTriageStore::new(database.clone()));
//! let patients = Arc::new(SqlitePatientDirectory::new(database));
//!
//! let patient_id = patients
//!     .upsert_patient(&PatientSummary {
//!         first_name: Some("Ana".into()),
//!         last_name: Some("Ruiz".into()),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! let coordinator = QueueCoordinator::new(store, patients, ChangeNotifier::default(), QueueConfig::default());
//! coordinator.check_in(CheckInRequest::new(patient_id, TriageLevel::Immediate)).await?;
//!
//! for entry in coordinator.list_queue(Some(QueueStatus::Waiting)).await? {
//!     println!("{:?} {} ({})", entry.first_name, entry.entry.priority_score, entry.entry.triage_level);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod config;
pub mod logging;

pub mod types;
pub mod priority;
pub mod clock;

pub mod store;
pub mod database;
pub mod memory;

pub mod notifier;
pub mod coordinator;

pub mod api;
pub mod server;

pub use error::{Result, TriageError};
pub use config::TriageConfig;
pub use coordinator::QueueCoordinator;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{QueueCoordinator, Result, TriageConfig, TriageError};

    pub use crate::config::{DatabaseConfig, NotifierConfig, QueueConfig, ServerConfig};

    pub use crate::types::{
        CheckInRequest, CreateStaffRequest, JoinedQueueEntry, PatientId, PatientSummary, QueueEntry,
        QueueEntryId, QueueEntryUpdate, QueueStats, QueueStatus, StaffId, StaffListing, StaffMember,
        TriageLevel,
    };

    pub use crate::priority::compute_priority;
    pub use crate::clock::{Clock, ManualClock, SystemClock};

    pub use crate::store::{PatientDirectory, QueueStore, StaffStore};
    pub use crate::database::{SqlitePatientDirectory, SqliteTriageStore, TriageDatabase};
    pub use crate::memory::{MemoryPatientDirectory, MemoryTriageStore};

    pub use crate::notifier::{ChangeNotifier, QueueEvent, QueueEventKind};
    pub use crate::server::{TriageServer, TriageServerBuilder};

    pub use chrono::{DateTime, Utc};
}
