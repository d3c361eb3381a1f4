//! # Queue Coordinator
//!
//! Orchestrates check-in, assignment, status transitions and completion. It
//! calls the priority calculator, writes queue entries and staff links through
//! the storage traits, and announces every committed change on the
//! [`ChangeNotifier`](crate::notifier::ChangeNotifier).
//!
//! ## Module Organization
//!
//! - **[`core`]**: the [`QueueCoordinator`] itself, versioned commit loop, joins
//! - **[`queue`]**: check-in, listing, update, completion, patient status, stats
//! - **[`staff`]**: roster and availability operations
//! - **[`transitions`]**: pure planning of what a write changes
//!
//! ## Concurrency
//!
//! Operations are independent request handlers with no global lock. Each write
//! is planned from a loaded entry and committed only if the entry still has the
//! loaded version; otherwise it is replanned, up to
//! [`QueueConfig::max_update_retries`](crate::config::QueueConfig) attempts.
//! Entry patch and staff link changes share one commit.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use triage_engine::prelude::*;
//!
//! # async fn example() -> triage_engine::error::Result<()> {
//! let store = Arc::new(MemoryTriageStore::new());
//! let patients = Arc::new(MemoryPatientDirectory::new());
//! patients.insert_named(1, "Ana", "Ruiz");
//!
//! let coordinator = QueueCoordinator::new(store, patients, ChangeNotifier::default(), QueueConfig::default());
//!
//! let entry = coordinator.check_in(CheckInRequest::new(1, TriageLevel::Urgent)).await?;
//! assert_eq!(entry.priority_score, 500);
//!
//! let started = coordinator
//!     .update_entry(entry.id, QueueEntryUpdate {
//!         status: Some(QueueStatus::InProgress),
//!         ..Default::default()
//!     })
//!     .await?;
//! assert!(started.entry.actual_wait_minutes.is_some());
//!
//! coordinator.complete_entry(entry.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod queue;
pub mod staff;
pub mod transitions;

pub use self::core::QueueCoordinator;
pub use transitions::{plan_complete, plan_update, WritePlan};
