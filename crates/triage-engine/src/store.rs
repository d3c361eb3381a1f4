//! Storage seams of the engine
//!
//! The coordinator only talks to these traits. [`crate::database::SqliteTriageStore`]
//! is the persistent implementation and [`crate::memory::MemoryTriageStore`] the
//! in-process one. Stores hold no business rules: no priority computation, no
//! state machine checks, no staff reconciliation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;
use crate::types::{
    NewQueueEntry, PatientId, PatientSummary, QueueCommit, QueueEntry, QueueEntryId, QueueStats,
    QueueStatus, StaffId, StaffMember,
};

/// Result of [`QueueStore::commit`]
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Patch and staff changes were written together
    Committed(QueueEntry),
    /// The entry changed since it was loaded; nothing was written
    VersionMismatch,
    /// No entry with that id; nothing was written
    Missing,
}

/// Persisted collection of queue entries
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a new waiting entry and return it with its assigned id
    async fn insert_entry(&self, entry: NewQueueEntry) -> Result<QueueEntry>;

    async fn get_entry(&self, id: QueueEntryId) -> Result<Option<QueueEntry>>;

    /// Entries (optionally of one status) ordered by priority descending,
    /// then check-in time ascending
    async fn list_entries(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>>;

    async fn count_by_status(&self, status: QueueStatus) -> Result<i64>;

    /// Most recently created entry of the patient whose status is not completed
    async fn latest_unfinished_for_patient(&self, patient_id: PatientId) -> Result<Option<QueueEntry>>;

    async fn stats(&self) -> Result<QueueStats>;

    /// Apply a version-guarded patch and its staff changes atomically
    async fn commit(&self, commit: QueueCommit) -> Result<CommitOutcome>;
}

/// Persisted collection of staff members
#[async_trait]
pub trait StaffStore: Send + Sync {
    async fn create_staff(&self, name: &str, role: &str, is_available: bool, now: DateTime<Utc>) -> Result<StaffMember>;

    async fn get_staff(&self, id: StaffId) -> Result<Option<StaffMember>>;

    /// All staff ordered by name
    async fn list_staff(&self) -> Result<Vec<StaffMember>>;

    /// Available staff ordered by name
    async fn list_available_staff(&self) -> Result<Vec<StaffMember>>;

    /// Direct availability toggle. `true` clears the queue entry link,
    /// `false` keeps it. Returns `None` for an unknown id.
    async fn set_availability(&self, id: StaffId, is_available: bool, now: DateTime<Utc>) -> Result<Option<StaffMember>>;

    async fn count_staff(&self) -> Result<i64>;
}

/// Patient-record lookup (patients are owned by another service)
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn get_patient(&self, id: PatientId) -> Result<Option<PatientSummary>>;
}

/// Roster inserted into an empty staff table
pub const DEFAULT_STAFF: [(&str, &str); 4] = [
    ("Dr. Sarah Chen", "Physician"),
    ("Dr. Michael Torres", "Physician"),
    ("Nurse Emily Johnson", "Nurse"),
    ("Nurse James Wilson", "Nurse"),
];

/// Insert [`DEFAULT_STAFF`] when no staff exist. Returns how many were added.
pub async fn seed_default_staff<S: StaffStore + ?Sized>(store: &S, now: DateTime<Utc>) -> Result<usize> {
    if store.count_staff().await? > 0 {
        return Ok(0);
    }

    for (name, role) in DEFAULT_STAFF {
        store.create_staff(name, role, true, now).await?;
    }

    debug!("Seeded {} default staff members", DEFAULT_STAFF.len());
    Ok(DEFAULT_STAFF.len())
}
