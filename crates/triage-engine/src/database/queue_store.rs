//! # Queue Store Database Operations
//!
//! SQLite implementation of [`QueueStore`]. Entries are read in listing order
//! directly from SQL (`priority_score DESC, check_in_time ASC, id ASC`), and
//! every write after check-in goes through [`QueueStore::commit`], which
//! guards the row with its `version` column and applies the staff side effects
//! inside the same transaction.
//!
//! ## Commit protocol
//!
//! ```text
//! BEGIN
//!   UPDATE queue_entries SET ..., version = version + 1
//!    WHERE id = ? AND version = ?          -- 0 rows: rollback, report why
//!   UPDATE staff ...                        -- one per StaffChange
//!   SELECT the updated entry
//! COMMIT
//! ```
//!
//! ## Examples
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use triage_engine::database::{SqliteTriageStore, TriageDatabase};
//! use triage_engine::store::QueueStore;
//! use triage_engine::types::{NewQueueEntry, QueueStatus, TriageLevel};
//!
//! # async fn example() -> triage_engine::error::Result<()> {
//! let db = TriageDatabase::new_in_memory().await?;
//! let store = SqliteTriageStore::new(db);
//!
//! let entry = store.insert_entry(NewQueueEntry {
//!     patient_id: 42,
//!     triage_level: TriageLevel::Urgent,
//!     notes: None,
//!     estimated_wait_minutes: 5,
//!     priority_score: 500,
//!     check_in_time: Utc::now(),
//! }).await?;
//!
//! let waiting = store.list_entries(Some(QueueStatus::Waiting)).await?;
//! assert_eq!(waiting[0].id, entry.id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use tracing::{debug, info};

use super::{from_millis, to_millis, TriageDatabase};
use crate::error::{Result, TriageError};
use crate::store::{CommitOutcome, QueueStore};
use crate::types::{
    NewQueueEntry, PatientId, QueueCommit, QueueEntry, QueueEntryId, QueueStats, QueueStatus,
    StaffChange,
};

const ENTRY_COLUMNS: &str = "id, patient_id, staff_id, triage_level, status, check_in_time, \
     estimated_wait_minutes, actual_wait_minutes, priority_score, notes, version, created_at, updated_at";

/// SQLite-backed queue and staff store
#[derive(Clone)]
pub struct SqliteTriageStore {
    db: TriageDatabase,
}

/// Raw `queue_entries` row
#[derive(sqlx::FromRow, Debug)]
struct QueueEntryRow {
    id: i64,
    patient_id: i64,
    staff_id: Option<i64>,
    triage_level: String,
    status: String,
    check_in_time: i64,
    estimated_wait_minutes: i64,
    actual_wait_minutes: Option<i64>,
    priority_score: i64,
    notes: Option<String>,
    version: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<QueueEntryRow> for QueueEntry {
    type Error = TriageError;

    fn try_from(row: QueueEntryRow) -> Result<Self> {
        Ok(QueueEntry {
            id: row.id,
            patient_id: row.patient_id,
            staff_id: row.staff_id,
            triage_level: row.triage_level.parse()?,
            status: row.status.parse()?,
            check_in_time: from_millis(row.check_in_time)?,
            estimated_wait_minutes: row.estimated_wait_minutes,
            actual_wait_minutes: row.actual_wait_minutes,
            priority_score: row.priority_score,
            notes: row.notes,
            version: row.version,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow, Debug)]
struct StatsRow {
    waiting_count: i64,
    in_progress_count: i64,
    completed_count: i64,
    avg_wait_time: Option<f64>,
    immediate_count: i64,
    urgent_count: i64,
}

impl SqliteTriageStore {
    pub fn new(db: TriageDatabase) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &TriageDatabase {
        &self.db
    }

    async fn fetch_entry<'e, E>(executor: E, id: QueueEntryId) -> Result<Option<QueueEntry>>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let sql = format!("SELECT {} FROM queue_entries WHERE id = ?", ENTRY_COLUMNS);
        let row = sqlx::query_as::<_, QueueEntryRow>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        row.map(QueueEntry::try_from).transpose()
    }
}

#[async_trait]
impl QueueStore for SqliteTriageStore {
    async fn insert_entry(&self, entry: NewQueueEntry) -> Result<QueueEntry> {
        let check_in = to_millis(entry.check_in_time);

        let result = sqlx::query(
            "INSERT INTO queue_entries
                (patient_id, triage_level, status, check_in_time, estimated_wait_minutes,
                 priority_score, notes, version, created_at, updated_at)
             VALUES (?, ?, 'waiting', ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(entry.patient_id)
        .bind(entry.triage_level.as_str())
        .bind(check_in)
        .bind(entry.estimated_wait_minutes)
        .bind(entry.priority_score)
        .bind(entry.notes.as_deref())
        .bind(check_in)
        .bind(check_in)
        .execute(self.db.pool())
        .await?;

        let id = result.last_insert_rowid();
        info!(
            "📥 Queue entry {} created for patient {} ({}, score {})",
            id, entry.patient_id, entry.triage_level, entry.priority_score
        );

        Self::fetch_entry(self.db.pool(), id)
            .await?
            .ok_or_else(|| TriageError::internal(format!("queue entry {} vanished after insert", id)))
    }

    async fn get_entry(&self, id: QueueEntryId) -> Result<Option<QueueEntry>> {
        Self::fetch_entry(self.db.pool(), id).await
    }

    async fn list_entries(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM queue_entries WHERE status = ?
                     ORDER BY priority_score DESC, check_in_time ASC, id ASC",
                    ENTRY_COLUMNS
                );
                sqlx::query_as::<_, QueueEntryRow>(&sql)
                    .bind(status.as_str())
                    .fetch_all(self.db.pool())
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM queue_entries
                     ORDER BY priority_score DESC, check_in_time ASC, id ASC",
                    ENTRY_COLUMNS
                );
                sqlx::query_as::<_, QueueEntryRow>(&sql)
                    .fetch_all(self.db.pool())
                    .await?
            }
        };

        debug!("Loaded {} queue entries (filter: {:?})", rows.len(), status);
        rows.into_iter().map(QueueEntry::try_from).collect()
    }

    async fn count_by_status(&self, status: QueueStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    async fn latest_unfinished_for_patient(&self, patient_id: PatientId) -> Result<Option<QueueEntry>> {
        let sql = format!(
            "SELECT {} FROM queue_entries
             WHERE patient_id = ? AND status != 'completed'
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
            ENTRY_COLUMNS
        );
        let row = sqlx::query_as::<_, QueueEntryRow>(&sql)
            .bind(patient_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.map(QueueEntry::try_from).transpose()
    }

    async fn stats(&self) -> Result<QueueStats> {
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT
                COALESCE(SUM(CASE WHEN status = 'waiting' THEN 1 ELSE 0 END), 0) AS waiting_count,
                COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0) AS in_progress_count,
                (SELECT COUNT(*) FROM queue_entries WHERE status = 'completed') AS completed_count,
                AVG(CASE WHEN status = 'waiting' THEN estimated_wait_minutes END) AS avg_wait_time,
                COALESCE(SUM(CASE WHEN triage_level = 'immediate' THEN 1 ELSE 0 END), 0) AS immediate_count,
                COALESCE(SUM(CASE WHEN triage_level = 'urgent' THEN 1 ELSE 0 END), 0) AS urgent_count
             FROM queue_entries
             WHERE status IN ('waiting', 'in_progress')",
        )
        .fetch_one(self.db.pool())
        .await?;

        Ok(QueueStats {
            waiting_count: row.waiting_count,
            in_progress_count: row.in_progress_count,
            completed_count: row.completed_count,
            avg_wait_time: row.avg_wait_time,
            immediate_count: row.immediate_count,
            urgent_count: row.urgent_count,
        })
    }

    async fn commit(&self, commit: QueueCommit) -> Result<CommitOutcome> {
        let QueueCommit {
            entry_id,
            expected_version,
            patch,
            staff_changes,
            updated_at,
        } = commit;
        let updated_at = to_millis(updated_at);

        let mut tx = self.db.pool().begin().await?;

        let result = sqlx::query(
            "UPDATE queue_entries SET
                status = COALESCE(?, status),
                staff_id = COALESCE(?, staff_id),
                triage_level = COALESCE(?, triage_level),
                notes = COALESCE(?, notes),
                estimated_wait_minutes = COALESCE(?, estimated_wait_minutes),
                actual_wait_minutes = COALESCE(actual_wait_minutes, ?),
                priority_score = COALESCE(?, priority_score),
                version = version + 1,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.staff_id)
        .bind(patch.triage_level.map(|l| l.as_str()))
        .bind(patch.notes.as_deref())
        .bind(patch.estimated_wait_minutes)
        .bind(patch.actual_wait_minutes)
        .bind(patch.priority_score)
        .bind(updated_at)
        .bind(entry_id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM queue_entries WHERE id = ?")
                .bind(entry_id)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;

            return Ok(match exists {
                Some(_) => {
                    debug!("Queue entry {} moved past version {}", entry_id, expected_version);
                    CommitOutcome::VersionMismatch
                }
                None => CommitOutcome::Missing,
            });
        }

        for change in &staff_changes {
            match *change {
                StaffChange::Assign { staff_id, queue_entry_id } => {
                    // Only free staff, or staff already linked to this entry
                    let assigned = sqlx::query(
                        "UPDATE staff SET is_available = 0, assigned_queue_entry_id = ?, updated_at = ?
                         WHERE id = ? AND (assigned_queue_entry_id IS NULL OR assigned_queue_entry_id = ?)",
                    )
                    .bind(queue_entry_id)
                    .bind(updated_at)
                    .bind(staff_id)
                    .bind(queue_entry_id)
                    .execute(&mut *tx)
                    .await?;

                    if assigned.rows_affected() == 0 {
                        let busy_with: Option<Option<i64>> =
                            sqlx::query_scalar("SELECT assigned_queue_entry_id FROM staff WHERE id = ?")
                                .bind(staff_id)
                                .fetch_optional(&mut *tx)
                                .await?;
                        tx.rollback().await?;

                        return Err(match busy_with {
                            Some(other) => TriageError::conflict(format!(
                                "staff member {} is already treating queue entry {}",
                                staff_id,
                                other.unwrap_or_default()
                            )),
                            None => TriageError::not_found(format!("staff member {}", staff_id)),
                        });
                    }
                }
                StaffChange::Release { staff_id, queue_entry_id } => {
                    // Skipped when the staff member has moved on to another entry
                    sqlx::query(
                        "UPDATE staff SET is_available = 1, assigned_queue_entry_id = NULL, updated_at = ?
                         WHERE id = ? AND (assigned_queue_entry_id IS NULL OR assigned_queue_entry_id = ?)",
                    )
                    .bind(updated_at)
                    .bind(staff_id)
                    .bind(queue_entry_id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        let entry = Self::fetch_entry(&mut *tx, entry_id)
            .await?
            .ok_or_else(|| TriageError::internal(format!("queue entry {} vanished during commit", entry_id)))?;

        tx.commit().await?;

        debug!(
            "✅ Committed queue entry {} at version {} ({} staff changes)",
            entry_id,
            entry.version,
            staff_changes.len()
        );
        Ok(CommitOutcome::Committed(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StaffStore;
    use crate::types::{QueueEntryPatch, TriageLevel};
    use chrono::{Duration, Utc};

    async fn create_test_store() -> SqliteTriageStore {
        SqliteTriageStore::new(TriageDatabase::new_in_memory().await.unwrap())
    }

    fn new_entry(patient_id: PatientId, level: TriageLevel, score: i64, minutes_ago: i64) -> NewQueueEntry {
        NewQueueEntry {
            patient_id,
            triage_level: level,
            notes: None,
            estimated_wait_minutes: 5,
            priority_score: score,
            check_in_time: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = create_test_store().await;

        let entry = store
            .insert_entry(NewQueueEntry {
                notes: Some("chest pain".to_string()),
                ..new_entry(7, TriageLevel::Urgent, 500, 0)
            })
            .await
            .unwrap();

        assert_eq!(entry.status, QueueStatus::Waiting);
        assert_eq!(entry.version, 0);
        assert_eq!(entry.staff_id, None);
        assert_eq!(entry.actual_wait_minutes, None);

        let loaded = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(loaded, entry);
        assert_eq!(loaded.notes.as_deref(), Some("chest pain"));

        assert!(store.get_entry(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_priority_then_check_in() {
        let store = create_test_store().await;

        let low = store.insert_entry(new_entry(1, TriageLevel::NonUrgent, 50, 30)).await.unwrap();
        let late = store.insert_entry(new_entry(2, TriageLevel::Urgent, 500, 1)).await.unwrap();
        let early = store.insert_entry(new_entry(3, TriageLevel::Urgent, 500, 10)).await.unwrap();

        let ids: Vec<_> = store.list_entries(None).await.unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![early.id, late.id, low.id]);

        assert_eq!(store.count_by_status(QueueStatus::Waiting).await.unwrap(), 3);
        assert!(store.list_entries(Some(QueueStatus::Completed)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_version() {
        let store = create_test_store().await;
        let entry = store.insert_entry(new_entry(1, TriageLevel::Urgent, 500, 0)).await.unwrap();

        let patch = QueueEntryPatch {
            notes: Some("first".to_string()),
            ..Default::default()
        };
        let first = store
            .commit(QueueCommit {
                entry_id: entry.id,
                expected_version: 0,
                patch: patch.clone(),
                staff_changes: vec![],
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(matches!(first, CommitOutcome::Committed(ref e) if e.version == 1));

        let stale = store
            .commit(QueueCommit {
                entry_id: entry.id,
                expected_version: 0,
                patch,
                staff_changes: vec![],
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(stale, CommitOutcome::VersionMismatch);

        let missing = store
            .commit(QueueCommit {
                entry_id: 4242,
                expected_version: 0,
                patch: QueueEntryPatch::default(),
                staff_changes: vec![],
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(missing, CommitOutcome::Missing);
    }

    #[tokio::test]
    async fn test_commit_applies_staff_changes_atomically() {
        let store = create_test_store().await;
        let now = Utc::now();
        let staff = store.create_staff("Dr. Ada Park", "Physician", true, now).await.unwrap();
        let entry = store.insert_entry(new_entry(1, TriageLevel::Urgent, 500, 0)).await.unwrap();

        let outcome = store
            .commit(QueueCommit {
                entry_id: entry.id,
                expected_version: entry.version,
                patch: QueueEntryPatch {
                    status: Some(QueueStatus::InProgress),
                    staff_id: Some(staff.id),
                    actual_wait_minutes: Some(3),
                    ..Default::default()
                },
                staff_changes: vec![StaffChange::Assign {
                    staff_id: staff.id,
                    queue_entry_id: entry.id,
                }],
                updated_at: now,
            })
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        let busy = store.get_staff(staff.id).await.unwrap().unwrap();
        assert!(!busy.is_available);
        assert_eq!(busy.assigned_queue_entry_id, Some(entry.id));

        // Unknown staff id rolls back the entry patch too
        let failed = store
            .commit(QueueCommit {
                entry_id: entry.id,
                expected_version: 1,
                patch: QueueEntryPatch {
                    notes: Some("should not stick".to_string()),
                    ..Default::default()
                },
                staff_changes: vec![StaffChange::Assign {
                    staff_id: 777,
                    queue_entry_id: entry.id,
                }],
                updated_at: now,
            })
            .await;
        assert!(matches!(failed, Err(TriageError::NotFound(_))));

        let reloaded = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(reloaded.version, 1);
        assert_eq!(reloaded.notes, None);
        assert_eq!(reloaded.actual_wait_minutes, Some(3));
    }

    #[tokio::test]
    async fn test_commit_refuses_staff_linked_to_another_entry() {
        let store = create_test_store().await;
        let now = Utc::now();
        let staff = store.create_staff("Dr. Ada Park", "Physician", true, now).await.unwrap();
        let first = store.insert_entry(new_entry(1, TriageLevel::Urgent, 500, 0)).await.unwrap();
        let second = store.insert_entry(new_entry(2, TriageLevel::Urgent, 500, 0)).await.unwrap();

        let assign = |entry_id: QueueEntryId| QueueCommit {
            entry_id,
            expected_version: 0,
            patch: QueueEntryPatch {
                staff_id: Some(staff.id),
                ..Default::default()
            },
            staff_changes: vec![StaffChange::Assign {
                staff_id: staff.id,
                queue_entry_id: entry_id,
            }],
            updated_at: now,
        };

        assert!(matches!(store.commit(assign(first.id)).await.unwrap(), CommitOutcome::Committed(_)));
        assert!(matches!(store.commit(assign(second.id)).await, Err(TriageError::Conflict(_))));

        let second = store.get_entry(second.id).await.unwrap().unwrap();
        assert_eq!(second.version, 0);
        assert_eq!(second.staff_id, None);
        let busy = store.get_staff(staff.id).await.unwrap().unwrap();
        assert_eq!(busy.assigned_queue_entry_id, Some(first.id));
    }

    #[tokio::test]
    async fn test_actual_wait_is_written_once() {
        let store = create_test_store().await;
        let entry = store.insert_entry(new_entry(1, TriageLevel::Urgent, 500, 0)).await.unwrap();

        for (version, minutes) in [(0, 12), (1, 40)] {
            store
                .commit(QueueCommit {
                    entry_id: entry.id,
                    expected_version: version,
                    patch: QueueEntryPatch {
                        actual_wait_minutes: Some(minutes),
                        ..Default::default()
                    },
                    staff_changes: vec![],
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let reloaded = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(reloaded.actual_wait_minutes, Some(12));
    }

    #[tokio::test]
    async fn test_stats_on_empty_queue() {
        let store = create_test_store().await;
        let stats = store.stats().await.unwrap();

        assert_eq!(stats, QueueStats::default());
        assert_eq!(stats.avg_wait_time, None);
    }
}
