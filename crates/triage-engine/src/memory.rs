//! In-process store implementations
//!
//! [`MemoryTriageStore`] keeps queue entries and staff behind one lock so that a
//! commit is atomic exactly like the SQLite transaction. Useful for tests and
//! for running the engine without a database file.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{Result, TriageError};
use crate::priority::queue_order;
use crate::store::{CommitOutcome, PatientDirectory, QueueStore, StaffStore};
use crate::types::{
    NewQueueEntry, PatientId, PatientSummary, QueueCommit, QueueEntry, QueueEntryId, QueueStats,
    QueueStatus, StaffChange, StaffId, StaffMember, TriageLevel,
};

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<QueueEntryId, QueueEntry>,
    staff: BTreeMap<StaffId, StaffMember>,
    next_entry_id: QueueEntryId,
    next_staff_id: StaffId,
}

/// Queue and staff store held in memory
#[derive(Clone, Default)]
pub struct MemoryTriageStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTriageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryTriageStore {
    async fn insert_entry(&self, new: NewQueueEntry) -> Result<QueueEntry> {
        let mut state = self.state.lock();
        state.next_entry_id += 1;

        let entry = QueueEntry {
            id: state.next_entry_id,
            patient_id: new.patient_id,
            staff_id: None,
            triage_level: new.triage_level,
            status: QueueStatus::Waiting,
            check_in_time: new.check_in_time,
            estimated_wait_minutes: new.estimated_wait_minutes,
            actual_wait_minutes: None,
            priority_score: new.priority_score,
            notes: new.notes,
            version: 0,
            created_at: new.check_in_time,
            updated_at: new.check_in_time,
        };
        state.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_entry(&self, id: QueueEntryId) -> Result<Option<QueueEntry>> {
        Ok(self.state.lock().entries.get(&id).cloned())
    }

    async fn list_entries(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>> {
        let mut entries: Vec<QueueEntry> = self
            .state
            .lock()
            .entries
            .values()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        entries.sort_by(queue_order);
        Ok(entries)
    }

    async fn count_by_status(&self, status: QueueStatus) -> Result<i64> {
        let count = self.state.lock().entries.values().filter(|e| e.status == status).count();
        Ok(count as i64)
    }

    async fn latest_unfinished_for_patient(&self, patient_id: PatientId) -> Result<Option<QueueEntry>> {
        Ok(self
            .state
            .lock()
            .entries
            .values()
            .filter(|e| e.patient_id == patient_id && e.status != QueueStatus::Completed)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let state = self.state.lock();
        let mut stats = QueueStats::default();
        let mut waiting_estimate_total = 0i64;

        for entry in state.entries.values() {
            match entry.status {
                QueueStatus::Waiting => {
                    stats.waiting_count += 1;
                    waiting_estimate_total += entry.estimated_wait_minutes;
                }
                QueueStatus::InProgress => stats.in_progress_count += 1,
                QueueStatus::Completed => {
                    stats.completed_count += 1;
                    continue;
                }
                QueueStatus::Cancelled => continue,
            }

            match entry.triage_level {
                TriageLevel::Immediate => stats.immediate_count += 1,
                TriageLevel::Urgent => stats.urgent_count += 1,
                _ => {}
            }
        }

        if stats.waiting_count > 0 {
            stats.avg_wait_time = Some(waiting_estimate_total as f64 / stats.waiting_count as f64);
        }
        Ok(stats)
    }

    async fn commit(&self, commit: QueueCommit) -> Result<CommitOutcome> {
        let mut state = self.state.lock();

        let current_version = match state.entries.get(&commit.entry_id) {
            Some(entry) => entry.version,
            None => return Ok(CommitOutcome::Missing),
        };
        if current_version != commit.expected_version {
            return Ok(CommitOutcome::VersionMismatch);
        }

        // Validate every staff change before touching anything
        for change in &commit.staff_changes {
            if let StaffChange::Assign { staff_id, queue_entry_id } = change {
                let staff = state
                    .staff
                    .get(staff_id)
                    .ok_or_else(|| TriageError::not_found(format!("staff member {}", staff_id)))?;
                if let Some(other) = staff.assigned_queue_entry_id.filter(|other| other != queue_entry_id) {
                    return Err(TriageError::conflict(format!(
                        "staff member {} is already treating queue entry {}",
                        staff_id, other
                    )));
                }
            }
        }

        for change in &commit.staff_changes {
            match *change {
                StaffChange::Assign { staff_id, queue_entry_id } => {
                    if let Some(staff) = state.staff.get_mut(&staff_id) {
                        staff.is_available = false;
                        staff.assigned_queue_entry_id = Some(queue_entry_id);
                        staff.updated_at = commit.updated_at;
                    }
                }
                StaffChange::Release { staff_id, queue_entry_id } => {
                    if let Some(staff) = state.staff.get_mut(&staff_id) {
                        if staff.assigned_queue_entry_id.map_or(true, |id| id == queue_entry_id) {
                            staff.is_available = true;
                            staff.assigned_queue_entry_id = None;
                            staff.updated_at = commit.updated_at;
                        }
                    }
                }
            }
        }

        let entry = state
            .entries
            .get_mut(&commit.entry_id)
            .ok_or_else(|| TriageError::internal(format!("queue entry {} vanished during commit", commit.entry_id)))?;
        commit.patch.apply_to(entry);
        entry.version += 1;
        entry.updated_at = commit.updated_at;

        Ok(CommitOutcome::Committed(entry.clone()))
    }
}

#[async_trait]
impl StaffStore for MemoryTriageStore {
    async fn create_staff(&self, name: &str, role: &str, is_available: bool, now: DateTime<Utc>) -> Result<StaffMember> {
        let mut state = self.state.lock();
        state.next_staff_id += 1;

        let staff = StaffMember {
            id: state.next_staff_id,
            name: name.to_string(),
            role: role.to_string(),
            is_available,
            assigned_queue_entry_id: None,
            created_at: now,
            updated_at: now,
        };
        state.staff.insert(staff.id, staff.clone());
        Ok(staff)
    }

    async fn get_staff(&self, id: StaffId) -> Result<Option<StaffMember>> {
        Ok(self.state.lock().staff.get(&id).cloned())
    }

    async fn list_staff(&self) -> Result<Vec<StaffMember>> {
        let mut staff: Vec<StaffMember> = self.state.lock().staff.values().cloned().collect();
        staff.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(staff)
    }

    async fn list_available_staff(&self) -> Result<Vec<StaffMember>> {
        let mut staff = self.list_staff().await?;
        staff.retain(|s| s.is_available);
        Ok(staff)
    }

    async fn set_availability(&self, id: StaffId, is_available: bool, now: DateTime<Utc>) -> Result<Option<StaffMember>> {
        let mut state = self.state.lock();
        let Some(staff) = state.staff.get_mut(&id) else {
            return Ok(None);
        };

        staff.is_available = is_available;
        if is_available {
            staff.assigned_queue_entry_id = None;
        }
        staff.updated_at = now;
        Ok(Some(staff.clone()))
    }

    async fn count_staff(&self) -> Result<i64> {
        Ok(self.state.lock().staff.len() as i64)
    }
}

/// Patient directory held in memory
#[derive(Clone, Default)]
pub struct MemoryPatientDirectory {
    patients: Arc<DashMap<PatientId, PatientSummary>>,
}

impl MemoryPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, patient: PatientSummary) {
        self.patients.insert(patient.id, patient);
    }

    /// Convenience for fixtures: a patient with just a name
    pub fn insert_named(&self, id: PatientId, first_name: &str, last_name: &str) {
        self.insert(PatientSummary {
            id,
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            ..Default::default()
        });
    }
}

#[async_trait]
impl PatientDirectory for MemoryPatientDirectory {
    async fn get_patient(&self, id: PatientId) -> Result<Option<PatientSummary>> {
        Ok(self.patients.get(&id).map(|p| p.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueueEntryPatch;

    fn new_entry(patient_id: PatientId, level: TriageLevel, score: i64) -> NewQueueEntry {
        NewQueueEntry {
            patient_id,
            triage_level: level,
            notes: None,
            estimated_wait_minutes: 10,
            priority_score: score,
            check_in_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_stats_counts_active_entries() {
        let store = MemoryTriageStore::new();
        store.insert_entry(new_entry(1, TriageLevel::Immediate, 1000)).await.unwrap();
        store.insert_entry(new_entry(2, TriageLevel::Urgent, 500)).await.unwrap();
        let done = store.insert_entry(new_entry(3, TriageLevel::Urgent, 500)).await.unwrap();

        store
            .commit(QueueCommit {
                entry_id: done.id,
                expected_version: 0,
                patch: QueueEntryPatch {
                    status: Some(QueueStatus::Completed),
                    ..Default::default()
                },
                staff_changes: vec![],
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.waiting_count, 2);
        assert_eq!(stats.completed_count, 1);
        assert_eq!(stats.immediate_count, 1);
        assert_eq!(stats.urgent_count, 1);
        assert_eq!(stats.avg_wait_time, Some(10.0));
    }

    #[tokio::test]
    async fn test_release_skips_staff_on_another_entry() {
        let store = MemoryTriageStore::new();
        let staff = store.create_staff("Dr. Amy Lee", "Physician", true, Utc::now()).await.unwrap();
        let first = store.insert_entry(new_entry(1, TriageLevel::Urgent, 500)).await.unwrap();
        let second = store.insert_entry(new_entry(2, TriageLevel::Urgent, 500)).await.unwrap();

        store
            .commit(QueueCommit {
                entry_id: second.id,
                expected_version: 0,
                patch: QueueEntryPatch::default(),
                staff_changes: vec![StaffChange::Assign {
                    staff_id: staff.id,
                    queue_entry_id: second.id,
                }],
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        store
            .commit(QueueCommit {
                entry_id: first.id,
                expected_version: 0,
                patch: QueueEntryPatch::default(),
                staff_changes: vec![StaffChange::Release {
                    staff_id: staff.id,
                    queue_entry_id: first.id,
                }],
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let staff = store.get_staff(staff.id).await.unwrap().unwrap();
        assert!(!staff.is_available);
        assert_eq!(staff.assigned_queue_entry_id, Some(second.id));
    }

    #[tokio::test]
    async fn test_busy_staff_cannot_be_assigned_elsewhere() {
        let store = MemoryTriageStore::new();
        let staff = store.create_staff("Dr. Amy Lee", "Physician", true, Utc::now()).await.unwrap();
        let first = store.insert_entry(new_entry(1, TriageLevel::Urgent, 500)).await.unwrap();
        let second = store.insert_entry(new_entry(2, TriageLevel::Urgent, 500)).await.unwrap();

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
            updated_at: Utc::now(),
        };

        store.commit(assign(first.id)).await.unwrap();
        let refused = store.commit(assign(second.id)).await;
        assert!(matches!(refused, Err(TriageError::Conflict(_))));

        let second = store.get_entry(second.id).await.unwrap().unwrap();
        assert_eq!(second.version, 0);
        assert_eq!(second.staff_id, None);
        let staff = store.get_staff(staff.id).await.unwrap().unwrap();
        assert_eq!(staff.assigned_queue_entry_id, Some(first.id));
    }

    #[tokio::test]
    async fn test_patient_directory() {
        let directory = MemoryPatientDirectory::new();
        directory.insert_named(10, "Ana", "Ruiz");

        let patient = directory.get_patient(10).await.unwrap().unwrap();
        assert_eq!(patient.last_name.as_deref(), Some("Ruiz"));
        assert!(directory.get_patient(11).await.unwrap().is_none());
    }

    proptest::proptest! {
        #[test]
        fn prop_listing_is_priority_then_arrival(
            arrivals in proptest::collection::vec((0i64..1_250, 0i64..120), 1..40)
        ) {
            let store = MemoryTriageStore::new();
            let start = Utc::now();

            futures::executor::block_on(async {
                for (i, (score, offset)) in arrivals.iter().enumerate() {
                    let mut entry = new_entry(i as PatientId, TriageLevel::Urgent, *score);
                    entry.check_in_time = start + chrono::Duration::minutes(*offset);
                    store.insert_entry(entry).await.unwrap();
                }
            });

            let listed = futures::executor::block_on(store.list_entries(None)).unwrap();
            proptest::prop_assert_eq!(listed.len(), arrivals.len());
            for pair in listed.windows(2) {
                proptest::prop_assert!(pair[0].priority_score >= pair[1].priority_score);
                if pair[0].priority_score == pair[1].priority_score {
                    proptest::prop_assert!(pair[0].check_in_time <= pair[1].check_in_time);
                }
            }
        }
    }
}
