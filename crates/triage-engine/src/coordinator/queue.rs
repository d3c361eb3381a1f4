//! Queue operations: check-in, listing, updates, completion, lookups

use tracing::{debug, info};

use super::core::QueueCoordinator;
use super::transitions::{plan_complete, plan_update};
use crate::error::{Result, TriageError};
use crate::notifier::QueueEventKind;
use crate::priority::compute_priority;
use crate::types::{
    CheckInRequest, JoinedQueueEntry, NewQueueEntry, PatientId, QueueEntry, QueueEntryId, QueueEntryUpdate,
    QueueStats, QueueStatus,
};

impl QueueCoordinator {
    /// Check a patient in as a new waiting entry
    ///
    /// The wait estimate is a linear backlog estimate over the entries already
    /// waiting; the initial priority uses a wait of zero.
    pub async fn check_in(&self, request: CheckInRequest) -> Result<QueueEntry> {
        let (patient_id, triage_level) = match (request.patient_id, request.triage_level) {
            (Some(patient_id), Some(triage_level)) => (patient_id, triage_level),
            _ => return Err(TriageError::validation("patient_id and triage_level are required")),
        };

        if self.patients.get_patient(patient_id).await?.is_none() {
            return Err(TriageError::not_found(format!("patient {}", patient_id)));
        }

        let waiting = self.queue.count_by_status(QueueStatus::Waiting).await?;
        let new_entry = NewQueueEntry {
            patient_id,
            triage_level,
            notes: request.notes,
            estimated_wait_minutes: self.config.estimate_wait_minutes(waiting),
            priority_score: compute_priority(triage_level, 0),
            check_in_time: self.now(),
        };

        let entry = self.queue.insert_entry(new_entry).await?;
        info!(
            "🏥 Patient {} checked in as entry {} ({}, {} waiting ahead, ~{} min)",
            patient_id, entry.id, triage_level, waiting, entry.estimated_wait_minutes
        );

        let joined = self.join_entry(entry.clone()).await?;
        self.notify(QueueEventKind::QueueUpdated, &joined);
        Ok(entry)
    }

    /// Entries in listing order, optionally restricted to one status
    pub async fn list_queue(&self, status: Option<QueueStatus>) -> Result<Vec<JoinedQueueEntry>> {
        let entries = self.queue.list_entries(status).await?;
        debug!("Listing {} queue entries", entries.len());
        self.join_entries(entries).await
    }

    /// Aggregates over the active queue
    pub async fn get_stats(&self) -> Result<QueueStats> {
        self.queue.stats().await
    }

    /// Single entry with display fields
    pub async fn get_entry(&self, id: QueueEntryId) -> Result<JoinedQueueEntry> {
        let entry = self
            .queue
            .get_entry(id)
            .await?
            .ok_or_else(|| TriageError::not_found(format!("queue entry {}", id)))?;
        self.join_entry(entry).await
    }

    /// Apply a partial update under the queue state machine
    pub async fn update_entry(&self, id: QueueEntryId, update: QueueEntryUpdate) -> Result<JoinedQueueEntry> {
        let applied = self
            .commit_planned(id, |entry, now| plan_update(entry, &update, now))
            .await?;

        let joined = self.join_entry(applied.entry).await?;
        if !applied.written {
            return Ok(joined);
        }

        info!(
            "📝 Queue entry {} updated: status={}, triage={}, score={}, staff={:?}",
            id, joined.entry.status, joined.entry.triage_level, joined.entry.priority_score, joined.entry.staff_id
        );
        self.notify(QueueEventKind::QueueUpdated, &joined);
        self.notify_staff_changes(&applied.staff_changes);
        Ok(joined)
    }

    /// Finish treatment of an in_progress entry and free its staff member
    pub async fn complete_entry(&self, id: QueueEntryId) -> Result<QueueEntry> {
        let applied = self.commit_planned(id, |entry, _| plan_complete(entry)).await?;

        info!("✅ Queue entry {} completed (patient {})", id, applied.entry.patient_id);
        self.notify(QueueEventKind::QueueCompleted, &applied.entry);
        self.notify_staff_changes(&applied.staff_changes);
        Ok(applied.entry)
    }

    /// The patient's most recent entry that is not completed
    pub async fn get_patient_status(&self, patient_id: PatientId) -> Result<JoinedQueueEntry> {
        let entry = self
            .queue
            .latest_unfinished_for_patient(patient_id)
            .await?
            .ok_or_else(|| TriageError::not_found(format!("no active queue entry for patient {}", patient_id)))?;
        self.join_entry(entry).await
    }
}
