use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::transitions::WritePlan;
use crate::clock::{Clock, SystemClock};
use crate::config::QueueConfig;
use crate::error::{Result, TriageError};
use crate::notifier::{ChangeNotifier, QueueEvent, QueueEventKind};
use crate::store::{CommitOutcome, PatientDirectory, QueueStore, StaffStore};
use crate::types::{
    JoinedQueueEntry, PatientId, PatientSummary, QueueCommit, QueueEntry, QueueEntryId, StaffChange,
    StaffId, StaffMember,
};

/// Result of [`QueueCoordinator::commit_planned`]
pub(super) struct Applied {
    pub entry: QueueEntry,
    pub staff_changes: Vec<StaffChange>,
    /// False when the plan was empty and nothing was committed
    pub written: bool,
}

/// Queue coordinator: the only writer of queue entries and staff links
///
/// Every mutating operation follows load → plan → commit → notify. The commit
/// is guarded by the entry version; a lost race reloads and plans again.
#[derive(Clone)]
pub struct QueueCoordinator {
    pub(super) queue: Arc<dyn QueueStore>,
    pub(super) staff: Arc<dyn StaffStore>,
    pub(super) patients: Arc<dyn PatientDirectory>,
    pub(super) notifier: ChangeNotifier,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: QueueConfig,
}

impl QueueCoordinator {
    /// Build a coordinator over a store that holds both queue entries and staff
    pub fn new<S>(store: Arc<S>, patients: Arc<dyn PatientDirectory>, notifier: ChangeNotifier, config: QueueConfig) -> Self
    where
        S: QueueStore + StaffStore + 'static,
    {
        let queue: Arc<dyn QueueStore> = store.clone();
        let staff: Arc<dyn StaffStore> = store;
        Self::from_parts(queue, staff, patients, notifier, config)
    }

    /// Build a coordinator from separate queue and staff stores. The two must
    /// share a transaction scope: staff changes are applied by `QueueStore::commit`.
    pub fn from_parts(
        queue: Arc<dyn QueueStore>,
        staff: Arc<dyn StaffStore>,
        patients: Arc<dyn PatientDirectory>,
        notifier: ChangeNotifier,
        config: QueueConfig,
    ) -> Self {
        Self {
            queue,
            staff,
            patients,
            notifier,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub(super) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Load, plan and commit until the commit lands on the version it planned from
    pub(super) async fn commit_planned<F>(&self, id: QueueEntryId, plan: F) -> Result<Applied>
    where
        F: Fn(&QueueEntry, DateTime<Utc>) -> Result<WritePlan>,
    {
        let attempts = self.config.max_update_retries.max(1);

        for attempt in 1..=attempts {
            let entry = self
                .queue
                .get_entry(id)
                .await?
                .ok_or_else(|| TriageError::not_found(format!("queue entry {}", id)))?;

            let now = self.now();
            let planned = plan(&entry, now)?;
            if planned.is_noop() {
                debug!("Nothing to write for queue entry {}", id);
                return Ok(Applied {
                    entry,
                    staff_changes: Vec::new(),
                    written: false,
                });
            }

            for change in &planned.staff_changes {
                if let StaffChange::Assign { staff_id, .. } = change {
                    if self.staff.get_staff(*staff_id).await?.is_none() {
                        return Err(TriageError::not_found(format!("staff member {}", staff_id)));
                    }
                }
            }

            let staff_changes = planned.staff_changes.clone();
            let outcome = self
                .queue
                .commit(QueueCommit {
                    entry_id: id,
                    expected_version: entry.version,
                    patch: planned.patch,
                    staff_changes: planned.staff_changes,
                    updated_at: now,
                })
                .await?;

            match outcome {
                CommitOutcome::Committed(updated) => {
                    return Ok(Applied {
                        entry: updated,
                        staff_changes,
                        written: true,
                    })
                }
                CommitOutcome::Missing => return Err(TriageError::not_found(format!("queue entry {}", id))),
                CommitOutcome::VersionMismatch => {
                    warn!(
                        "⚠️ Queue entry {} changed concurrently (attempt {}/{}), retrying",
                        id, attempt, attempts
                    );
                }
            }
        }

        Err(TriageError::conflict(format!(
            "queue entry {} kept changing, gave up after {} attempts",
            id, attempts
        )))
    }

    /// Enrich entries with patient and staff display fields
    pub(super) async fn join_entries(&self, entries: Vec<QueueEntry>) -> Result<Vec<JoinedQueueEntry>> {
        let mut patients: HashMap<PatientId, Option<PatientSummary>> = HashMap::new();
        let mut staff: HashMap<StaffId, Option<StaffMember>> = HashMap::new();
        let mut joined = Vec::with_capacity(entries.len());

        for entry in entries {
            if !patients.contains_key(&entry.patient_id) {
                let patient = self.patients.get_patient(entry.patient_id).await?;
                patients.insert(entry.patient_id, patient);
            }
            if let Some(staff_id) = entry.staff_id {
                if !staff.contains_key(&staff_id) {
                    let member = self.staff.get_staff(staff_id).await?;
                    staff.insert(staff_id, member);
                }
            }

            let patient = patients.get(&entry.patient_id).and_then(Option::as_ref);
            let member = entry.staff_id.and_then(|id| staff.get(&id)).and_then(Option::as_ref);
            joined.push(JoinedQueueEntry::new(entry, patient, member));
        }

        Ok(joined)
    }

    pub(super) async fn join_entry(&self, entry: QueueEntry) -> Result<JoinedQueueEntry> {
        self.join_entries(vec![entry])
            .await?
            .pop()
            .ok_or_else(|| TriageError::internal("joining a single entry produced nothing"))
    }

    pub(super) fn notify<T: serde::Serialize>(&self, kind: QueueEventKind, payload: &T) {
        self.notifier.broadcast(QueueEvent::from_payload(kind, payload));
    }

    /// Announce staff members touched by a commit
    pub(super) fn notify_staff_changes(&self, changes: &[StaffChange]) {
        if changes.is_empty() {
            return;
        }

        let staff_ids: Vec<StaffId> = changes
            .iter()
            .map(|change| match *change {
                StaffChange::Assign { staff_id, .. } | StaffChange::Release { staff_id, .. } => staff_id,
            })
            .collect();
        self.notify(QueueEventKind::StaffUpdated, &serde_json::json!({ "staff_ids": staff_ids }));
    }
}
