//! Pure planning of queue entry writes
//!
//! Given the loaded entry, the request and "now", these functions decide what
//! to write: the column patch and the staff link changes. They never touch a
//! store, so a retry after a version conflict simply plans again from the
//! freshly loaded entry.

use chrono::{DateTime, Utc};

use crate::clock::elapsed_minutes;
use crate::error::{Result, TriageError};
use crate::priority::compute_priority;
use crate::types::{QueueEntry, QueueEntryPatch, QueueEntryUpdate, QueueStatus, StaffChange};

/// What a single commit will write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePlan {
    pub patch: QueueEntryPatch,
    pub staff_changes: Vec<StaffChange>,
}

impl WritePlan {
    /// Nothing to write
    pub fn is_noop(&self) -> bool {
        self.patch == QueueEntryPatch::default() && self.staff_changes.is_empty()
    }
}

/// Plan a partial update of `entry`
pub fn plan_update(entry: &QueueEntry, update: &QueueEntryUpdate, now: DateTime<Utc>) -> Result<WritePlan> {
    if entry.status.is_terminal() {
        return Err(TriageError::InvalidTransition {
            from: entry.status,
            to: update.status.unwrap_or(entry.status),
        });
    }

    let next_status = match update.status {
        Some(status) if status != entry.status => {
            if !entry.status.can_transition_to(status) {
                return Err(TriageError::InvalidTransition {
                    from: entry.status,
                    to: status,
                });
            }
            Some(status)
        }
        _ => None,
    };
    let resulting_status = next_status.unwrap_or(entry.status);

    if let Some(minutes) = update.estimated_wait_minutes {
        if minutes < 0 {
            return Err(TriageError::validation("estimated_wait_minutes cannot be negative"));
        }
    }

    let mut plan = WritePlan {
        patch: QueueEntryPatch {
            status: next_status,
            notes: update.notes.clone(),
            estimated_wait_minutes: update.estimated_wait_minutes,
            ..Default::default()
        },
        staff_changes: Vec::new(),
    };

    if entry.status == QueueStatus::Waiting
        && resulting_status == QueueStatus::InProgress
        && entry.actual_wait_minutes.is_none()
    {
        plan.patch.actual_wait_minutes = Some(elapsed_minutes(entry.check_in_time, now));
    }

    if let Some(level) = update.triage_level.filter(|level| *level != entry.triage_level) {
        let wait = entry
            .actual_wait_minutes
            .or(plan.patch.actual_wait_minutes)
            .unwrap_or(0);
        plan.patch.triage_level = Some(level);
        plan.patch.priority_score = Some(compute_priority(level, wait));
    }

    if let Some(staff_id) = update.staff_id {
        if resulting_status != QueueStatus::InProgress {
            return Err(TriageError::validation(format!(
                "staff can only be assigned to an in_progress entry (entry {} would be {})",
                entry.id, resulting_status
            )));
        }

        if let Some(previous) = entry.staff_id.filter(|previous| *previous != staff_id) {
            plan.staff_changes.push(StaffChange::Release {
                staff_id: previous,
                queue_entry_id: entry.id,
            });
        }
        plan.patch.staff_id = Some(staff_id);
        plan.staff_changes.push(StaffChange::Assign {
            staff_id,
            queue_entry_id: entry.id,
        });
    }

    if resulting_status.is_terminal() {
        if let Some(staff_id) = entry.staff_id {
            plan.staff_changes.push(StaffChange::Release {
                staff_id,
                queue_entry_id: entry.id,
            });
        }
    }

    Ok(plan)
}

/// Plan completion of `entry`; only an in_progress entry can complete
pub fn plan_complete(entry: &QueueEntry) -> Result<WritePlan> {
    if entry.status != QueueStatus::InProgress {
        return Err(TriageError::InvalidTransition {
            from: entry.status,
            to: QueueStatus::Completed,
        });
    }

    let staff_changes = entry
        .staff_id
        .map(|staff_id| StaffChange::Release {
            staff_id,
            queue_entry_id: entry.id,
        })
        .into_iter()
        .collect();

    Ok(WritePlan {
        patch: QueueEntryPatch {
            status: Some(QueueStatus::Completed),
            ..Default::default()
        },
        staff_changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TriageLevel;
    use chrono::Duration;

    fn entry(status: QueueStatus) -> QueueEntry {
        let check_in = Utc::now() - Duration::minutes(30);
        QueueEntry {
            id: 3,
            patient_id: 11,
            staff_id: None,
            triage_level: TriageLevel::SemiUrgent,
            status,
            check_in_time: check_in,
            estimated_wait_minutes: 10,
            actual_wait_minutes: None,
            priority_score: 200,
            notes: None,
            version: 0,
            created_at: check_in,
            updated_at: check_in,
        }
    }

    #[test]
    fn test_start_treatment_fixes_wait_and_assigns_staff() {
        let waiting = entry(QueueStatus::Waiting);
        let update = QueueEntryUpdate {
            status: Some(QueueStatus::InProgress),
            staff_id: Some(7),
            ..Default::default()
        };

        let plan = plan_update(&waiting, &update, waiting.check_in_time + Duration::seconds(754)).unwrap();

        assert_eq!(plan.patch.status, Some(QueueStatus::InProgress));
        assert_eq!(plan.patch.actual_wait_minutes, Some(12));
        assert_eq!(plan.patch.priority_score, None);
        assert_eq!(
            plan.staff_changes,
            vec![StaffChange::Assign {
                staff_id: 7,
                queue_entry_id: 3
            }]
        );
    }

    #[test]
    fn test_priority_recomputed_only_on_real_triage_change() {
        let waiting = entry(QueueStatus::Waiting);

        let same = QueueEntryUpdate {
            triage_level: Some(TriageLevel::SemiUrgent),
            notes: Some("recheck".to_string()),
            ..Default::default()
        };
        let plan = plan_update(&waiting, &same, Utc::now()).unwrap();
        assert_eq!(plan.patch.priority_score, None);
        assert_eq!(plan.patch.triage_level, None);

        let escalate = QueueEntryUpdate {
            triage_level: Some(TriageLevel::Urgent),
            ..Default::default()
        };
        let plan = plan_update(&waiting, &escalate, Utc::now()).unwrap();
        assert_eq!(plan.patch.priority_score, Some(500));
    }

    #[test]
    fn test_triage_change_uses_fixed_wait_when_in_progress() {
        let mut treating = entry(QueueStatus::InProgress);
        treating.actual_wait_minutes = Some(25);

        let update = QueueEntryUpdate {
            triage_level: Some(TriageLevel::Immediate),
            ..Default::default()
        };
        let plan = plan_update(&treating, &update, Utc::now()).unwrap();

        assert_eq!(plan.patch.priority_score, Some(1050));
    }

    #[test]
    fn test_triage_change_together_with_start_uses_new_wait() {
        let waiting = entry(QueueStatus::Waiting);
        let update = QueueEntryUpdate {
            status: Some(QueueStatus::InProgress),
            triage_level: Some(TriageLevel::Urgent),
            ..Default::default()
        };

        let plan = plan_update(&waiting, &update, waiting.check_in_time + Duration::minutes(40)).unwrap();
        assert_eq!(plan.patch.actual_wait_minutes, Some(40));
        assert_eq!(plan.patch.priority_score, Some(580));
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let waiting = entry(QueueStatus::Waiting);
        let update = QueueEntryUpdate {
            status: Some(QueueStatus::Completed),
            ..Default::default()
        };
        assert!(matches!(
            plan_update(&waiting, &update, Utc::now()),
            Err(TriageError::InvalidTransition {
                from: QueueStatus::Waiting,
                to: QueueStatus::Completed
            })
        ));

        let cancelled = entry(QueueStatus::Cancelled);
        let notes_only = QueueEntryUpdate {
            notes: Some("late note".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            plan_update(&cancelled, &notes_only, Utc::now()),
            Err(TriageError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_staff_requires_in_progress() {
        let waiting = entry(QueueStatus::Waiting);
        let update = QueueEntryUpdate {
            staff_id: Some(7),
            ..Default::default()
        };
        assert!(matches!(
            plan_update(&waiting, &update, Utc::now()),
            Err(TriageError::Validation(_))
        ));
    }

    #[test]
    fn test_reassignment_and_cancellation_release_staff() {
        let mut treating = entry(QueueStatus::InProgress);
        treating.staff_id = Some(7);

        let reassign = QueueEntryUpdate {
            staff_id: Some(8),
            ..Default::default()
        };
        let plan = plan_update(&treating, &reassign, Utc::now()).unwrap();
        assert_eq!(
            plan.staff_changes,
            vec![
                StaffChange::Release {
                    staff_id: 7,
                    queue_entry_id: 3
                },
                StaffChange::Assign {
                    staff_id: 8,
                    queue_entry_id: 3
                },
            ]
        );

        let cancel = QueueEntryUpdate {
            status: Some(QueueStatus::Cancelled),
            ..Default::default()
        };
        let plan = plan_update(&treating, &cancel, Utc::now()).unwrap();
        assert_eq!(
            plan.staff_changes,
            vec![StaffChange::Release {
                staff_id: 7,
                queue_entry_id: 3
            }]
        );
    }

    #[test]
    fn test_same_status_is_noop() {
        let waiting = entry(QueueStatus::Waiting);
        let update = QueueEntryUpdate {
            status: Some(QueueStatus::Waiting),
            ..Default::default()
        };
        assert!(plan_update(&waiting, &update, Utc::now()).unwrap().is_noop());
    }

    #[test]
    fn test_complete_only_from_in_progress() {
        let mut treating = entry(QueueStatus::InProgress);
        treating.staff_id = Some(7);

        let plan = plan_complete(&treating).unwrap();
        assert_eq!(plan.patch.status, Some(QueueStatus::Completed));
        assert_eq!(plan.staff_changes.len(), 1);

        assert!(plan_complete(&entry(QueueStatus::Waiting)).is_err());
        assert!(matches!(
            plan_complete(&entry(QueueStatus::Completed)),
            Err(TriageError::InvalidTransition {
                from: QueueStatus::Completed,
                to: QueueStatus::Completed
            })
        ));
    }
}
