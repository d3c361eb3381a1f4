//! Core types for the triage engine
//!
//! Queue entries move through a small forward-only state machine:
//!
//! ```text
//! waiting ──► in_progress ──► completed
//!    │             │
//!    └──► cancelled ◄┘
//! ```
//!
//! `completed` and `cancelled` are terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TriageError;

/// Queue entry identifier
pub type QueueEntryId = i64;

/// Patient identifier (patient records are owned externally)
pub type PatientId = i64;

/// Staff member identifier
pub type StaffId = i64;

/// Urgency classification of a patient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageLevel {
    Immediate,
    Urgent,
    SemiUrgent,
    NonUrgent,
}

impl TriageLevel {
    pub const ALL: [TriageLevel; 4] = [
        TriageLevel::Immediate,
        TriageLevel::Urgent,
        TriageLevel::SemiUrgent,
        TriageLevel::NonUrgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriageLevel::Immediate => "immediate",
            TriageLevel::Urgent => "urgent",
            TriageLevel::SemiUrgent => "semi_urgent",
            TriageLevel::NonUrgent => "non_urgent",
        }
    }
}

impl fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriageLevel {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(TriageLevel::Immediate),
            "urgent" => Ok(TriageLevel::Urgent),
            "semi_urgent" => Ok(TriageLevel::SemiUrgent),
            "non_urgent" => Ok(TriageLevel::NonUrgent),
            other => Err(TriageError::validation(format!("unknown triage level: {}", other))),
        }
    }
}

/// Lifecycle state of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    InProgress,
    Completed,
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::InProgress => "in_progress",
            QueueStatus::Completed => "completed",
            QueueStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Cancelled)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    /// Staying in the same state is not a transition and returns false.
    pub fn can_transition_to(&self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (QueueStatus::Waiting, QueueStatus::InProgress)
                | (QueueStatus::Waiting, QueueStatus::Cancelled)
                | (QueueStatus::InProgress, QueueStatus::Completed)
                | (QueueStatus::InProgress, QueueStatus::Cancelled)
        )
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(QueueStatus::Waiting),
            "in_progress" => Ok(QueueStatus::InProgress),
            "completed" => Ok(QueueStatus::Completed),
            "cancelled" => Ok(QueueStatus::Cancelled),
            other => Err(TriageError::validation(format!("unknown queue status: {}", other))),
        }
    }
}

/// One patient's visit through the waiting/treatment lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: QueueEntryId,
    pub patient_id: PatientId,
    pub staff_id: Option<StaffId>,
    pub triage_level: TriageLevel,
    pub status: QueueStatus,
    pub check_in_time: DateTime<Utc>,
    pub estimated_wait_minutes: i64,
    /// Fixed once, at the waiting -> in_progress transition
    pub actual_wait_minutes: Option<i64>,
    pub priority_score: i64,
    pub notes: Option<String>,
    /// Bumped on every committed write; used for optimistic concurrency
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for a freshly checked-in entry
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub patient_id: PatientId,
    pub triage_level: TriageLevel,
    pub notes: Option<String>,
    pub estimated_wait_minutes: i64,
    pub priority_score: i64,
    pub check_in_time: DateTime<Utc>,
}

/// Check-in request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub patient_id: Option<PatientId>,
    pub triage_level: Option<TriageLevel>,
    pub notes: Option<String>,
}

impl CheckInRequest {
    pub fn new(patient_id: PatientId, triage_level: TriageLevel) -> Self {
        Self {
            patient_id: Some(patient_id),
            triage_level: Some(triage_level),
            notes: None,
        }
    }
}

/// Partial update of a queue entry; absent fields keep their stored value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueEntryUpdate {
    pub status: Option<QueueStatus>,
    pub staff_id: Option<StaffId>,
    pub triage_level: Option<TriageLevel>,
    pub notes: Option<String>,
    pub estimated_wait_minutes: Option<i64>,
}

/// Column-level patch written by a store; `None` leaves the column unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueEntryPatch {
    pub status: Option<QueueStatus>,
    pub staff_id: Option<StaffId>,
    pub triage_level: Option<TriageLevel>,
    pub notes: Option<String>,
    pub estimated_wait_minutes: Option<i64>,
    pub actual_wait_minutes: Option<i64>,
    pub priority_score: Option<i64>,
}

impl QueueEntryPatch {
    /// Apply the patch to an in-memory entry (COALESCE semantics)
    pub fn apply_to(&self, entry: &mut QueueEntry) {
        if let Some(status) = self.status {
            entry.status = status;
        }
        if let Some(staff_id) = self.staff_id {
            entry.staff_id = Some(staff_id);
        }
        if let Some(level) = self.triage_level {
            entry.triage_level = level;
        }
        if let Some(notes) = &self.notes {
            entry.notes = Some(notes.clone());
        }
        if let Some(minutes) = self.estimated_wait_minutes {
            entry.estimated_wait_minutes = minutes;
        }
        if entry.actual_wait_minutes.is_none() {
            entry.actual_wait_minutes = self.actual_wait_minutes;
        }
        if let Some(score) = self.priority_score {
            entry.priority_score = score;
        }
    }
}

/// Staff-side effect committed together with a queue entry write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffChange {
    /// Mark the staff member busy with the given queue entry
    Assign {
        staff_id: StaffId,
        queue_entry_id: QueueEntryId,
    },
    /// Free the staff member if still linked to the given entry (or to none)
    Release {
        staff_id: StaffId,
        queue_entry_id: QueueEntryId,
    },
}

/// A single atomic write: entry patch plus staff side effects
#[derive(Debug, Clone)]
pub struct QueueCommit {
    pub entry_id: QueueEntryId,
    pub expected_version: i64,
    pub patch: QueueEntryPatch,
    pub staff_changes: Vec<StaffChange>,
    pub updated_at: DateTime<Utc>,
}

/// A clinician who treats patients from the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub name: String,
    pub role: String,
    /// False while treating a patient
    pub is_available: bool,
    /// Queue entry currently being treated (not the patient id)
    pub assigned_queue_entry_id: Option<QueueEntryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Staff member with the display name of the patient they are treating
#[derive(Debug, Clone, Serialize)]
pub struct StaffListing {
    #[serde(flatten)]
    pub staff: StaffMember,
    pub current_patient_first_name: Option<String>,
    pub current_patient_last_name: Option<String>,
}

/// Request to create a staff member
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateStaffRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub is_available: Option<bool>,
}

/// Patient display fields provided by the patient directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: PatientId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

/// Queue entry enriched with patient and staff display fields, for presentation only
#[derive(Debug, Clone, Serialize)]
pub struct JoinedQueueEntry {
    #[serde(flatten)]
    pub entry: QueueEntry,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub staff_name: Option<String>,
    pub staff_role: Option<String>,
}

impl JoinedQueueEntry {
    pub fn new(entry: QueueEntry, patient: Option<&PatientSummary>, staff: Option<&StaffMember>) -> Self {
        Self {
            entry,
            first_name: patient.and_then(|p| p.first_name.clone()),
            last_name: patient.and_then(|p| p.last_name.clone()),
            phone_number: patient.and_then(|p| p.phone_number.clone()),
            email: patient.and_then(|p| p.email.clone()),
            staff_name: staff.map(|s| s.name.clone()),
            staff_role: staff.map(|s| s.role.clone()),
        }
    }
}

/// Aggregates over the active queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting_count: i64,
    pub in_progress_count: i64,
    pub completed_count: i64,
    /// Mean estimated wait of waiting entries; `None` when nobody waits
    pub avg_wait_time: Option<f64>,
    pub immediate_count: i64,
    pub urgent_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use QueueStatus::*;

        assert!(Waiting.can_transition_to(InProgress));
        assert!(Waiting.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Cancelled));

        assert!(!Waiting.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Waiting));
        assert!(!Waiting.can_transition_to(Waiting));

        for next in [Waiting, InProgress, Completed, Cancelled] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&TriageLevel::SemiUrgent).unwrap(), "\"semi_urgent\"");
        assert_eq!(serde_json::to_string(&QueueStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!("non_urgent".parse::<TriageLevel>().unwrap(), TriageLevel::NonUrgent);
        assert!("critical".parse::<TriageLevel>().is_err());
        assert!(matches!("done".parse::<QueueStatus>(), Err(TriageError::Validation(_))));
    }

    #[test]
    fn test_patch_keeps_actual_wait_once_set() {
        let now = Utc::now();
        let mut entry = QueueEntry {
            id: 1,
            patient_id: 10,
            staff_id: None,
            triage_level: TriageLevel::Urgent,
            status: QueueStatus::InProgress,
            check_in_time: now,
            estimated_wait_minutes: 5,
            actual_wait_minutes: Some(12),
            priority_score: 500,
            notes: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let patch = QueueEntryPatch {
            notes: Some("stable".to_string()),
            actual_wait_minutes: Some(40),
            ..Default::default()
        };
        patch.apply_to(&mut entry);

        assert_eq!(entry.actual_wait_minutes, Some(12));
        assert_eq!(entry.notes.as_deref(), Some("stable"));
        assert_eq!(entry.priority_score, 500);
    }
}
