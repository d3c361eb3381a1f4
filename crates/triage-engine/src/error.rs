use thiserror::Error;

use crate::types::QueueStatus;

/// Triage engine errors
#[derive(Error, Debug)]
pub enum TriageError {
    /// Missing or malformed caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown queue entry, staff member or patient, or no active entry
    #[error("Not found: {0}")]
    NotFound(String),

    /// Status change the queue state machine does not permit
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: QueueStatus,
        to: QueueStatus,
    },

    /// Concurrent writers kept invalidating the loaded entry version
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Underlying persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TriageError {
    /// Create a new Validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new NotFound error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Conflict error
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a new Config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new Internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller can fix this by changing the request
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound(_) | Self::InvalidTransition { .. } | Self::Conflict(_)
        )
    }
}

impl From<config::ConfigError> for TriageError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for triage engine operations
pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TriageError::validation("patient_id is required");
        assert_eq!(err.to_string(), "Validation error: patient_id is required");

        let err = TriageError::InvalidTransition {
            from: QueueStatus::Completed,
            to: QueueStatus::InProgress,
        };
        assert_eq!(err.to_string(), "Invalid transition from completed to in_progress");
    }

    #[test]
    fn test_user_actionable() {
        assert!(TriageError::not_found("queue entry 3").is_user_actionable());
        assert!(TriageError::conflict("queue entry 3").is_user_actionable());
        assert!(!TriageError::internal("boom").is_user_actionable());
        assert!(!TriageError::Storage(sqlx::Error::PoolClosed).is_user_actionable());
    }
}
