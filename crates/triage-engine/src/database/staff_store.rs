//! Staff roster operations on [`SqliteTriageStore`]
//!
//! Assignment and release happen inside [`crate::store::QueueStore::commit`];
//! this module covers the roster itself and the direct availability toggle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{from_millis, to_millis, SqliteTriageStore};
use crate::error::{Result, TriageError};
use crate::store::StaffStore;
use crate::types::{StaffId, StaffMember};

/// Raw `staff` row
#[derive(sqlx::FromRow, Debug)]
struct StaffRow {
    id: i64,
    name: String,
    role: String,
    is_available: bool,
    assigned_queue_entry_id: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<StaffRow> for StaffMember {
    type Error = TriageError;

    fn try_from(row: StaffRow) -> Result<Self> {
        Ok(StaffMember {
            id: row.id,
            name: row.name,
            role: row.role,
            is_available: row.is_available,
            assigned_queue_entry_id: row.assigned_queue_entry_id,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

const STAFF_COLUMNS: &str = "id, name, role, is_available, assigned_queue_entry_id, created_at, updated_at";

#[async_trait]
impl StaffStore for SqliteTriageStore {
    async fn create_staff(&self, name: &str, role: &str, is_available: bool, now: DateTime<Utc>) -> Result<StaffMember> {
        let now = to_millis(now);
        let result = sqlx::query(
            "INSERT INTO staff (name, role, is_available, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(role)
        .bind(is_available)
        .bind(now)
        .bind(now)
        .execute(self.database().pool())
        .await?;

        let id = result.last_insert_rowid();
        info!("👩‍⚕️ Staff member {} created: {} ({})", id, name, role);

        self.get_staff(id)
            .await?
            .ok_or_else(|| TriageError::internal(format!("staff member {} vanished after insert", id)))
    }

    async fn get_staff(&self, id: StaffId) -> Result<Option<StaffMember>> {
        let sql = format!("SELECT {} FROM staff WHERE id = ?", STAFF_COLUMNS);
        let row = sqlx::query_as::<_, StaffRow>(&sql)
            .bind(id)
            .fetch_optional(self.database().pool())
            .await?;

        row.map(StaffMember::try_from).transpose()
    }

    async fn list_staff(&self) -> Result<Vec<StaffMember>> {
        let sql = format!("SELECT {} FROM staff ORDER BY name ASC, id ASC", STAFF_COLUMNS);
        let rows = sqlx::query_as::<_, StaffRow>(&sql)
            .fetch_all(self.database().pool())
            .await?;

        rows.into_iter().map(StaffMember::try_from).collect()
    }

    async fn list_available_staff(&self) -> Result<Vec<StaffMember>> {
        let sql = format!(
            "SELECT {} FROM staff WHERE is_available = 1 ORDER BY name ASC, id ASC",
            STAFF_COLUMNS
        );
        let rows = sqlx::query_as::<_, StaffRow>(&sql)
            .fetch_all(self.database().pool())
            .await?;

        debug!("Found {} available staff", rows.len());
        rows.into_iter().map(StaffMember::try_from).collect()
    }

    async fn set_availability(&self, id: StaffId, is_available: bool, now: DateTime<Utc>) -> Result<Option<StaffMember>> {
        let now = to_millis(now);
        let result = if is_available {
            sqlx::query(
                "UPDATE staff SET is_available = 1, assigned_queue_entry_id = NULL, updated_at = ? WHERE id = ?",
            )
            .bind(now)
            .bind(id)
            .execute(self.database().pool())
            .await?
        } else {
            sqlx::query("UPDATE staff SET is_available = 0, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(id)
                .execute(self.database().pool())
                .await?
        };

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        debug!("Staff member {} availability set to {}", id, is_available);
        self.get_staff(id).await
    }

    async fn count_staff(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM staff")
            .fetch_one(self.database().pool())
            .await?;
        Ok(count)
    }
}
