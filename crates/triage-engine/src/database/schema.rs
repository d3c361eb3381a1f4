//! Database schema definitions for the triage engine
//!
//! Timestamps are stored as INTEGER milliseconds since the Unix epoch so that
//! ordering by check-in time is numeric. `patients` mirrors the display fields
//! of the external patient registry; nothing here writes to it except imports
//! and tests.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;

/// Create the patients table
pub async fn create_patients_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating patients table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT,
            last_name TEXT,
            phone_number TEXT,
            email TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    debug!("✅ Patients table created");
    Ok(())
}

/// Create the staff table
pub async fn create_staff_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating staff table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staff (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            is_available INTEGER NOT NULL DEFAULT 1,
            assigned_queue_entry_id INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    debug!("✅ Staff table created");
    Ok(())
}

/// Create the queue entries table
pub async fn create_queue_entries_table(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating queue_entries table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id INTEGER NOT NULL,
            staff_id INTEGER REFERENCES staff(id) ON DELETE SET NULL,
            triage_level TEXT NOT NULL
                CHECK (triage_level IN ('immediate', 'urgent', 'semi_urgent', 'non_urgent')),
            status TEXT NOT NULL DEFAULT 'waiting'
                CHECK (status IN ('waiting', 'in_progress', 'completed', 'cancelled')),
            check_in_time INTEGER NOT NULL,
            estimated_wait_minutes INTEGER NOT NULL,
            actual_wait_minutes INTEGER,
            priority_score INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    debug!("✅ Queue entries table created");
    Ok(())
}

/// Create indexes backing the listing order and lookups
pub async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating database indexes");

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_queue_entries_status ON queue_entries(status)",
        "CREATE INDEX IF NOT EXISTS idx_queue_entries_order
            ON queue_entries(priority_score DESC, check_in_time ASC)",
        "CREATE INDEX IF NOT EXISTS idx_queue_entries_patient ON queue_entries(patient_id, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_staff_available ON staff(is_available)",
    ];

    for statement in indexes {
        sqlx::query(statement).execute(pool).await?;
    }

    debug!("✅ Database indexes created");
    Ok(())
}
