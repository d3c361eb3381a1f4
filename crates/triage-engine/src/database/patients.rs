//! Read-side view of patient records kept in the local `patients` table

use async_trait::async_trait;

use super::TriageDatabase;
use crate::error::Result;
use crate::store::PatientDirectory;
use crate::types::{PatientId, PatientSummary};

#[derive(sqlx::FromRow, Debug)]
struct PatientRow {
    id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    phone_number: Option<String>,
    email: Option<String>,
}

impl From<PatientRow> for PatientSummary {
    fn from(row: PatientRow) -> Self {
        PatientSummary {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            phone_number: row.phone_number,
            email: row.email,
        }
    }
}

/// [`PatientDirectory`] over the `patients` table
#[derive(Clone)]
pub struct SqlitePatientDirectory {
    db: TriageDatabase,
}

impl SqlitePatientDirectory {
    pub fn new(db: TriageDatabase) -> Self {
        Self { db }
    }

    /// Insert or replace a patient record (registry imports and fixtures).
    /// An `id` of 0 lets SQLite assign one. Returns the stored id.
    pub async fn upsert_patient(&self, patient: &PatientSummary) -> Result<PatientId> {
        let id = (patient.id != 0).then_some(patient.id);
        let result = sqlx::query(
            "INSERT OR REPLACE INTO patients (id, first_name, last_name, phone_number, email)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(patient.first_name.as_deref())
        .bind(patient.last_name.as_deref())
        .bind(patient.phone_number.as_deref())
        .bind(patient.email.as_deref())
        .execute(self.db.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl PatientDirectory for SqlitePatientDirectory {
    async fn get_patient(&self, id: PatientId) -> Result<Option<PatientSummary>> {
        let row = sqlx::query_as::<_, PatientRow>(
            "SELECT id, first_name, last_name, phone_number, email FROM patients WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(PatientSummary::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let directory = SqlitePatientDirectory::new(TriageDatabase::new_in_memory().await.unwrap());

        let id = directory
            .upsert_patient(&PatientSummary {
                first_name: Some("Maria".to_string()),
                last_name: Some("Gomez".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(id > 0);

        let patient = directory.get_patient(id).await.unwrap().unwrap();
        assert_eq!(patient.first_name.as_deref(), Some("Maria"));
        assert_eq!(patient.email, None);

        let fixed = directory
            .upsert_patient(&PatientSummary {
                id: 500,
                first_name: Some("Lee".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(fixed, 500);

        assert!(directory.get_patient(12345).await.unwrap().is_none());
    }
}
