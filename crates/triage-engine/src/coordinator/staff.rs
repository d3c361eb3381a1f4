//! Staff roster operations

use tracing::info;

use super::core::QueueCoordinator;
use crate::error::{Result, TriageError};
use crate::notifier::QueueEventKind;
use crate::store::seed_default_staff;
use crate::types::{CreateStaffRequest, StaffId, StaffListing, StaffMember};

impl QueueCoordinator {
    /// Add a staff member; name and role are required
    pub async fn create_staff(&self, request: CreateStaffRequest) -> Result<StaffMember> {
        let name = request.name.as_deref().map(str::trim).unwrap_or_default();
        let role = request.role.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() || role.is_empty() {
            return Err(TriageError::validation("name and role are required"));
        }

        let staff = self
            .staff
            .create_staff(name, role, request.is_available.unwrap_or(true), self.now())
            .await?;

        self.notify(QueueEventKind::StaffUpdated, &staff);
        Ok(staff)
    }

    /// All staff by name, with the patient each one is currently treating
    pub async fn list_staff(&self) -> Result<Vec<StaffListing>> {
        let members = self.staff.list_staff().await?;
        let mut listings = Vec::with_capacity(members.len());

        for staff in members {
            let patient = match staff.assigned_queue_entry_id {
                Some(entry_id) => match self.queue.get_entry(entry_id).await? {
                    Some(entry) => self.patients.get_patient(entry.patient_id).await?,
                    None => None,
                },
                None => None,
            };

            listings.push(StaffListing {
                current_patient_first_name: patient.as_ref().and_then(|p| p.first_name.clone()),
                current_patient_last_name: patient.as_ref().and_then(|p| p.last_name.clone()),
                staff,
            });
        }

        Ok(listings)
    }

    pub async fn list_available_staff(&self) -> Result<Vec<StaffMember>> {
        self.staff.list_available_staff().await
    }

    /// Direct availability toggle, outside the assignment path. Making a staff
    /// member available drops their queue entry link.
    pub async fn set_staff_availability(&self, id: StaffId, is_available: bool) -> Result<StaffMember> {
        let staff = self
            .staff
            .set_availability(id, is_available, self.now())
            .await?
            .ok_or_else(|| TriageError::not_found(format!("staff member {}", id)))?;

        info!("👩‍⚕️ Staff member {} marked {}", id, if is_available { "available" } else { "unavailable" });
        self.notify(QueueEventKind::StaffUpdated, &staff);
        Ok(staff)
    }

    /// Insert the default roster into an empty staff table
    pub async fn seed_default_staff(&self) -> Result<usize> {
        seed_default_staff(self.staff.as_ref(), self.now()).await
    }
}
