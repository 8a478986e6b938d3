//! Patients' blood requests

use rusqlite::{params, Row};
use uuid::Uuid;

use super::database::{now, parse_col, required, ts, Database};
use super::error::{StorageError, StorageResult};
use crate::domain::{BloodGroup, BloodRequest, RequestStatus};
use crate::geo::Coordinates;

const REQUEST_COLUMNS: &str = "id, patient_id, blood_group, units_required, urgency, reason, \
     location_lat, location_long, status, created_at";

#[derive(Debug, Clone)]
pub struct NewBloodRequest {
    pub patient_id: Uuid,
    pub blood_group: BloodGroup,
    pub units_required: u32,
    pub urgency: String,
    pub reason: Option<String>,
    pub location: Coordinates,
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<BloodRequest> {
    Ok(BloodRequest {
        id: parse_col(row, 0)?,
        patient_id: parse_col(row, 1)?,
        blood_group: parse_col(row, 2)?,
        units_required: row.get(3)?,
        urgency: row.get(4)?,
        reason: row.get(5)?,
        location_lat: row.get(6)?,
        location_long: row.get(7)?,
        status: parse_col(row, 8)?,
        created_at: parse_col(row, 9)?,
    })
}

impl Database {
    pub fn create_blood_request(&self, new: &NewBloodRequest) -> StorageResult<BloodRequest> {
        let request = BloodRequest {
            id: Uuid::new_v4(),
            patient_id: new.patient_id,
            blood_group: new.blood_group,
            units_required: new.units_required,
            urgency: new.urgency.clone(),
            reason: new.reason.clone(),
            location_lat: new.location.lat,
            location_long: new.location.lng,
            status: RequestStatus::Pending,
            created_at: now(),
        };

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO blood_requests ({REQUEST_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                request.id.to_string(),
                request.patient_id.to_string(),
                request.blood_group.as_str(),
                request.units_required,
                request.urgency,
                request.reason,
                request.location_lat,
                request.location_long,
                request.status.as_str(),
                ts(&request.created_at),
            ],
        )?;

        tracing::debug!(
            request_id = %request.id,
            patient_id = %request.patient_id,
            blood_group = %request.blood_group,
            "Blood request created"
        );
        Ok(request)
    }

    pub fn get_blood_request(&self, id: Uuid) -> StorageResult<BloodRequest> {
        let conn = self.conn()?;
        required(
            conn.query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM blood_requests WHERE id = ?1"),
                [id.to_string()],
                request_from_row,
            ),
            "Blood request",
            id,
        )
    }

    pub fn list_blood_requests(&self) -> StorageResult<Vec<BloodRequest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM blood_requests ORDER BY created_at DESC, rowid DESC"
        ))?;
        let requests = stmt
            .query_map([], request_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    /// Requests the user created or has donated to, newest first
    pub fn list_blood_requests_for_user(&self, user_id: Uuid) -> StorageResult<Vec<BloodRequest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM blood_requests \
             WHERE patient_id = ?1 \
                OR id IN (SELECT blood_request_id FROM donations WHERE donor_id = ?1) \
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let requests = stmt
            .query_map([user_id.to_string()], request_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    /// Pending requests for any of `groups`, oldest first
    pub fn list_pending_requests(&self, groups: &[BloodGroup]) -> StorageResult<Vec<BloodRequest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM blood_requests \
             WHERE status = ?1 ORDER BY created_at, rowid"
        ))?;
        let requests = stmt
            .query_map([RequestStatus::Pending.as_str()], request_from_row)?
            .filter(|row| match row {
                Ok(request) => groups.contains(&request.blood_group),
                Err(_) => true,
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    pub fn set_request_status(&self, id: Uuid, status: RequestStatus) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE blood_requests SET status = ?2 WHERE id = ?1",
            params![id.to_string(), status.as_str()],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("Blood request", id));
        }
        tracing::debug!(request_id = %id, status = %status, "Blood request status changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::{seed_request, seed_user};

    #[test]
    fn test_create_and_get_request() {
        let db = Database::open_in_memory().unwrap();
        let patient = seed_user(&db, "patient", BloodGroup::BPositive, None);
        let request = seed_request(&db, &patient, BloodGroup::BPositive, 2);

        let fetched = db.get_blood_request(request.id).unwrap();
        assert_eq!(fetched.status, RequestStatus::Pending);
        assert_eq!(fetched.units_required, 2);
        assert_eq!(fetched.patient_id, patient.id);
    }

    #[test]
    fn test_requests_visible_to_patient_and_donor() {
        let db = Database::open_in_memory().unwrap();
        let patient = seed_user(&db, "patient", BloodGroup::BPositive, None);
        let donor = seed_user(&db, "donor", BloodGroup::BPositive, None);
        let stranger = seed_user(&db, "stranger", BloodGroup::BPositive, None);
        let request = seed_request(&db, &patient, BloodGroup::BPositive, 1);
        db.create_donation(donor.id, request.id).unwrap();

        assert_eq!(db.list_blood_requests_for_user(patient.id).unwrap().len(), 1);
        assert_eq!(db.list_blood_requests_for_user(donor.id).unwrap().len(), 1);
        assert!(db.list_blood_requests_for_user(stranger.id).unwrap().is_empty());
        assert_eq!(db.list_blood_requests().unwrap().len(), 1);
    }

    #[test]
    fn test_pending_requests_by_group() {
        let db = Database::open_in_memory().unwrap();
        let patient = seed_user(&db, "patient", BloodGroup::BPositive, None);
        let a = seed_request(&db, &patient, BloodGroup::APositive, 1);
        let b = seed_request(&db, &patient, BloodGroup::BPositive, 1);
        db.set_request_status(b.id, RequestStatus::Donating).unwrap();

        let pending = db
            .list_pending_requests(&[BloodGroup::APositive, BloodGroup::BPositive])
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);
        assert!(db.list_pending_requests(&[BloodGroup::ONegative]).unwrap().is_empty());
    }

    #[test]
    fn test_status_of_missing_request() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .set_request_status(Uuid::new_v4(), RequestStatus::Cancelled)
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }
}
