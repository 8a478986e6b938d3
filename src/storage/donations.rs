//! Donations and hospital assignments

use rusqlite::{params, params_from_iter, Row};
use uuid::Uuid;

use super::database::{now, optional, parse_col, parse_opt_col, required, ts, Database};
use super::error::{StorageError, StorageResult};
use crate::domain::{Assignment, AssignmentStatus, Donation, DonationStatus};

const DONATION_COLUMNS: &str = "id, donor_id, blood_request_id, hospital_id, status, \
     ai_recommended_hospital, donation_date, created_at";

const ASSIGNMENT_COLUMNS: &str =
    "id, donor_id, hospital_id, donation_id, status, ai_recommended, assigned_at, completed_at";

fn donation_from_row(row: &Row<'_>) -> rusqlite::Result<Donation> {
    Ok(Donation {
        id: parse_col(row, 0)?,
        donor_id: parse_col(row, 1)?,
        blood_request_id: parse_col(row, 2)?,
        hospital_id: parse_opt_col(row, 3)?,
        status: parse_col(row, 4)?,
        ai_recommended_hospital: row.get(5)?,
        donation_date: parse_opt_col(row, 6)?,
        created_at: parse_col(row, 7)?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: parse_col(row, 0)?,
        donor_id: parse_col(row, 1)?,
        hospital_id: parse_col(row, 2)?,
        donation_id: parse_col(row, 3)?,
        status: parse_col(row, 4)?,
        ai_recommended: row.get(5)?,
        assigned_at: parse_col(row, 6)?,
        completed_at: parse_opt_col(row, 7)?,
    })
}

impl Database {
    /// Record a donor's offer for a request; starts out `pending`
    pub fn create_donation(
        &self,
        donor_id: Uuid,
        blood_request_id: Uuid,
    ) -> StorageResult<Donation> {
        let donation = Donation {
            id: Uuid::new_v4(),
            donor_id,
            blood_request_id,
            hospital_id: None,
            status: DonationStatus::Pending,
            ai_recommended_hospital: false,
            donation_date: None,
            created_at: now(),
        };

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO donations ({DONATION_COLUMNS}) \
                 VALUES (?1, ?2, ?3, NULL, ?4, 0, NULL, ?5)"
            ),
            params![
                donation.id.to_string(),
                donation.donor_id.to_string(),
                donation.blood_request_id.to_string(),
                donation.status.as_str(),
                ts(&donation.created_at),
            ],
        )?;

        tracing::debug!(
            donation_id = %donation.id,
            donor_id = %donor_id,
            request_id = %blood_request_id,
            "Donation created"
        );
        Ok(donation)
    }

    pub fn get_donation(&self, id: Uuid) -> StorageResult<Donation> {
        let conn = self.conn()?;
        required(
            conn.query_row(
                &format!("SELECT {DONATION_COLUMNS} FROM donations WHERE id = ?1"),
                [id.to_string()],
                donation_from_row,
            ),
            "Donation",
            id,
        )
    }

    pub fn list_donations(&self) -> StorageResult<Vec<Donation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations ORDER BY created_at DESC, rowid DESC"
        ))?;
        let donations = stmt
            .query_map([], donation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(donations)
    }

    pub fn list_donations_for_donor(&self, donor_id: Uuid) -> StorageResult<Vec<Donation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations WHERE donor_id = ?1 \
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let donations = stmt
            .query_map([donor_id.to_string()], donation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(donations)
    }

    /// Move a donation to `to` only while its status is one of `from`
    ///
    /// The check and the write are a single UPDATE, so of two callers
    /// racing on the same donation only one gets `Some`. `None` means the
    /// donation exists but was in another state.
    pub fn transition_donation(
        &self,
        id: Uuid,
        from: &[DonationStatus],
        to: DonationStatus,
    ) -> StorageResult<Option<Donation>> {
        let changed = {
            let conn = self.conn()?;
            let allowed = (0..from.len())
                .map(|i| format!("?{}", i + 5))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE donations SET status = ?2, donation_date = CASE WHEN ?2 = ?3 \
                 THEN COALESCE(donation_date, ?4) ELSE donation_date END \
                 WHERE id = ?1 AND status IN ({allowed})"
            );
            let mut values = vec![
                id.to_string(),
                to.as_str().to_string(),
                DonationStatus::Completed.as_str().to_string(),
                ts(&now()),
            ];
            values.extend(from.iter().map(|s| s.as_str().to_string()));
            conn.execute(&sql, params_from_iter(values))?
        };

        let donation = self.get_donation(id)?;
        if changed == 0 {
            return Ok(None);
        }
        tracing::debug!(donation_id = %id, status = %to, "Donation status changed");
        Ok(Some(donation))
    }

    /// Donations on a request that are still pending or scheduled
    pub fn count_open_donations(&self, blood_request_id: Uuid) -> StorageResult<u32> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM donations WHERE blood_request_id = ?1 AND status IN (?2, ?3)",
            params![
                blood_request_id.to_string(),
                DonationStatus::Pending.as_str(),
                DonationStatus::Scheduled.as_str()
            ],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn set_donation_hospital(
        &self,
        id: Uuid,
        hospital_id: Uuid,
        ai_recommended: bool,
    ) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE donations SET hospital_id = ?2, ai_recommended_hospital = ?3 WHERE id = ?1",
            params![id.to_string(), hospital_id.to_string(), ai_recommended],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("Donation", id));
        }
        Ok(())
    }

    pub fn count_completed_donations(&self, blood_request_id: Uuid) -> StorageResult<u32> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM donations WHERE blood_request_id = ?1 AND status = ?2",
            params![
                blood_request_id.to_string(),
                DonationStatus::Completed.as_str()
            ],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Donations with a hospital but no assignment row
    pub fn list_unassigned_donations(&self) -> StorageResult<Vec<Donation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations d \
             WHERE d.hospital_id IS NOT NULL \
               AND NOT EXISTS (SELECT 1 FROM assignments a WHERE a.donation_id = d.id) \
             ORDER BY d.created_at, d.rowid"
        ))?;
        let donations = stmt
            .query_map([], donation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(donations)
    }

    pub fn create_assignment(
        &self,
        donation: &Donation,
        hospital_id: Uuid,
        ai_recommended: bool,
    ) -> StorageResult<Assignment> {
        let assignment = Assignment {
            id: Uuid::new_v4(),
            donor_id: donation.donor_id,
            hospital_id,
            donation_id: donation.id,
            status: AssignmentStatus::Scheduled,
            ai_recommended,
            assigned_at: now(),
            completed_at: None,
        };

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO assignments ({ASSIGNMENT_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)"
            ),
            params![
                assignment.id.to_string(),
                assignment.donor_id.to_string(),
                assignment.hospital_id.to_string(),
                assignment.donation_id.to_string(),
                assignment.status.as_str(),
                assignment.ai_recommended,
                ts(&assignment.assigned_at),
            ],
        )?;

        tracing::info!(
            assignment_id = %assignment.id,
            donation_id = %donation.id,
            hospital_id = %hospital_id,
            "Donor assigned to hospital"
        );
        Ok(assignment)
    }

    pub fn get_assignment(&self, id: Uuid) -> StorageResult<Assignment> {
        let conn = self.conn()?;
        required(
            conn.query_row(
                &format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = ?1"),
                [id.to_string()],
                assignment_from_row,
            ),
            "Assignment",
            id,
        )
    }

    /// Fetch an assignment only if it belongs to `hospital_id`
    pub fn get_assignment_for_hospital(
        &self,
        id: Uuid,
        hospital_id: Uuid,
    ) -> StorageResult<Assignment> {
        let conn = self.conn()?;
        required(
            conn.query_row(
                &format!(
                    "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
                     WHERE id = ?1 AND hospital_id = ?2"
                ),
                params![id.to_string(), hospital_id.to_string()],
                assignment_from_row,
            ),
            "Assignment",
            id,
        )
    }

    pub fn find_assignment_for_donation(
        &self,
        donation_id: Uuid,
    ) -> StorageResult<Option<Assignment>> {
        let conn = self.conn()?;
        optional(conn.query_row(
            &format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE donation_id = ?1 \
                 ORDER BY assigned_at DESC LIMIT 1"
            ),
            [donation_id.to_string()],
            assignment_from_row,
        ))
    }

    pub fn list_assignments_for_hospital(
        &self,
        hospital_id: Uuid,
    ) -> StorageResult<Vec<Assignment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE hospital_id = ?1 \
             ORDER BY assigned_at DESC, rowid DESC"
        ))?;
        let assignments = stmt
            .query_map([hospital_id.to_string()], assignment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assignments)
    }

    pub fn list_assignments_for_donor(&self, donor_id: Uuid) -> StorageResult<Vec<Assignment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE donor_id = ?1 \
             ORDER BY assigned_at DESC, rowid DESC"
        ))?;
        let assignments = stmt
            .query_map([donor_id.to_string()], assignment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assignments)
    }

    /// Mark an assignment completed; idempotent
    pub fn complete_assignment(&self, id: Uuid) -> StorageResult<Assignment> {
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE assignments SET status = ?2, completed_at = COALESCE(completed_at, ?3) \
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    AssignmentStatus::Completed.as_str(),
                    ts(&now())
                ],
            )?;
            if changed == 0 {
                return Err(StorageError::not_found("Assignment", id));
            }
        }
        self.get_assignment(id)
    }

    /// Cancel a scheduled assignment; completed ones are left alone
    pub fn cancel_assignment(&self, id: Uuid) -> StorageResult<Assignment> {
        {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE assignments SET status = ?2 WHERE id = ?1 AND status = ?3",
                params![
                    id.to_string(),
                    AssignmentStatus::Cancelled.as_str(),
                    AssignmentStatus::Scheduled.as_str()
                ],
            )?;
        }
        self.get_assignment(id)
    }
}
