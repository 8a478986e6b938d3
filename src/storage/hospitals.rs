//! Hospitals and hospital staff accounts

use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::database::{now, optional, parse_col, parse_opt_col, required, ts, Database};
use super::error::{StorageError, StorageResult};
use crate::domain::{Hospital, HospitalUser};
use crate::geo::Coordinates;

const HOSPITAL_COLUMNS: &str =
    "id, name, address, phone_number, email, location_lat, location_long, created_at";

const HOSPITAL_USER_COLUMNS: &str =
    "id, hospital_id, username, email, password_hash, is_active, created_at, last_login";

#[derive(Debug, Clone)]
pub struct NewHospital {
    pub name: String,
    pub address: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub location: Coordinates,
}

/// Login created together with its hospital
#[derive(Debug, Clone)]
pub struct NewHospitalAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

fn hospital_from_row(row: &Row<'_>) -> rusqlite::Result<Hospital> {
    Ok(Hospital {
        id: parse_col(row, 0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        phone_number: row.get(3)?,
        email: row.get(4)?,
        location_lat: row.get(5)?,
        location_long: row.get(6)?,
        created_at: parse_col(row, 7)?,
    })
}

fn hospital_user_from_row(row: &Row<'_>) -> rusqlite::Result<HospitalUser> {
    Ok(HospitalUser {
        id: parse_col(row, 0)?,
        hospital_id: parse_col(row, 1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        is_active: row.get(5)?,
        created_at: parse_col(row, 6)?,
        last_login: parse_opt_col(row, 7)?,
    })
}

fn insert_hospital(conn: &Connection, new: &NewHospital) -> StorageResult<Hospital> {
    let hospital = Hospital {
        id: Uuid::new_v4(),
        name: new.name.clone(),
        address: new.address.clone(),
        phone_number: new.phone_number.clone(),
        email: new.email.clone(),
        location_lat: new.location.lat,
        location_long: new.location.lng,
        created_at: now(),
    };
    conn.execute(
        &format!(
            "INSERT INTO hospitals ({HOSPITAL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ),
        params![
            hospital.id.to_string(),
            hospital.name,
            hospital.address,
            hospital.phone_number,
            hospital.email,
            hospital.location_lat,
            hospital.location_long,
            ts(&hospital.created_at),
        ],
    )?;
    Ok(hospital)
}

impl Database {
    pub fn create_hospital(&self, new: &NewHospital) -> StorageResult<Hospital> {
        let conn = self.conn()?;
        let hospital = insert_hospital(&conn, new)?;
        tracing::debug!(hospital_id = %hospital.id, name = %hospital.name, "Hospital created");
        Ok(hospital)
    }

    /// Create a hospital and its first staff login atomically
    pub fn create_hospital_with_account(
        &self,
        new: &NewHospital,
        account: &NewHospitalAccount,
    ) -> StorageResult<(Hospital, HospitalUser)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let hospital = insert_hospital(&tx, new)?;
        let staff = HospitalUser {
            id: Uuid::new_v4(),
            hospital_id: hospital.id,
            username: account.username.clone(),
            email: account.email.clone(),
            password_hash: account.password_hash.clone(),
            is_active: true,
            created_at: now(),
            last_login: None,
        };
        tx.execute(
            &format!(
                "INSERT INTO hospital_users ({HOSPITAL_USER_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)"
            ),
            params![
                staff.id.to_string(),
                staff.hospital_id.to_string(),
                staff.username,
                staff.email,
                staff.password_hash,
                staff.is_active,
                ts(&staff.created_at),
            ],
        )?;
        tx.commit()?;

        tracing::info!(
            hospital_id = %hospital.id,
            hospital_user_id = %staff.id,
            "Hospital registered"
        );
        Ok((hospital, staff))
    }

    pub fn get_hospital(&self, id: Uuid) -> StorageResult<Hospital> {
        let conn = self.conn()?;
        required(
            conn.query_row(
                &format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE id = ?1"),
                [id.to_string()],
                hospital_from_row,
            ),
            "Hospital",
            id,
        )
    }

    pub fn list_hospitals(&self) -> StorageResult<Vec<Hospital>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {HOSPITAL_COLUMNS} FROM hospitals ORDER BY created_at, rowid"
        ))?;
        let hospitals = stmt
            .query_map([], hospital_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hospitals)
    }

    pub fn update_hospital(&self, hospital: &Hospital) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE hospitals SET name = ?2, address = ?3, phone_number = ?4, email = ?5, \
             location_lat = ?6, location_long = ?7 WHERE id = ?1",
            params![
                hospital.id.to_string(),
                hospital.name,
                hospital.address,
                hospital.phone_number,
                hospital.email,
                hospital.location_lat,
                hospital.location_long,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("Hospital", hospital.id));
        }
        Ok(())
    }

    pub fn delete_hospital(&self, id: Uuid) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM hospitals WHERE id = ?1", [id.to_string()])?;
        if changed == 0 {
            return Err(StorageError::not_found("Hospital", id));
        }
        tracing::info!(hospital_id = %id, "Hospital deleted");
        Ok(())
    }

    pub fn get_hospital_user(&self, id: Uuid) -> StorageResult<HospitalUser> {
        let conn = self.conn()?;
        required(
            conn.query_row(
                &format!("SELECT {HOSPITAL_USER_COLUMNS} FROM hospital_users WHERE id = ?1"),
                [id.to_string()],
                hospital_user_from_row,
            ),
            "Hospital user",
            id,
        )
    }

    pub fn get_hospital_user_by_username(
        &self,
        username: &str,
    ) -> StorageResult<Option<HospitalUser>> {
        let conn = self.conn()?;
        optional(conn.query_row(
            &format!("SELECT {HOSPITAL_USER_COLUMNS} FROM hospital_users WHERE username = ?1"),
            [username],
            hospital_user_from_row,
        ))
    }

    pub fn get_hospital_user_by_email(&self, email: &str) -> StorageResult<Option<HospitalUser>> {
        let conn = self.conn()?;
        optional(conn.query_row(
            &format!(
                "SELECT {HOSPITAL_USER_COLUMNS} FROM hospital_users WHERE lower(email) = lower(?1)"
            ),
            [email],
            hospital_user_from_row,
        ))
    }

    pub fn set_hospital_user_password(&self, id: Uuid, password_hash: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE hospital_users SET password_hash = ?2 WHERE id = ?1",
            params![id.to_string(), password_hash],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("Hospital user", id));
        }
        Ok(())
    }

    /// Record a successful login
    pub fn touch_hospital_user_login(&self, id: Uuid) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE hospital_users SET last_login = ?2 WHERE id = ?1",
            params![id.to_string(), ts(&now())],
        )?;
        Ok(())
    }
}
