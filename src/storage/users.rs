//! Donor/patient accounts

use rusqlite::{params, Row};
use uuid::Uuid;

use super::database::{now, optional, parse_col, required, ts, Database};
use super::error::{StorageError, StorageResult};
use crate::domain::{BloodGroup, Gender, User};
use crate::geo::Coordinates;

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
     blood_group, allergies, age, gender, address, phone_number, is_donor, is_recipient, \
     is_staff, is_active, location_lat, location_long, created_at";

/// Fields required to register an account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub blood_group: BloodGroup,
    pub allergies: Option<String>,
    pub age: u32,
    pub gender: Gender,
    pub address: String,
    pub phone_number: String,
    pub is_donor: bool,
    pub is_recipient: bool,
    pub is_staff: bool,
    pub location: Option<Coordinates>,
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_col(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        blood_group: parse_col(row, 6)?,
        allergies: row.get(7)?,
        age: row.get(8)?,
        gender: parse_col(row, 9)?,
        address: row.get(10)?,
        phone_number: row.get(11)?,
        is_donor: row.get(12)?,
        is_recipient: row.get(13)?,
        is_staff: row.get(14)?,
        is_active: row.get(15)?,
        location_lat: row.get(16)?,
        location_long: row.get(17)?,
        created_at: parse_col(row, 18)?,
    })
}

impl Database {
    pub fn create_user(&self, new: &NewUser) -> StorageResult<User> {
        let user = User {
            id: Uuid::new_v4(),
            username: new.username.clone(),
            email: new.email.clone(),
            password_hash: new.password_hash.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            blood_group: new.blood_group,
            allergies: new.allergies.clone(),
            age: new.age,
            gender: new.gender,
            address: new.address.clone(),
            phone_number: new.phone_number.clone(),
            is_donor: new.is_donor,
            is_recipient: new.is_recipient,
            is_staff: new.is_staff,
            is_active: true,
            location_lat: new.location.map(|c| c.lat),
            location_long: new.location.map(|c| c.lng),
            created_at: now(),
        };

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO users ({USER_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, \
                         ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
            ),
            params![
                user.id.to_string(),
                user.username,
                user.email,
                user.password_hash,
                user.first_name,
                user.last_name,
                user.blood_group.as_str(),
                user.allergies,
                user.age,
                user.gender.as_str(),
                user.address,
                user.phone_number,
                user.is_donor,
                user.is_recipient,
                user.is_staff,
                user.is_active,
                user.location_lat,
                user.location_long,
                ts(&user.created_at),
            ],
        )?;

        tracing::debug!(user_id = %user.id, username = %user.username, "User created");
        Ok(user)
    }

    pub fn get_user(&self, id: Uuid) -> StorageResult<User> {
        let conn = self.conn()?;
        required(
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id.to_string()],
                user_from_row,
            ),
            "User",
            id,
        )
    }

    pub fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let conn = self.conn()?;
        optional(conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            [username],
            user_from_row,
        ))
    }

    /// Emails compare case-insensitively
    pub fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let conn = self.conn()?;
        optional(conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower(?1)"),
            [email],
            user_from_row,
        ))
    }

    pub fn list_users(&self) -> StorageResult<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at, rowid"))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Persist the editable profile fields of `user`
    pub fn update_user(&self, user: &User) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET email = ?2, first_name = ?3, last_name = ?4, blood_group = ?5, \
             allergies = ?6, age = ?7, gender = ?8, address = ?9, phone_number = ?10, \
             is_donor = ?11, is_recipient = ?12, is_active = ?13, location_lat = ?14, \
             location_long = ?15 WHERE id = ?1",
            params![
                user.id.to_string(),
                user.email,
                user.first_name,
                user.last_name,
                user.blood_group.as_str(),
                user.allergies,
                user.age,
                user.gender.as_str(),
                user.address,
                user.phone_number,
                user.is_donor,
                user.is_recipient,
                user.is_active,
                user.location_lat,
                user.location_long,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("User", user.id));
        }
        Ok(())
    }

    pub fn set_user_password(&self, id: Uuid, password_hash: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?2 WHERE id = ?1",
            params![id.to_string(), password_hash],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("User", id));
        }
        Ok(())
    }

    pub fn set_user_location(&self, id: Uuid, location: Coordinates) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET location_lat = ?2, location_long = ?3 WHERE id = ?1",
            params![id.to_string(), location.lat, location.lng],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("User", id));
        }
        Ok(())
    }

    /// Active donors that have shared a location
    ///
    /// With `groups`, only donors whose blood group is listed are returned.
    pub fn list_located_donors(&self, groups: Option<&[BloodGroup]>) -> StorageResult<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE is_donor = 1 AND is_active = 1 \
               AND location_lat IS NOT NULL AND location_long IS NOT NULL \
             ORDER BY created_at, rowid"
        ))?;
        let donors = stmt
            .query_map([], user_from_row)?
            .filter(|row| match (row, groups) {
                (Ok(user), Some(groups)) => groups.contains(&user.blood_group),
                _ => true,
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(donors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::{new_user, seed_user};

    #[test]
    fn test_create_and_get_user() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "asha", BloodGroup::OPositive, Some((27.7, 85.3)));

        let fetched = db.get_user(user.id).unwrap();
        assert_eq!(fetched.username, "asha");
        assert_eq!(fetched.blood_group, BloodGroup::OPositive);
        assert_eq!(fetched.location_lat, Some(27.7));
        assert!(fetched.is_active);
        assert_eq!(fetched.created_at, user.created_at);
    }

    #[test]
    fn test_duplicate_username_or_email_conflicts() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "asha", BloodGroup::OPositive, None);

        let err = db.create_user(&new_user("asha", BloodGroup::APositive, None)).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let mut other = new_user("bikash", BloodGroup::APositive, None);
        other.email = "asha@example.com".to_string();
        let err = db.create_user(&other).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[test]
    fn test_lookup_by_username_and_email() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "asha", BloodGroup::OPositive, None);

        assert_eq!(db.get_user_by_username("asha").unwrap().unwrap().id, user.id);
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
        assert_eq!(
            db.get_user_by_email("ASHA@example.com").unwrap().unwrap().id,
            user.id
        );
    }

    #[test]
    fn test_missing_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_user(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "User", .. }));
    }

    #[test]
    fn test_update_profile_and_password() {
        let db = Database::open_in_memory().unwrap();
        let mut user = seed_user(&db, "asha", BloodGroup::OPositive, None);

        user.first_name = "Asha".to_string();
        user.age = 41;
        user.is_donor = false;
        db.update_user(&user).unwrap();
        db.set_user_password(user.id, "new-hash").unwrap();
        db.set_user_location(user.id, Coordinates::new(27.1, 85.1)).unwrap();

        let fetched = db.get_user(user.id).unwrap();
        assert_eq!(fetched.first_name, "Asha");
        assert_eq!(fetched.age, 41);
        assert!(!fetched.is_donor);
        assert_eq!(fetched.password_hash, "new-hash");
        assert_eq!(fetched.location_long, Some(85.1));
    }

    #[test]
    fn test_located_donors_filter() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "a", BloodGroup::OPositive, Some((27.7, 85.3)));
        seed_user(&db, "b", BloodGroup::ANegative, Some((27.7, 85.3)));
        seed_user(&db, "c", BloodGroup::OPositive, None);

        assert_eq!(db.list_located_donors(None).unwrap().len(), 2);
        let only_o = db
            .list_located_donors(Some(&[BloodGroup::OPositive]))
            .unwrap();
        assert_eq!(only_o.len(), 1);
        assert_eq!(only_o[0].username, "a");
    }
}
