//! Project RED persistence
//!
//! Everything the server owns lives in one SQLite database:
//!
//! - **database**: connection handle, pragmas and row decoding helpers
//! - **schema**: table definitions, applied with `CREATE TABLE IF NOT EXISTS`
//! - **users** / **hospitals**: accounts and hospital staff logins
//! - **requests** / **donations**: blood requests, donations and assignments
//! - **blood_tests**, **chat**, **notifications**
//! - **error**: error types
//!
//! Repository operations are inherent methods on [`Database`], grouped by
//! the file that defines them.
//!
//! # Example
//!
//! ```rust,no_run
//! use project_red::storage::Database;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::open("./data/project-red.db")?;
//!     for hospital in db.list_hospitals()? {
//!         println!("{} ({}, {})", hospital.name, hospital.location_lat, hospital.location_long);
//!     }
//!     Ok(())
//! }
//! ```

mod chat;
mod database;
mod donations;
pub mod error;
mod hospitals;
mod notifications;
mod requests;
mod schema;
mod users;

pub use blood_tests::StoredPrediction;
pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use hospitals::{NewHospital, NewHospitalAccount};
pub use notifications::NewNotification;
pub use requests::NewBloodRequest;
pub use users::NewUser;

/// Builders shared by tests across the crate
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::{BloodGroup, BloodPanel, BloodRequest, Donation, Gender, Hospital, User};
    use crate::geo::Coordinates;

    pub fn new_user(
        username: &str,
        blood_group: BloodGroup,
        location: Option<(f64, f64)>,
    ) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: "unusable".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            blood_group,
            allergies: None,
            age: 30,
            gender: Gender::Female,
            address: "Kathmandu".to_string(),
            phone_number: "9800000000".to_string(),
            is_donor: true,
            is_recipient: true,
            is_staff: false,
            location: location.map(|(lat, lng)| Coordinates::new(lat, lng)),
        }
    }

    pub fn seed_user(
        db: &Database,
        username: &str,
        blood_group: BloodGroup,
        location: Option<(f64, f64)>,
    ) -> User {
        db.create_user(&new_user(username, blood_group, location))
            .unwrap()
    }

    pub fn new_hospital(name: &str, lat: f64, lng: f64) -> NewHospital {
        NewHospital {
            name: name.to_string(),
            address: format!("{name} Road"),
            phone_number: "01-4000000".to_string(),
            email: None,
            location: Coordinates::new(lat, lng),
        }
    }

    pub fn seed_hospital(db: &Database, name: &str, lat: f64, lng: f64) -> Hospital {
        db.create_hospital(&new_hospital(name, lat, lng)).unwrap()
    }

    pub fn seed_request(
        db: &Database,
        patient: &User,
        blood_group: BloodGroup,
        units_required: u32,
    ) -> BloodRequest {
        db.create_blood_request(&NewBloodRequest {
            patient_id: patient.id,
            blood_group,
            units_required,
            urgency: "high".to_string(),
            reason: Some("surgery".to_string()),
            location: Coordinates::new(27.7172, 85.3240),
        })
        .unwrap()
    }

    /// A patient, a located donor, one request and one pending donation
    pub fn seed_donation(db: &Database) -> Donation {
        let patient = seed_user(db, "patient", BloodGroup::APositive, Some((27.7172, 85.3240)));
        let donor = seed_user(db, "donor", BloodGroup::APositive, Some((27.70, 85.30)));
        let request = seed_request(db, &patient, BloodGroup::APositive, 1);
        db.create_donation(donor.id, request.id).unwrap()
    }

    pub fn normal_panel() -> BloodPanel {
        BloodPanel {
            sugar_level: 90.0,
            uric_acid_level: 5.0,
            wbc_count: 7000.0,
            rbc_count: 5.0,
            hemoglobin: 14.0,
            platelet_count: 250_000.0,
        }
    }
}
