//! Stored records
//!
//! Foreign keys serialize under the relation name (`patient`, `donor`,
//! `hospital`, ...) because that is what the web clients read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    AssignmentStatus, BloodGroup, DonationStatus, Gender, NotificationType, RequestStatus,
};
use crate::geo::{Coordinates, Located};

/// A donor and/or patient account
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
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
    pub is_active: bool,
    pub location_lat: Option<f64>,
    pub location_long: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub password_hash: String,
}

impl User {
    /// "First Last", or the username when no name was given
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

impl Located for User {
    fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.location_lat, self.location_long)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Hospital {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub location_lat: f64,
    pub location_long: f64,
    pub created_at: DateTime<Utc>,
}

impl Located for Hospital {
    fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates::new(self.location_lat, self.location_long))
    }
}

/// Staff login bound to one hospital
#[derive(Debug, Clone, Serialize)]
pub struct HospitalUser {
    pub id: Uuid,
    #[serde(rename = "hospital")]
    pub hospital_id: Uuid,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BloodRequest {
    pub id: Uuid,
    #[serde(rename = "patient")]
    pub patient_id: Uuid,
    pub blood_group: BloodGroup,
    pub units_required: u32,
    pub urgency: String,
    pub reason: Option<String>,
    pub location_lat: f64,
    pub location_long: f64,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl Located for BloodRequest {
    fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates::new(self.location_lat, self.location_long))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Donation {
    pub id: Uuid,
    #[serde(rename = "donor")]
    pub donor_id: Uuid,
    #[serde(rename = "blood_request")]
    pub blood_request_id: Uuid,
    #[serde(rename = "hospital")]
    pub hospital_id: Option<Uuid>,
    pub status: DonationStatus,
    pub ai_recommended_hospital: bool,
    pub donation_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A donor scheduled at a hospital for testing and collection
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub id: Uuid,
    #[serde(rename = "donor")]
    pub donor_id: Uuid,
    #[serde(rename = "hospital")]
    pub hospital_id: Uuid,
    #[serde(rename = "donation")]
    pub donation_id: Uuid,
    pub status: AssignmentStatus,
    pub ai_recommended: bool,
    pub assigned_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Measured blood markers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloodPanel {
    /// mg/dL
    pub sugar_level: f64,
    /// mg/dL
    pub uric_acid_level: f64,
    /// cells/mcL
    pub wbc_count: f64,
    /// million cells/mcL
    pub rbc_count: f64,
    /// g/dL
    pub hemoglobin: f64,
    /// platelets/mcL
    pub platelet_count: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BloodTest {
    pub id: Uuid,
    #[serde(rename = "donation")]
    pub donation_id: Uuid,
    #[serde(flatten)]
    pub panel: BloodPanel,
    /// Hospital that ran the test
    pub tested_by: Uuid,
    pub health_risk_prediction: Option<String>,
    pub disease_prediction: Option<String>,
    pub prediction_confidence: Option<u8>,
    pub life_saved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRoom {
    pub id: Uuid,
    #[serde(rename = "donor")]
    pub donor_id: Uuid,
    #[serde(rename = "patient")]
    pub patient_id: Uuid,
    #[serde(rename = "donation")]
    pub donation_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.donor_id == user_id || self.patient_id == user_id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    #[serde(rename = "chat_room")]
    pub chat_room_id: Uuid,
    #[serde(rename = "sender")]
    pub sender_id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub related_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: "donor1".to_string(),
            email: "donor1@example.com".to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            blood_group: BloodGroup::OPositive,
            allergies: None,
            age: 30,
            gender: Gender::Female,
            address: "Kathmandu".to_string(),
            phone_number: "9800000000".to_string(),
            is_donor: true,
            is_recipient: true,
            is_staff: false,
            is_active: true,
            location_lat: Some(27.7),
            location_long: None,
            created_at: Utc::now(),
            password_hash: "secret".to_string(),
        }
    }

    #[test]
    fn test_full_name_falls_back_to_username() {
        assert_eq!(user("Sita", "Rai").full_name(), "Sita Rai");
        assert_eq!(user("Sita", "").full_name(), "Sita");
        assert_eq!(user("", "").full_name(), "donor1");
    }

    #[test]
    fn test_user_serialization_hides_password() {
        let json = serde_json::to_value(user("Sita", "Rai")).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["blood_group"], "O+");
        assert_eq!(json["gender"], "F");
    }

    #[test]
    fn test_partial_location_is_absent() {
        assert!(user("a", "b").coordinates().is_none());
    }

    #[test]
    fn test_foreign_keys_use_relation_names() {
        let room = ChatRoom {
            id: Uuid::new_v4(),
            donor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            donation_id: Uuid::new_v4(),
            is_active: true,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&room).unwrap();
        assert!(json.get("donor").is_some());
        assert!(json.get("patient").is_some());
        assert!(room.is_participant(room.patient_id));
        assert!(!room.is_participant(Uuid::new_v4()));
    }
}
