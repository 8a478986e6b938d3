//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::domain::{
    Assignment, AssignmentStatus, BloodGroup, BloodPanel, BloodRequest, BloodTest, ChatRoom,
    Donation, DonationStatus, Gender, Hospital, HospitalUser, Message, ParseEnumError, User,
};
use crate::geo::{round_km, Coordinates, Ranked};

// ============================================
// AUTH DTOs
// ============================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub blood_group: BloodGroup,
    #[serde(default)]
    pub allergies: Option<String>,
    pub age: u32,
    pub gender: Gender,
    pub address: String,
    pub phone_number: String,
    #[serde(default = "default_true")]
    pub is_donor: bool,
    #[serde(default = "default_true")]
    pub is_recipient: bool,
    #[serde(default)]
    pub location_lat: Option<f64>,
    #[serde(default)]
    pub location_long: Option<f64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by register and login
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub refresh: String,
    pub access: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// `token` is the `<uid>/<token>` pair from the emailed link
///
/// Clients that split the link may send `uid` separately.
#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirm {
    #[serde(default)]
    pub uid: Option<String>,
    pub token: String,
    pub new_password: String,
}

impl PasswordResetConfirm {
    pub fn full_token(&self) -> String {
        match &self.uid {
            Some(uid) => format!("{}/{}", uid.trim_matches('/'), self.token.trim_matches('/')),
            None => self.token.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub access: String,
}

#[derive(Debug, Deserialize)]
pub struct HospitalRegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: String,
    pub address: String,
    pub phone_number: String,
    pub location_lat: f64,
    pub location_long: f64,
}

#[derive(Debug, Serialize)]
pub struct HospitalRegisterResponse {
    pub message: String,
    pub hospital: Hospital,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct HospitalLoginResponse {
    pub hospital_user: HospitalUser,
    pub hospital: Hospital,
    pub refresh: String,
    pub access: String,
    pub message: String,
}

// ============================================
// USER DTOs
// ============================================

/// Partial profile update; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub blood_group: Option<BloodGroup>,
    pub allergies: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub is_donor: Option<bool>,
    pub is_recipient: Option<bool>,
    pub location_lat: Option<f64>,
    pub location_long: Option<f64>,
}

impl UserUpdate {
    pub fn apply(self, user: &mut User) -> ApiResult<()> {
        if let Some(email) = self.email {
            validate_email(&email)?;
            user.email = email;
        }
        if let Some(age) = self.age {
            validate_age(age)?;
            user.age = age;
        }
        if self.location_lat.is_some() || self.location_long.is_some() {
            let lat = self.location_lat.or(user.location_lat);
            let lng = self.location_long.or(user.location_long);
            if let (Some(lat), Some(lng)) = (lat, lng) {
                let at = Coordinates::parse(lat, lng)?;
                user.location_lat = Some(at.lat);
                user.location_long = Some(at.lng);
            } else {
                return Err(ApiError::validation(
                    "location_lat and location_long must be set together",
                ));
            }
        }

        macro_rules! assign {
            ($($field:ident),+) => {
                $(if let Some(value) = self.$field { user.$field = value; })+
            };
        }
        assign!(
            first_name,
            last_name,
            blood_group,
            gender,
            address,
            phone_number,
            is_donor,
            is_recipient
        );
        if let Some(allergies) = self.allergies {
            user.allergies = Some(allergies).filter(|a| !a.trim().is_empty());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Query string for proximity searches
///
/// Kept as strings so malformed numbers produce a readable 400.
#[derive(Debug, Default, Deserialize)]
pub struct NearbyQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub blood_group: Option<String>,
    pub max_distance: Option<String>,
}

impl NearbyQuery {
    pub fn origin(&self) -> ApiResult<Coordinates> {
        let (Some(lat), Some(lng)) = (non_empty(&self.lat), non_empty(&self.lng)) else {
            return Err(ApiError::validation(
                "Latitude and longitude parameters are required",
            ));
        };
        let lat = parse_f64(lat)?;
        let lng = parse_f64(lng)?;
        Ok(Coordinates::parse(lat, lng)?)
    }

    pub fn max_distance(&self, default_km: f64) -> ApiResult<f64> {
        match non_empty(&self.max_distance) {
            Some(value) => {
                let km = parse_f64(value)?;
                if km < 0.0 {
                    return Err(ApiError::validation("max_distance must not be negative"));
                }
                Ok(km)
            }
            None => Ok(default_km),
        }
    }

    pub fn blood_group(&self) -> ApiResult<Option<BloodGroup>> {
        non_empty(&self.blood_group)
            .map(|group| {
                group
                    .parse()
                    .map_err(|e: ParseEnumError| ApiError::validation(e.to_string()))
            })
            .transpose()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_f64(value: &str) -> ApiResult<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ApiError::validation("Invalid coordinate values"))
}

/// A record with its distance from the query origin
#[derive(Debug, Serialize)]
pub struct WithDistance<T: Serialize> {
    #[serde(flatten)]
    pub item: T,
    /// Kilometres, two decimals
    pub distance: f64,
}

impl<T: Serialize> From<Ranked<T>> for WithDistance<T> {
    fn from(ranked: Ranked<T>) -> Self {
        Self {
            item: ranked.item,
            distance: round_km(ranked.distance_km),
        }
    }
}

// ============================================
// HOSPITAL DTOs
// ============================================

#[derive(Debug, Deserialize)]
pub struct HospitalInput {
    pub name: String,
    pub address: String,
    pub phone_number: String,
    #[serde(default)]
    pub email: Option<String>,
    pub location_lat: f64,
    pub location_long: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct HospitalPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub location_lat: Option<f64>,
    pub location_long: Option<f64>,
}

impl HospitalPatch {
    pub fn apply(self, hospital: &mut Hospital) -> ApiResult<()> {
        let at = Coordinates::parse(
            self.location_lat.unwrap_or(hospital.location_lat),
            self.location_long.unwrap_or(hospital.location_long),
        )?;
        hospital.location_lat = at.lat;
        hospital.location_long = at.lng;
        if let Some(name) = self.name {
            hospital.name = required_text("name", name)?;
        }
        if let Some(address) = self.address {
            hospital.address = address;
        }
        if let Some(phone) = self.phone_number {
            hospital.phone_number = phone;
        }
        if let Some(email) = self.email {
            hospital.email = Some(email).filter(|e| !e.trim().is_empty());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct HospitalCoordinates {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub location_lat: f64,
    pub location_long: f64,
}

impl From<Hospital> for HospitalCoordinates {
    fn from(h: Hospital) -> Self {
        Self {
            id: h.id,
            name: h.name,
            address: h.address,
            location_lat: h.location_lat,
            location_long: h.location_long,
        }
    }
}

// ============================================
// BLOOD REQUEST / DONATION DTOs
// ============================================

#[derive(Debug, Deserialize)]
pub struct BloodRequestInput {
    pub blood_group: BloodGroup,
    #[serde(default = "default_units")]
    pub units_required: u32,
    pub urgency: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub location_lat: f64,
    pub location_long: f64,
}

fn default_units() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct BloodRequestView {
    #[serde(flatten)]
    pub request: BloodRequest,
    pub patient_name: String,
    pub patient_blood_group: BloodGroup,
}

#[derive(Debug, Deserialize)]
pub struct DonationInput {
    pub blood_request: Uuid,
    #[serde(default)]
    pub location_lat: Option<f64>,
    #[serde(default)]
    pub location_long: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct DonationPatch {
    pub status: DonationStatus,
}

#[derive(Debug, Serialize)]
pub struct DonationView {
    #[serde(flatten)]
    pub donation: Donation,
    pub donor_name: String,
    pub patient_name: String,
    pub hospital_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AcceptDonationRequest {
    pub donor_lat: Option<f64>,
    pub donor_lng: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct AcceptDonationResponse {
    pub message: String,
    pub hospital: Option<Hospital>,
    pub chat_room_id: Uuid,
    pub assignment_id: Option<Uuid>,
    pub ai_recommended: bool,
}

// ============================================
// BLOOD TEST DTOs
// ============================================

#[derive(Debug, Deserialize)]
pub struct BloodTestInput {
    pub donation: Uuid,
    /// Testing hospital; defaults to the donation's hospital
    #[serde(default)]
    pub tested_by: Option<Uuid>,
    #[serde(flatten)]
    pub panel: BloodPanel,
}

/// Partial update of a stored test
#[derive(Debug, Default, Deserialize)]
pub struct BloodTestPatch {
    pub sugar_level: Option<f64>,
    pub uric_acid_level: Option<f64>,
    pub wbc_count: Option<f64>,
    pub rbc_count: Option<f64>,
    pub hemoglobin: Option<f64>,
    pub platelet_count: Option<f64>,
    pub life_saved: Option<bool>,
}

impl BloodTestPatch {
    /// Apply marker values; returns whether any marker changed
    pub fn apply_panel(&self, panel: &mut BloodPanel) -> bool {
        let mut changed = false;
        for (value, slot) in [
            (self.sugar_level, &mut panel.sugar_level),
            (self.uric_acid_level, &mut panel.uric_acid_level),
            (self.wbc_count, &mut panel.wbc_count),
            (self.rbc_count, &mut panel.rbc_count),
            (self.hemoglobin, &mut panel.hemoglobin),
            (self.platelet_count, &mut panel.platelet_count),
        ] {
            if let Some(value) = value {
                if *slot != value {
                    *slot = value;
                    changed = true;
                }
            }
        }
        changed
    }
}

#[derive(Debug, Serialize)]
pub struct BloodTestView {
    #[serde(flatten)]
    pub test: BloodTest,
    pub donor_name: String,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub message: String,
    pub summary: String,
    pub confidence: u8,
}

// ============================================
// CHAT / NOTIFICATION DTOs
// ============================================

#[derive(Debug, Serialize)]
pub struct ChatRoomView {
    #[serde(flatten)]
    pub room: ChatRoom,
    pub donor_name: String,
    pub patient_name: String,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub message: String,
    pub updated: usize,
}

// ============================================
// HOSPITAL DASHBOARD DTOs
// ============================================

/// One assigned donor as shown on the hospital dashboard
#[derive(Debug, Serialize)]
pub struct DashboardDonor {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub blood_group: BloodGroup,
    pub age: u32,
    pub gender: Gender,
    pub phone_number: String,
    pub address: String,
    pub donation_id: Uuid,
    pub assignment_id: Uuid,
    pub donation_status: DonationStatus,
    pub assignment_status: AssignmentStatus,
    pub blood_test_exists: bool,
    pub blood_test: Option<BloodTest>,
    pub life_saved: bool,
    pub assigned_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub ai_recommended: bool,
}

impl DashboardDonor {
    pub fn new(
        donor: User,
        assignment: Assignment,
        donation: Donation,
        blood_test: Option<BloodTest>,
    ) -> Self {
        Self {
            id: donor.id,
            first_name: donor.first_name,
            last_name: donor.last_name,
            blood_group: donor.blood_group,
            age: donor.age,
            gender: donor.gender,
            phone_number: donor.phone_number,
            address: donor.address,
            donation_id: donation.id,
            assignment_id: assignment.id,
            donation_status: donation.status,
            assignment_status: assignment.status,
            blood_test_exists: blood_test.is_some(),
            life_saved: blood_test.as_ref().is_some_and(|t| t.life_saved),
            blood_test,
            assigned_at: assignment.assigned_at,
            completed_at: assignment.completed_at,
            ai_recommended: assignment.ai_recommended,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub status: String,
    pub assignment_id: Uuid,
    pub donation_id: Uuid,
    pub donation_date: Option<DateTime<Utc>>,
}

// ============================================
// HEALTH DTOs
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,
    pub database: String,
    pub websocket_connections: usize,
    pub prediction_model: bool,
    pub uptime_seconds: u64,
    pub version: String,
}

// ============================================
// VALIDATION HELPERS
// ============================================

pub fn validate_email(email: &str) -> ApiResult<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::validation("Enter a valid email address")),
    }
}

pub fn validate_age(age: u32) -> ApiResult<()> {
    if (18..=65).contains(&age) {
        Ok(())
    } else {
        Err(ApiError::validation("Age must be between 18 and 65"))
    }
}

pub fn required_text(field: &str, value: String) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ApiError::validation(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearby_query_parsing() {
        let query = NearbyQuery {
            lat: Some("27.7".to_string()),
            lng: Some(" 85.3 ".to_string()),
            blood_group: Some("o+".to_string()),
            max_distance: None,
        };
        assert_eq!(query.origin().unwrap(), Coordinates::new(27.7, 85.3));
        assert_eq!(query.max_distance(50.0).unwrap(), 50.0);
        assert_eq!(query.blood_group().unwrap(), Some(BloodGroup::OPositive));

        let missing = NearbyQuery::default();
        assert!(missing.origin().is_err());

        let bad = NearbyQuery {
            lat: Some("north".to_string()),
            lng: Some("85".to_string()),
            max_distance: Some("-1".to_string()),
            ..NearbyQuery::default()
        };
        assert!(bad.origin().is_err());
        assert!(bad.max_distance(50.0).is_err());
    }

    #[test]
    fn test_nearby_query_blood_group() {
        let query = |group: &str| NearbyQuery {
            blood_group: Some(group.to_string()),
            ..NearbyQuery::default()
        };
        assert_eq!(query(" ab- ").blood_group().unwrap(), Some(BloodGroup::AbNegative));
        assert_eq!(query("  ").blood_group().unwrap(), None);
        assert!(matches!(
            query("C+").blood_group(),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_reset_confirm_joins_uid() {
        let split: PasswordResetConfirm = serde_json::from_str(
            r#"{"uid": "abc", "token": "/k2-ff/", "new_password": "x"}"#,
        )
        .unwrap();
        assert_eq!(split.full_token(), "abc/k2-ff");

        let joined: PasswordResetConfirm =
            serde_json::from_str(r#"{"token": "abc/k2-ff/", "new_password": "x"}"#).unwrap();
        assert_eq!(joined.full_token(), "abc/k2-ff/");
    }

    #[test]
    fn test_blood_test_patch_detects_changes() {
        let mut panel = BloodPanel {
            sugar_level: 90.0,
            uric_acid_level: 5.0,
            wbc_count: 7000.0,
            rbc_count: 5.0,
            hemoglobin: 14.0,
            platelet_count: 250_000.0,
        };
        let same = BloodTestPatch {
            sugar_level: Some(90.0),
            life_saved: Some(true),
            ..BloodTestPatch::default()
        };
        assert!(!same.apply_panel(&mut panel));

        let changed = BloodTestPatch {
            hemoglobin: Some(11.0),
            ..BloodTestPatch::default()
        };
        assert!(changed.apply_panel(&mut panel));
        assert_eq!(panel.hemoglobin, 11.0);
    }

    #[test]
    fn test_validators() {
        assert!(validate_email("donor@example.com").is_ok());
        assert!(validate_email("donor@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_age(18).is_ok());
        assert!(validate_age(66).is_err());
        assert!(required_text("name", "  ".to_string()).is_err());
    }
}
