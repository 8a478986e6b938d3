//! Domain model
//!
//! Typed records for everything the server owns: donors and patients,
//! hospitals and their staff accounts, blood requests, donations, hospital
//! assignments, blood tests, chat rooms and notifications.
//!
//! Status enums serialize to the lowercase strings the web clients expect
//! and are stored in SQLite as the same strings.

mod blood;
mod records;

pub use blood::BloodGroup;
pub use records::{
    Assignment, BloodPanel, BloodRequest, BloodTest, ChatRoom, Donation, Hospital, HospitalUser,
    Message, Notification, User,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A stored or submitted string did not name a known variant
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Declare a string-backed enum with `as_str`, `Display` and `FromStr`
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseEnumError::new($kind, s)),
                }
            }
        }
    };
}

string_enum! {
    /// Lifecycle of a patient's blood request
    RequestStatus ("request status") {
        Pending => "pending",
        Accepted => "accepted",
        Donating => "donating",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

string_enum! {
    /// Lifecycle of a single donor's donation
    DonationStatus ("donation status") {
        Pending => "pending",
        Scheduled => "scheduled",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

string_enum! {
    /// Lifecycle of a donor's visit to the assigned hospital
    AssignmentStatus ("assignment status") {
        Scheduled => "scheduled",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

string_enum! {
    NotificationType ("notification type") {
        BloodRequest => "blood_request",
        DonationAccepted => "donation_accepted",
        DonationCompleted => "donation_completed",
        LifeSaved => "life_saved",
        HealthAlert => "health_alert",
        HospitalAssigned => "hospital_assigned",
    }
}

/// Self-declared gender, used to pick reference ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "O",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M" | "MALE" => Ok(Gender::Male),
            "F" | "FEMALE" => Ok(Gender::Female),
            "O" | "OTHER" => Ok(Gender::Other),
            _ => Err(ParseEnumError::new("gender", s)),
        }
    }
}

impl RequestStatus {
    /// A request still open to new donors
    pub fn is_open(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Accepted)
    }
}

impl DonationStatus {
    /// No further status change is allowed
    pub fn is_final(&self) -> bool {
        matches!(self, DonationStatus::Completed | DonationStatus::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in DonationStatus::ALL {
            assert_eq!(status.as_str().parse::<DonationStatus>().unwrap(), *status);
        }
        assert_eq!(
            "Donating".parse::<RequestStatus>().unwrap(),
            RequestStatus::Donating
        );
        assert!("archived".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_gender_codes() {
        assert_eq!("m".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!("Female".parse::<Gender>().unwrap(), Gender::Female);
        assert!("x".parse::<Gender>().is_err());
        assert_eq!(serde_json::to_string(&Gender::Other).unwrap(), "\"O\"");
    }

    #[test]
    fn test_notification_type_serde() {
        let json = serde_json::to_string(&NotificationType::HospitalAssigned).unwrap();
        assert_eq!(json, "\"hospital_assigned\"");
    }

    #[test]
    fn test_request_is_open() {
        assert!(RequestStatus::Pending.is_open());
        assert!(!RequestStatus::Completed.is_open());
    }

    #[test]
    fn test_donation_is_final() {
        assert!(DonationStatus::Cancelled.is_final());
        assert!(DonationStatus::Completed.is_final());
        assert!(!DonationStatus::Scheduled.is_final());
    }
}
