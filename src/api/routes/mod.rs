//! API Routes
//!
//! Route handlers organized by resource, plus the helpers that attach
//! display names to stored records.

pub mod assignments;
pub mod auth;
pub mod blood_requests;
pub mod blood_tests;
pub mod chat;
pub mod dashboard;
pub mod donations;
pub mod health;
pub mod hospital_auth;
pub mod hospitals;
pub mod notifications;
pub mod users;

use uuid::Uuid;

use crate::api::dto::{BloodRequestView, BloodTestView, ChatRoomView, DonationView, MessageView};
use crate::api::error::ApiResult;
use crate::domain::{BloodRequest, BloodTest, ChatRoom, Donation, Message, User};
use crate::storage::{Database, StorageError};

/// Full name of an account, or an empty string if it no longer exists
pub(crate) fn user_name(db: &Database, id: Uuid) -> ApiResult<String> {
    match db.get_user(id) {
        Ok(user) => Ok(user.full_name()),
        Err(StorageError::NotFound { .. }) => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn request_view(db: &Database, request: BloodRequest) -> ApiResult<BloodRequestView> {
    let patient = db.get_user(request.patient_id)?;
    Ok(BloodRequestView {
        patient_name: patient.full_name(),
        patient_blood_group: patient.blood_group,
        request,
    })
}

pub(crate) fn donation_view(db: &Database, donation: Donation) -> ApiResult<DonationView> {
    let request = db.get_blood_request(donation.blood_request_id)?;
    let hospital_name = match donation.hospital_id {
        Some(id) => Some(db.get_hospital(id)?.name),
        None => None,
    };
    Ok(DonationView {
        donor_name: user_name(db, donation.donor_id)?,
        patient_name: user_name(db, request.patient_id)?,
        hospital_name,
        donation,
    })
}

pub(crate) fn test_view(db: &Database, test: BloodTest) -> ApiResult<BloodTestView> {
    let donation = db.get_donation(test.donation_id)?;
    Ok(BloodTestView {
        donor_name: user_name(db, donation.donor_id)?,
        test,
    })
}

pub(crate) fn room_view(db: &Database, room: ChatRoom) -> ApiResult<ChatRoomView> {
    Ok(ChatRoomView {
        donor_name: user_name(db, room.donor_id)?,
        patient_name: user_name(db, room.patient_id)?,
        room,
    })
}

pub(crate) fn message_view(message: Message, sender: &User) -> MessageView {
    MessageView {
        sender_name: sender.full_name(),
        message,
    }
}

/// Collect views, stopping at the first failure
pub(crate) fn views<T, V>(
    db: &Database,
    items: Vec<T>,
    view: fn(&Database, T) -> ApiResult<V>,
) -> ApiResult<Vec<V>> {
    items.into_iter().map(|item| view(db, item)).collect()
}
