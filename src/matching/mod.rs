//! Donor, request and hospital matching
//!
//! Proximity queries over the database built on [`crate::geo`]:
//!
//! - **nearby donors / hospitals**: everything within a radius, nearest first
//! - **donors to notify / best donors**: who should hear about a new request
//! - **available requests**: pending requests a donor could answer
//! - **hospital selection**: where donor and patient should meet
//!
//! Blood group matching is exact by default. With
//! `matching.compatible_blood_groups` enabled, any red-cell compatible group
//! matches instead.

mod selector;

pub use selector::{HospitalSelection, HospitalSelector};

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::domain::{BloodGroup, BloodRequest, Hospital, User};
use crate::geo::{min_total_distance, rank_by_distance, Coordinates, Located, Ranked};
use crate::storage::{Database, StorageError};

#[derive(Error, Debug)]
pub enum MatchingError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Only donors can view available requests")]
    NotADonor,

    #[error("Location not set")]
    MissingLocation,
}

pub type MatchingResult<T> = Result<T, MatchingError>;

/// Proximity queries with the configured radii
#[derive(Clone)]
pub struct Matcher {
    db: Arc<Database>,
    config: MatchingConfig,
}

impl Matcher {
    pub fn new(db: Arc<Database>, config: MatchingConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Donor groups that can answer a request for `recipient`
    pub fn donor_groups_for(&self, recipient: BloodGroup) -> Vec<BloodGroup> {
        if self.config.compatible_blood_groups {
            recipient.compatible_donors()
        } else {
            vec![recipient]
        }
    }

    /// Request groups a donor of `donor` group can answer
    pub fn recipient_groups_for(&self, donor: BloodGroup) -> Vec<BloodGroup> {
        if self.config.compatible_blood_groups {
            BloodGroup::ALL
                .iter()
                .copied()
                .filter(|recipient| donor.can_donate_to(*recipient))
                .collect()
        } else {
            vec![donor]
        }
    }

    /// Located donors within `max_km` of `origin`, nearest first
    pub fn nearby_donors(
        &self,
        origin: Coordinates,
        blood_group: Option<BloodGroup>,
        max_km: f64,
        exclude_user: Option<Uuid>,
    ) -> MatchingResult<Vec<Ranked<User>>> {
        let groups = blood_group.map(|group| [group]);
        let donors = self
            .db
            .list_located_donors(groups.as_ref().map(|g| g.as_slice()))?
            .into_iter()
            .filter(|donor| Some(donor.id) != exclude_user);
        Ok(rank_by_distance(origin, donors, max_km))
    }

    pub fn nearby_hospitals(
        &self,
        origin: Coordinates,
        max_km: f64,
    ) -> MatchingResult<Vec<Ranked<Hospital>>> {
        Ok(rank_by_distance(origin, self.db.list_hospitals()?, max_km))
    }

    /// Donors to alert when `request` is created
    pub fn donors_to_notify(&self, request: &BloodRequest) -> MatchingResult<Vec<Ranked<User>>> {
        self.donors_near_request(request, self.config.notify_radius_km)
    }

    /// Candidate donors for `request`, nearest first
    pub fn best_donors(&self, request: &BloodRequest) -> MatchingResult<Vec<Ranked<User>>> {
        self.donors_near_request(request, self.config.best_donor_radius_km)
    }

    fn donors_near_request(
        &self,
        request: &BloodRequest,
        max_km: f64,
    ) -> MatchingResult<Vec<Ranked<User>>> {
        let groups = self.donor_groups_for(request.blood_group);
        let donors = self
            .db
            .list_located_donors(Some(&groups))?
            .into_iter()
            .filter(|donor| donor.id != request.patient_id);
        Ok(rank_by_distance(
            Coordinates::new(request.location_lat, request.location_long),
            donors,
            max_km,
        ))
    }

    /// Pending requests `donor` could answer, nearest first
    pub fn available_requests(&self, donor: &User) -> MatchingResult<Vec<Ranked<BloodRequest>>> {
        if !donor.is_donor {
            return Err(MatchingError::NotADonor);
        }
        let origin = donor.coordinates().ok_or(MatchingError::MissingLocation)?;

        let groups = self.recipient_groups_for(donor.blood_group);
        let requests = self
            .db
            .list_pending_requests(&groups)?
            .into_iter()
            .filter(|request| request.patient_id != donor.id);
        Ok(rank_by_distance(
            origin,
            requests,
            self.config.available_request_radius_km,
        ))
    }

    /// The hospital with the smallest combined distance from donor and patient
    pub fn best_hospital(
        &self,
        donor: Coordinates,
        patient: Coordinates,
    ) -> MatchingResult<Option<(Hospital, f64)>> {
        let hospitals = self.db.list_hospitals()?;
        Ok(best_hospital(&hospitals, donor, patient))
    }
}

/// Pick from `hospitals` the one minimizing donor and patient travel
pub fn best_hospital(
    hospitals: &[Hospital],
    donor: Coordinates,
    patient: Coordinates,
) -> Option<(Hospital, f64)> {
    min_total_distance(donor, patient, hospitals).map(|(hospital, total)| (hospital.clone(), total))
}
