//! Hospital selection for an accepted donation

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::best_hospital;
use crate::domain::Hospital;
use crate::geo::{distance_km, round_km, Coordinates};
use crate::prediction::{CompletionClient, CompletionRequest};

/// The chosen hospital and how it was chosen
#[derive(Debug, Clone)]
pub struct HospitalSelection {
    pub hospital: Hospital,
    pub total_distance_km: f64,
    pub ai_recommended: bool,
}

#[derive(Serialize)]
struct Candidate<'a> {
    id: Uuid,
    name: &'a str,
    address: &'a str,
    donor_distance: f64,
    patient_distance: f64,
    total_distance: f64,
}

/// Picks a hospital, asking the completion model first when one is configured
#[derive(Clone, Default)]
pub struct HospitalSelector {
    client: Option<Arc<dyn CompletionClient>>,
}

impl HospitalSelector {
    pub fn new(client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { client }
    }

    /// Choose among `hospitals` for a donor and patient
    ///
    /// The model's answer is only used when it names one of the candidates.
    /// Anything else falls back to the smallest combined distance.
    pub async fn select(
        &self,
        hospitals: &[Hospital],
        donor: Coordinates,
        patient: Coordinates,
    ) -> Option<HospitalSelection> {
        if hospitals.is_empty() {
            return None;
        }

        if let Some(client) = &self.client {
            match self.ask_model(client.as_ref(), hospitals, donor, patient).await {
                Some(selection) => return Some(selection),
                None => tracing::info!("Model gave no usable hospital, using nearest"),
            }
        }

        best_hospital(hospitals, donor, patient).map(|(hospital, total)| HospitalSelection {
            hospital,
            total_distance_km: total,
            ai_recommended: false,
        })
    }

    async fn ask_model(
        &self,
        client: &dyn CompletionClient,
        hospitals: &[Hospital],
        donor: Coordinates,
        patient: Coordinates,
    ) -> Option<HospitalSelection> {
        let prompt = match build_prompt(hospitals, donor, patient) {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode hospital candidates");
                return None;
            }
        };
        let request = CompletionRequest {
            system: None,
            prompt,
            max_tokens: 50,
            temperature: 0.1,
        };

        let reply = match client.complete(request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Hospital selection request failed");
                return None;
            }
        };

        let id = parse_hospital_id(&reply)?;
        let hospital = hospitals.iter().find(|h| h.id == id)?;
        let at = Coordinates::new(hospital.location_lat, hospital.location_long);
        Some(HospitalSelection {
            hospital: hospital.clone(),
            total_distance_km: distance_km(donor, at) + distance_km(patient, at),
            ai_recommended: true,
        })
    }
}

fn build_prompt(
    hospitals: &[Hospital],
    donor: Coordinates,
    patient: Coordinates,
) -> Result<String, serde_json::Error> {
    let mut candidates: Vec<Candidate<'_>> = hospitals
        .iter()
        .map(|hospital| {
            let at = Coordinates::new(hospital.location_lat, hospital.location_long);
            let donor_distance = distance_km(donor, at);
            let patient_distance = distance_km(patient, at);
            Candidate {
                id: hospital.id,
                name: &hospital.name,
                address: &hospital.address,
                donor_distance: round_km(donor_distance),
                patient_distance: round_km(patient_distance),
                total_distance: round_km(donor_distance + patient_distance),
            }
        })
        .collect();
    candidates.sort_by(|a, b| a.total_distance.total_cmp(&b.total_distance));

    Ok(format!(
        "Analyze these hospitals and select the best one for a blood donation scenario:\n\
         Donor: {}, {}\n\
         Patient: {}, {}\n\
         Hospitals: {}\n\
         Return ONLY the hospital ID of the best choice.",
        donor.lat,
        donor.lng,
        patient.lat,
        patient.lng,
        serde_json::to_string_pretty(&candidates)?
    ))
}

/// First UUID-looking token in the model's reply
fn parse_hospital_id(reply: &str) -> Option<Uuid> {
    reply
        .split(|c: char| !(c.is_ascii_hexdigit() || c == '-'))
        .find_map(|token| Uuid::parse_str(token).ok())
}
