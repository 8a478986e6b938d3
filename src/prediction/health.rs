//! Health analysis of blood test results

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::client::{CompletionClient, CompletionRequest};
use crate::domain::{BloodPanel, Gender};

const DEFAULT_CONFIDENCE: u8 = 80;
const FALLBACK_CONFIDENCE: u8 = 75;
const SUMMARY_MAX_CHARS: usize = 150;
const NOTIFICATION_MAX_CHARS: usize = 250;
const NOTIFICATION_KEYWORDS: [&str; 7] = [
    "recommend",
    "advice",
    "consult",
    "risk",
    "potential",
    "suggest",
    "result",
];

const SYSTEM_PROMPT: &str = "You are a medical AI assistant. \
     Analyze blood test results and provide:\n\
     1. Specific disease predictions if any abnormalities are found\n\
     2. Health risk assessment\n\
     3. Recommended actions and precautions\n\
     4. Confidence level\n\
     Be professional, accurate, and compassionate. \
     If results are normal, provide positive reinforcement in a fun way. \
     Format the response clearly with specific insights.";

const NORMAL_SUMMARY: &str = "Excellent health report! You're fit as a fiddle! 🎉";
const NORMAL_NOTIFICATION: &str =
    "Great news! Your blood test results are perfect. Keep up the healthy lifestyle! 💪";
const GENERIC_NOTIFICATION: &str = "Your detailed blood test analysis is ready. \
     Please check your dashboard for comprehensive health insights.";

/// Who the panel belongs to; gender selects the reference ranges
#[derive(Debug, Clone)]
pub struct DonorInfo {
    pub name: String,
    pub age: u32,
    pub gender: Gender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Sugar,
    Hemoglobin,
    UricAcid,
    Wbc,
    Rbc,
    Platelets,
}

impl Marker {
    pub const ALL: [Marker; 6] = [
        Marker::Sugar,
        Marker::Hemoglobin,
        Marker::UricAcid,
        Marker::Wbc,
        Marker::Rbc,
        Marker::Platelets,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Marker::Sugar => "Sugar Level",
            Marker::Hemoglobin => "Hemoglobin",
            Marker::UricAcid => "Uric Acid",
            Marker::Wbc => "WBC Count",
            Marker::Rbc => "RBC Count",
            Marker::Platelets => "Platelet Count",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Marker::Sugar | Marker::UricAcid => "mg/dL",
            Marker::Hemoglobin => "g/dL",
            Marker::Wbc => "cells/mcL",
            Marker::Rbc => "million cells/mcL",
            Marker::Platelets => "platelets/mcL",
        }
    }

    pub fn value(&self, panel: &BloodPanel) -> f64 {
        match self {
            Marker::Sugar => panel.sugar_level,
            Marker::Hemoglobin => panel.hemoglobin,
            Marker::UricAcid => panel.uric_acid_level,
            Marker::Wbc => panel.wbc_count,
            Marker::Rbc => panel.rbc_count,
            Marker::Platelets => panel.platelet_count,
        }
    }

    /// Inclusive normal range; gender-neutral donors get the union of both
    pub fn normal_range(&self, gender: Gender) -> (f64, f64) {
        let (male, female) = match self {
            Marker::Sugar => return (70.0, 100.0),
            Marker::Wbc => return (4_500.0, 11_000.0),
            Marker::Platelets => return (150_000.0, 450_000.0),
            Marker::Hemoglobin => ((13.5, 17.5), (12.0, 15.5)),
            Marker::UricAcid => ((3.4, 7.0), (2.4, 6.0)),
            Marker::Rbc => ((4.7, 6.1), (4.2, 5.4)),
        };
        match gender {
            Gender::Male => male,
            Gender::Female => female,
            Gender::Other => (f64::min(male.0, female.0), f64::max(male.1, female.1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Deviation {
    Low,
    High,
}

/// One marker outside its normal range
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub marker: Marker,
    pub value: f64,
    pub range: (f64, f64),
    pub deviation: Deviation,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.deviation {
            Deviation::Low => "below",
            Deviation::High => "above",
        };
        write!(
            f,
            "{} {} {} is {} the normal range ({}-{} {})",
            self.marker.label(),
            self.value,
            self.marker.unit(),
            direction,
            self.range.0,
            self.range.1,
            self.marker.unit()
        )
    }
}

/// Markers of `panel` outside their reference range
pub fn abnormal_findings(panel: &BloodPanel, gender: Gender) -> Vec<Finding> {
    Marker::ALL
        .iter()
        .filter_map(|marker| {
            let value = marker.value(panel);
            let (low, high) = marker.normal_range(gender);
            let deviation = if value < low {
                Deviation::Low
            } else if value > high {
                Deviation::High
            } else {
                return None;
            };
            Some(Finding {
                marker: *marker,
                value,
                range: (low, high),
                deviation,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub full_prediction: String,
    pub summary: String,
    pub notification_message: String,
    pub confidence: u8,
    pub has_abnormalities: bool,
}

/// Produces a [`Prediction`] for a blood panel
///
/// Uses the completion model when one is configured and falls back to a
/// locally computed assessment when it is missing or fails.
#[derive(Clone, Default)]
pub struct HealthPredictor {
    client: Option<Arc<dyn CompletionClient>>,
}

impl HealthPredictor {
    pub fn new(client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { client }
    }

    pub fn has_model(&self) -> bool {
        self.client.is_some()
    }

    pub async fn predict(&self, panel: &BloodPanel, donor: &DonorInfo) -> Prediction {
        let findings = abnormal_findings(panel, donor.gender);

        let Some(client) = &self.client else {
            tracing::debug!("No completion model configured, using local assessment");
            return fallback_prediction(&findings);
        };

        let request = CompletionRequest {
            system: Some(SYSTEM_PROMPT.to_string()),
            prompt: build_prompt(panel, donor),
            max_tokens: 800,
            temperature: 0.7,
        };

        match client.complete(request).await {
            Ok(text) => parse_prediction(text, &findings),
            Err(e) => {
                tracing::error!(error = %e, "Health prediction failed, using local assessment");
                fallback_prediction(&findings)
            }
        }
    }
}

fn build_prompt(panel: &BloodPanel, donor: &DonorInfo) -> String {
    format!(
        "Analyze these blood test results comprehensively \
         and provide specific disease predictions:\n\
         \n\
         PATIENT INFORMATION:\n\
         - Name: {name}\n\
         - Age: {age}\n\
         - Gender: {gender}\n\
         \n\
         BLOOD TEST RESULTS:\n\
         - Sugar Level: {sugar} mg/dL (Normal: 70-100 mg/dL)\n\
         - Hemoglobin: {hb} g/dL (Normal: 13.5-17.5g/dL M, 12.0-15.5g/dL F)\n\
         - Uric Acid: {uric} mg/dL (Normal: 3.4-7.0mg/dL M, 2.4-6.0mg/dL F)\n\
         - WBC Count: {wbc} cells/mcL (Normal: 4,500-11,000)\n\
         - RBC Count: {rbc} million cells/mcL (Normal: 4.7-6.1M, 4.2-5.4F)\n\
         - Platelet Count: {plt} platelets/mcL (Normal: 150,000-450,000)\n\
         \n\
         REQUIRED ANALYSIS:\n\
         1. SPECIFIC DISEASE PREDICTIONS: List any potential diseases based on abnormal values\n\
         2. HEALTH RISK ASSESSMENT: Overall health risk level (Low/Medium/High)\n\
         3. CONFIDENCE LEVEL: 0-100% confidence in predictions\n\
         4. RECOMMENDATIONS: Specific actions, lifestyle changes, \
         and medical consultations needed\n\
         5. POSITIVE REINFORCEMENT: If all values are normal, provide fun, encouraging message\n\
         \n\
         Be specific about potential conditions like diabetes, anemia, infections, etc.",
        name = donor.name,
        age = donor.age,
        gender = donor.gender,
        sugar = panel.sugar_level,
        hb = panel.hemoglobin,
        uric = panel.uric_acid_level,
        wbc = panel.wbc_count,
        rbc = panel.rbc_count,
        plt = panel.platelet_count,
    )
}

fn parse_prediction(text: String, findings: &[Finding]) -> Prediction {
    let confidence = extract_confidence(&text);
    let normal = findings.is_empty();

    let (summary, notification_message) = if normal {
        (NORMAL_SUMMARY.to_string(), NORMAL_NOTIFICATION.to_string())
    } else {
        (extract_summary(&text), notification_sentence(&text))
    };

    Prediction {
        full_prediction: text,
        summary,
        notification_message,
        confidence,
        has_abnormalities: !normal,
    }
}

fn fallback_prediction(findings: &[Finding]) -> Prediction {
    let mut full_prediction = String::from(
        "Comprehensive health assessment completed. Please consult with a healthcare \
         professional for detailed analysis of your blood test results and personalized \
         medical advice.",
    );

    let summary = if findings.is_empty() {
        "Blood test analysis completed - consult healthcare provider".to_string()
    } else {
        full_prediction.push_str("\n\nValues outside the normal range:");
        for finding in findings {
            full_prediction.push_str("\n- ");
            full_prediction.push_str(&finding.to_string());
        }
        let labels: Vec<_> = findings.iter().map(|f| f.marker.label()).collect();
        format!(
            "{} value(s) outside the normal range: {} - consult healthcare provider",
            findings.len(),
            labels.join(", ")
        )
    };

    Prediction {
        full_prediction,
        summary,
        notification_message:
            "Your blood test results are ready. Please review them with your doctor.".to_string(),
        confidence: FALLBACK_CONFIDENCE,
        has_abnormalities: !findings.is_empty(),
    }
}

fn extract_confidence(text: &str) -> u8 {
    static PERCENT: OnceLock<Option<Regex>> = OnceLock::new();
    PERCENT
        .get_or_init(|| Regex::new(r"(\d{1,3})%").ok())
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .filter(|value| *value <= 100)
        .unwrap_or(DEFAULT_CONFIDENCE)
}

fn extract_summary(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with(['#', '-', '*']))
        .map(|line| truncate(line, SUMMARY_MAX_CHARS))
        .unwrap_or_else(|| "Health assessment completed".to_string())
}

fn notification_sentence(text: &str) -> String {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .find(|sentence| {
            let lower = sentence.to_lowercase();
            NOTIFICATION_KEYWORDS.iter().any(|kw| lower.contains(kw))
        })
        .map(|sentence| truncate(sentence, NOTIFICATION_MAX_CHARS))
        .unwrap_or_else(|| GENERIC_NOTIFICATION.to_string())
}

/// Cut to `max` characters, marking the cut with "..."
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
