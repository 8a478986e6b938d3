//! Blood test health prediction
//!
//! Reference-range checks run locally for every panel. When a completion
//! model is configured its analysis supplies the narrative text; otherwise a
//! local assessment is stored instead.

mod client;
mod health;

pub use client::{CompletionClient, CompletionRequest, OpenAiClient, PredictionError};
pub use health::{
    abnormal_findings, Deviation, DonorInfo, Finding, HealthPredictor, Marker, Prediction,
};

#[cfg(test)]
pub(crate) use client::ScriptedClient;
