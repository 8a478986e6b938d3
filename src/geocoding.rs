//! Address geocoding
//!
//! Turns a free-form address into coordinates when a client registers
//! without sharing its location.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GeocodingConfig;
use crate::geo::Coordinates;

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Geocoding API returned status {0}")]
    Status(String),

    #[error("No results for address")]
    NoResults,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError>;
}

/// Google Maps Geocoding API client
pub struct GoogleGeocoder {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl GoogleGeocoder {
    /// `None` when no API key is configured
    pub fn from_config(config: &GeocodingConfig) -> Option<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())?;
        Some(Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: config.base_url.clone(),
        })
    }

    fn url(&self, address: &str) -> String {
        format!(
            "{}?address={}&key={}",
            self.base_url,
            urlencoding::encode(address),
            urlencoding::encode(&self.api_key)
        )
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError> {
        let response: GeocodeResponse = self
            .client
            .get(self.url(address))
            .send()
            .await?
            .json()
            .await?;
        first_location(response)
    }
}

fn first_location(response: GeocodeResponse) -> Result<Coordinates, GeocodeError> {
    match response.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" => return Err(GeocodeError::NoResults),
        other => return Err(GeocodeError::Status(other.to_string())),
    }
    response
        .results
        .into_iter()
        .next()
        .map(|result| Coordinates::new(result.geometry.location.lat, result.geometry.location.lng))
        .ok_or(GeocodeError::NoResults)
}

/// Fixed answers keyed by address, for tests
#[cfg(test)]
pub(crate) struct StaticGeocoder(pub std::collections::HashMap<String, Coordinates>);

#[cfg(test)]
#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError> {
        self.0.get(address).copied().ok_or(GeocodeError::NoResults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_key() {
        assert!(GoogleGeocoder::from_config(&GeocodingConfig::default()).is_none());
    }

    #[test]
    fn test_url_encodes_address() {
        let geocoder = GoogleGeocoder::from_config(&GeocodingConfig {
            api_key: Some("k3y".to_string()),
            ..GeocodingConfig::default()
        })
        .unwrap();
        let url = geocoder.url("Thamel, Kathmandu & more");
        assert!(url.ends_with("?address=Thamel%2C%20Kathmandu%20%26%20more&key=k3y"));
    }

    #[test]
    fn test_first_location() {
        let ok: GeocodeResponse = serde_json::from_str(
            r#"{"status":"OK","results":[{"geometry":{"location":{"lat":27.7,"lng":85.3}}}]}"#,
        )
        .unwrap();
        assert_eq!(first_location(ok).unwrap(), Coordinates::new(27.7, 85.3));

        let none: GeocodeResponse =
            serde_json::from_str(r#"{"status":"ZERO_RESULTS","results":[]}"#).unwrap();
        assert!(matches!(first_location(none), Err(GeocodeError::NoResults)));

        let denied: GeocodeResponse =
            serde_json::from_str(r#"{"status":"REQUEST_DENIED"}"#).unwrap();
        assert!(matches!(first_location(denied), Err(GeocodeError::Status(_))));
    }
}
