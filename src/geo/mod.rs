//! Great-circle distance and proximity ranking
//!
//! Every "nearest" feature in Project RED (nearby donors, nearby hospitals,
//! available blood requests, hospital selection) goes through this module.
//!
//! Distances use the haversine formula on a sphere with radius 6371 km.
//! Records without coordinates never appear in a ranking.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the Earth's surface in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Invalid coordinate input
#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    #[error("Latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("Longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("Coordinates must be finite numbers")]
    NotFinite,
}

impl Coordinates {
    /// Create coordinates without validation
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Create coordinates, rejecting values outside the valid ranges
    pub fn parse(lat: f64, lng: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(GeoError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(GeoError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }

    /// Build coordinates from a pair of optional columns
    pub fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) => Some(Self { lat, lng }),
            _ => None,
        }
    }

    /// Distance to another point in kilometres
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        distance_km(*self, *other)
    }
}

/// Haversine great-circle distance between two points in kilometres
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // Clamp guards against rounding pushing h just past 1.0 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).atan2((1.0 - h).max(0.0).sqrt());

    EARTH_RADIUS_KM * c
}

/// Round a distance to two decimals for API output
pub fn round_km(distance: f64) -> f64 {
    (distance * 100.0).round() / 100.0
}

/// Anything that may carry a location
pub trait Located {
    fn coordinates(&self) -> Option<Coordinates>;
}

impl Located for Coordinates {
    fn coordinates(&self) -> Option<Coordinates> {
        Some(*self)
    }
}

/// An item paired with its distance from the ranking origin
#[derive(Debug, Clone)]
pub struct Ranked<T> {
    pub item: T,
    pub distance_km: f64,
}

/// Rank items by distance from `origin`
///
/// Items without coordinates are dropped, items farther than `max_km` are
/// dropped (the bound is inclusive), and the rest are sorted nearest first.
/// The sort is stable: equidistant items keep their input order.
pub fn rank_by_distance<T, I>(origin: Coordinates, items: I, max_km: f64) -> Vec<Ranked<T>>
where
    T: Located,
    I: IntoIterator<Item = T>,
{
    let mut ranked: Vec<Ranked<T>> = items
        .into_iter()
        .filter_map(|item| {
            let distance_km = distance_km(origin, item.coordinates()?);
            (distance_km <= max_km).then_some(Ranked { item, distance_km })
        })
        .collect();

    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked
}

/// Pick the item minimizing the summed distance from two origins
///
/// Used to choose a hospital that is convenient for both donor and patient.
/// Ties go to the earliest item.
pub fn min_total_distance<'a, T: Located>(
    first: Coordinates,
    second: Coordinates,
    items: &'a [T],
) -> Option<(&'a T, f64)> {
    let mut best: Option<(&'a T, f64)> = None;
    for item in items {
        let Some(at) = item.coordinates() else {
            continue;
        };
        let total = distance_km(first, at) + distance_km(second, at);
        match best {
            Some((_, current)) if current <= total => {}
            _ => best = Some((item, total)),
        }
    }
    best
}
