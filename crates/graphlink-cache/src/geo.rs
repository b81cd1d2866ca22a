//! Geographic distance between coordinate pairs.
//!
//! Distances are reported in kilometres. The formula is a pluggable
//! strategy; every strategy satisfies `d(a, b) == d(b, a)` and
//! `d(a, a) == 0`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees north (-90 to 90).
    pub lat: f64,
    /// Longitude in degrees east (-180 to 180).
    pub lon: f64,
}

impl GeoPoint {
    /// Create a point from degrees.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Extract a point from a stored location value.
    ///
    /// Expects an object with a two-element `coordinates` array ordered
    /// latitude first. Returns `None` for anything else.
    #[must_use]
    pub fn from_location(value: &Value) -> Option<Self> {
        let coordinates = value.get("coordinates")?.as_array()?;
        let lat = coordinates.first()?.as_f64()?;
        let lon = coordinates.get(1)?.as_f64()?;
        Some(Self::new(lat, lon))
    }
}

/// Distance formula strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceModel {
    /// Great-circle distance on a spherical Earth.
    #[default]
    Haversine,
    /// Equirectangular planar approximation, adequate for short ranges.
    Equirectangular,
}

impl DistanceModel {
    /// Distance between two points in kilometres.
    #[must_use]
    pub fn distance_km(self, a: GeoPoint, b: GeoPoint) -> f64 {
        match self {
            Self::Haversine => haversine_km(a, b),
            Self::Equirectangular => equirectangular_km(a, b),
        }
    }

    /// Distance between two optional endpoints.
    ///
    /// Returns `None` when either endpoint is absent; absence is a sentinel,
    /// never zero and never an error.
    #[must_use]
    pub fn between(self, a: Option<GeoPoint>, b: Option<GeoPoint>) -> Option<f64> {
        Some(self.distance_km(a?, b?))
    }
}

fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let half = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * half.sqrt().asin()
}

fn equirectangular_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let x = (b.lon - a.lon).to_radians() * mean_lat.cos();
    let y = (b.lat - a.lat).to_radians();
    EARTH_RADIUS_KM * x.hypot(y)
}
