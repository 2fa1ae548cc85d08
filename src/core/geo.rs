//! Spherical geometry for the geospatial tour routes
//!
//! Points in URLs are written `lat,lng`; stored GeoJSON points keep
//! `[lng, lat]`. Distances use a spherical Earth, which is what a
//! `2dsphere` index does too.

use crate::core::error::ValidationError;
use serde_json::Value;
use std::str::FromStr;

/// Earth radius used to turn a distance in miles into radians
pub const EARTH_RADIUS_MI: f64 = 3963.2;
/// Earth radius used to turn a distance in kilometres into radians
pub const EARTH_RADIUS_KM: f64 = 6378.1;
/// Earth radius in metres for distance calculations
pub const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

const LATLNG_FORMAT: &str = "Please provide latitude and longitude in the format lat,lng.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Miles,
    Kilometers,
}

impl DistanceUnit {
    /// Radius of the Earth in this unit
    pub fn earth_radius(&self) -> f64 {
        match self {
            DistanceUnit::Miles => EARTH_RADIUS_MI,
            DistanceUnit::Kilometers => EARTH_RADIUS_KM,
        }
    }

    /// Factor converting metres into this unit
    pub fn from_meters(&self) -> f64 {
        match self {
            DistanceUnit::Miles => 0.000621371,
            DistanceUnit::Kilometers => 0.001,
        }
    }
}

impl FromStr for DistanceUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mi" => Ok(DistanceUnit::Miles),
            "km" => Ok(DistanceUnit::Kilometers),
            other => Err(ValidationError::param(
                "unit",
                format!("Invalid unit: {}. Please use mi or km.", other),
            )),
        }
    }
}

/// A point on the sphere, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Read the `[lng, lat]` coordinates of a stored GeoJSON point
    pub fn from_geojson(point: &Value) -> Option<Self> {
        let coordinates = point.get("coordinates")?.as_array()?;
        match coordinates.as_slice() {
            [lng, lat] => Some(Self {
                lat: lat.as_f64()?,
                lng: lng.as_f64()?,
            }),
            _ => None,
        }
    }

    /// Angle between two points, in radians (haversine)
    pub fn angle_to(&self, other: &LatLng) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lng = (other.lng - self.lng).to_radians();
        let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * h.sqrt().min(1.0).asin()
    }

    pub fn distance_meters(&self, other: &LatLng) -> f64 {
        self.angle_to(other) * EARTH_RADIUS_M
    }

    /// Whether `other` lies within `distance` (in `unit`) of this point
    pub fn within(&self, other: &LatLng, distance: f64, unit: DistanceUnit) -> bool {
        self.angle_to(other) <= distance / unit.earth_radius()
    }
}

impl FromStr for LatLng {
    type Err = ValidationError;

    /// Parse `lat,lng`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::param("latlng", LATLNG_FORMAT);
        let (lat, lng) = s.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(invalid());
        }
        Ok(Self { lat, lng })
    }
}
