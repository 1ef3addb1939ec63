//! Great-circle distance and geofence checks.

use db::models::class_session::{GeoFence, GeoPoint};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance in meters. Non-finite inputs count as `0.0`.
pub fn distance_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    distance(GeoPoint::new(lat1, lng1), GeoPoint::new(lat2, lng2))
}

pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points.
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}

pub fn is_within_radius(
    student_lat: f64,
    student_lng: f64,
    session_lat: f64,
    session_lng: f64,
    radius_meters: f64,
) -> bool {
    distance_meters(student_lat, student_lng, session_lat, session_lng) <= radius_meters
}

/// Outcome of testing a position against a fence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FenceCheck {
    pub distance_meters: f64,
    pub radius_meters: f64,
}

impl FenceCheck {
    #[inline]
    pub fn inside(&self) -> bool {
        self.distance_meters <= self.radius_meters
    }
}

pub fn check_fence(fence: &GeoFence, position: GeoPoint) -> FenceCheck {
    FenceCheck {
        distance_meters: distance(position, fence.center),
        radius_meters: fence.radius_meters,
    }
}
