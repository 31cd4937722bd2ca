//! Great-circle geometry primitives
//!
//! Pure functions over validated coordinates. Geometry never fails for
//! coordinates that passed validation; invalid values are rejected at
//! construction (and at deserialization) instead of deep in detector logic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Coordinate outside the valid lat/lng ranges
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("invalid coordinate lat={lat} lng={lng}")]
pub struct InvalidCoordinateError {
    pub lat: f64,
    pub lng: f64,
}

/// A validated geographic coordinate (WGS84 degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

/// Unvalidated wire shape, converted via `TryFrom` so serde input
/// passes through the same range checks as `Coordinate::new`.
#[derive(Debug, Deserialize)]
struct RawCoordinate {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = InvalidCoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.lat, raw.lng)
    }
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range values.
    pub fn new(lat: f64, lng: f64) -> Result<Self, InvalidCoordinateError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) || lat.is_nan() || lng.is_nan() {
            return Err(InvalidCoordinateError { lat, lng });
        }
        Ok(Self { lat, lng })
    }

    #[inline]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    #[inline]
    pub fn lng(&self) -> f64 {
        self.lng
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6},{:.6})", self.lat, self.lng)
    }
}

/// Haversine great-circle distance between two coordinates, in meters.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing from `a` to `b` in degrees, normalized to `[0, 360)`.
pub fn bearing_deg(a: Coordinate, b: Coordinate) -> f64 {
    let dlng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Absolute difference between two bearings, normalized to `[0, 180]`.
pub fn bearing_delta_deg(b1: f64, b2: f64) -> f64 {
    let delta = (b2 - b1).abs();
    if delta > 180.0 {
        360.0 - delta
    } else {
        delta
    }
}

/// Minimum pairwise distance from `point` to a polyline given by `path`.
///
/// Point counts are small (tens to low hundreds), so a linear scan is
/// sufficient; no spatial index. Returns `None` for an empty path.
pub fn min_distance_to_path_m(point: Coordinate, path: &[Coordinate]) -> Option<f64> {
    path.iter().map(|&p| haversine_m(point, p)).min_by(|a, b| a.total_cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(28.6139, 77.2090).is_ok());
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert!(Coordinate::new(90.1, 0.0).is_err());
        assert!(Coordinate::new(-91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, 180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_coordinate_deserialize_validates() {
        let ok: Result<Coordinate, _> = serde_json::from_str(r#"{"lat":28.6,"lng":77.2}"#);
        assert!(ok.is_ok());

        let bad: Result<Coordinate, _> = serde_json::from_str(r#"{"lat":95.0,"lng":77.2}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = coord(28.6139, 77.2090);
        let b = coord(28.6169, 77.2120);

        assert_eq!(haversine_m(a, b), haversine_m(b, a));
        assert_eq!(haversine_m(a, a), 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is ~111.2 km on the sphere
        let a = coord(0.0, 0.0);
        let b = coord(1.0, 0.0);

        let d = haversine_m(a, b);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn test_bearing_bounded() {
        let pairs = [
            (coord(0.0, 0.0), coord(1.0, 0.0)),
            (coord(0.0, 0.0), coord(-1.0, 0.0)),
            (coord(0.0, 0.0), coord(0.0, 1.0)),
            (coord(0.0, 0.0), coord(0.0, -1.0)),
            (coord(28.6139, 77.2090), coord(28.6169, 77.2120)),
        ];

        for (a, b) in pairs {
            let bearing = bearing_deg(a, b);
            assert!((0.0..360.0).contains(&bearing), "bearing {bearing} out of range");
        }
    }

    #[test]
    fn test_bearing_cardinal() {
        let origin = coord(0.0, 0.0);

        assert!(bearing_deg(origin, coord(1.0, 0.0)).abs() < 1e-9); // north
        assert!((bearing_deg(origin, coord(0.0, 1.0)) - 90.0).abs() < 1e-9); // east
        assert!((bearing_deg(origin, coord(-1.0, 0.0)) - 180.0).abs() < 1e-9); // south
        assert!((bearing_deg(origin, coord(0.0, -1.0)) - 270.0).abs() < 1e-9); // west
    }

    #[test]
    fn test_bearing_delta_normalized() {
        assert_eq!(bearing_delta_deg(10.0, 100.0), 90.0);
        assert_eq!(bearing_delta_deg(350.0, 10.0), 20.0);
        assert_eq!(bearing_delta_deg(0.0, 180.0), 180.0);
        assert_eq!(bearing_delta_deg(90.0, 90.0), 0.0);
    }

    #[test]
    fn test_min_distance_to_path() {
        let path = [coord(28.6139, 77.2090), coord(28.6149, 77.2100), coord(28.6159, 77.2110)];

        // Exactly on a route point
        assert_eq!(min_distance_to_path_m(path[1], &path), Some(0.0));

        // Empty path
        assert_eq!(min_distance_to_path_m(path[0], &[]), None);

        // Off-path point picks the nearest vertex
        let off = coord(28.6150, 77.2101);
        let d = min_distance_to_path_m(off, &path).unwrap();
        assert!(d > 0.0 && d < 20.0, "got {d}");
    }
}
