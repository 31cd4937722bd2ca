//! Route data model for planning and selection

use crate::domain::geo::{self, Coordinate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Travel mode passed through to the route provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Walking,
    Driving,
    Transit,
}

impl Default for TravelMode {
    fn default() -> Self {
        TravelMode::Walking
    }
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Walking => "walking",
            TravelMode::Driving => "driving",
            TravelMode::Transit => "transit",
        }
    }
}

/// A single scored point on a planned route
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoutePoint {
    pub coordinate: Coordinate,
    /// Safety score in [0, 100]
    pub safety_score: f64,
}

/// An unscored route candidate as returned by the route provider.
///
/// Ephemeral - lives only during selection.
#[derive(Debug, Clone)]
pub struct RouteAlternative {
    pub points: Vec<Coordinate>,
    pub travel_time_minutes: f64,
}

/// The selected route handed to a tracking session.
///
/// Replaced wholesale on re-optimization, never mutated in place.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedRoute {
    /// UUIDv7 route ID
    pub rid: String,
    /// Scored points, non-empty
    pub points: Vec<RoutePoint>,
    /// Sum of per-point safety scores
    pub total_safety_score: f64,
    /// Provider travel-time estimate in minutes
    pub total_travel_time: f64,
    /// Confidence in [0, 1], derived from the score distribution
    pub confidence: f64,
}

impl PlannedRoute {
    /// Wrap a scored point sequence as a planned route.
    ///
    /// `points` must be non-empty; confidence is derived from the
    /// per-point score distribution (see [`confidence_from_scores`]).
    pub fn new(points: Vec<RoutePoint>, travel_time_minutes: f64) -> Self {
        debug_assert!(!points.is_empty());
        let total_safety_score: f64 = points.iter().map(|p| p.safety_score).sum();
        let scores: Vec<f64> = points.iter().map(|p| p.safety_score).collect();
        let confidence = confidence_from_scores(&scores);

        Self {
            rid: new_uuid_v7(),
            points,
            total_safety_score,
            total_travel_time: travel_time_minutes,
            confidence,
        }
    }

    /// Destination coordinate (last point of the route)
    pub fn destination(&self) -> Coordinate {
        self.points.last().expect("planned route has points").coordinate
    }

    /// Minimum great-circle distance from `c` to the route polyline, meters
    pub fn distance_from_path_m(&self, c: Coordinate) -> f64 {
        self.points
            .iter()
            .map(|p| geo::haversine_m(c, p.coordinate))
            .min_by(|a, b| a.total_cmp(b))
            .expect("planned route has points")
    }

    /// Mean per-point safety score
    pub fn mean_safety_score(&self) -> f64 {
        self.total_safety_score / self.points.len() as f64
    }
}

/// Confidence from the score distribution of the winning alternative.
///
/// `consistency = max(0, 1 - std/50)` penalizes uneven routes,
/// `score_factor = mean/100` rewards high scores; the blend is clamped
/// to [0, 1]. Degenerate all-equal scores give consistency 1.
pub fn confidence_from_scores(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }

    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    let consistency = (1.0 - std / 50.0).max(0.0);
    let score_factor = mean / 100.0;

    ((consistency + score_factor) / 2.0).clamp(0.0, 1.0)
}
