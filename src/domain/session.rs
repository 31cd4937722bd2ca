//! Traveler session state and the events it emits
//!
//! A `Session` is exclusively owned and mutated by its monitor; there is
//! at most one live session per traveler. Stop detection runs on sample
//! timestamps (telemetry time) so replayed feeds behave deterministically.

use crate::domain::geo::Coordinate;
use crate::domain::route::{new_uuid_v7, PlannedRoute};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Sliding window of samples kept for pattern detection
pub const MAX_RECENT_SAMPLES: usize = 5;

/// Newtype wrapper for traveler IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TravelerId(pub String);

impl std::fmt::Display for TravelerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TravelerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single location telemetry sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSample {
    pub coordinate: Coordinate,
    pub speed_kmh: f64,
    pub timestamp: DateTime<Utc>,
}

/// Escalation phase of the alert state machine.
///
/// Ordered by severity; automatic progression is strictly monotonic and
/// only an explicit confirmation-of-safety returns a session to `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPhase {
    Normal,
    SoftCheck,
    Escalation,
    Emergency,
}

impl AlertPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertPhase::Normal => "normal",
            AlertPhase::SoftCheck => "soft_check",
            AlertPhase::Escalation => "escalation",
            AlertPhase::Emergency => "emergency",
        }
    }
}

/// Classification of a detected behavioral or positional irregularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    StoppedUnsafe,
    RouteDeviation,
    ErraticMovement,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::StoppedUnsafe => "stopped_unsafe",
            AnomalyKind::RouteDeviation => "route_deviation",
            AnomalyKind::ErraticMovement => "erratic_movement",
        }
    }
}

/// An anomaly raised by one of the detectors
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyEvent {
    pub traveler: TravelerId,
    pub kind: AnomalyKind,
    pub coordinate: Coordinate,
    pub timestamp: DateTime<Utc>,
}

/// A phase transition of the alert state machine
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseChangeEvent {
    pub traveler: TravelerId,
    pub from: AlertPhase,
    pub to: AlertPhase,
    /// The anomaly that caused the transition; `None` for grace-window
    /// expiry and confirmation resets.
    pub trigger: Option<AnomalyKind>,
    pub timestamp: DateTime<Utc>,
}

/// Live tracking state for one traveler
#[derive(Debug, Clone)]
pub struct Session {
    /// UUIDv7 session ID
    pub sid: String,
    pub traveler: TravelerId,
    /// Owned route; replaced wholesale on re-optimization
    pub planned_route: PlannedRoute,
    /// Last samples, oldest first, capped at `MAX_RECENT_SAMPLES`
    pub recent_samples: SmallVec<[TrackSample; MAX_RECENT_SAMPLES]>,
    /// Set the instant speed first drops below the stop threshold,
    /// cleared the instant it rises back
    pub stopped_since: Option<DateTime<Utc>>,
    pub phase: AlertPhase,
    pub phase_entered_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub samples_seen: u64,
}

impl Session {
    pub fn new(traveler: TravelerId, planned_route: PlannedRoute) -> Self {
        let now = Utc::now();
        Self {
            sid: new_uuid_v7(),
            traveler,
            planned_route,
            recent_samples: SmallVec::new(),
            stopped_since: None,
            phase: AlertPhase::Normal,
            phase_entered_at: now,
            started_at: now,
            samples_seen: 0,
        }
    }

    /// Append a sample to the sliding window, evicting the oldest
    pub fn push_sample(&mut self, sample: TrackSample) {
        if self.recent_samples.len() == MAX_RECENT_SAMPLES {
            self.recent_samples.remove(0);
        }
        self.recent_samples.push(sample);
        self.samples_seen += 1;
    }

    /// Update the stop tracker from a sample's speed
    pub fn track_stop(&mut self, sample: &TrackSample, stop_speed_kmh: f64) {
        if sample.speed_kmh < stop_speed_kmh {
            if self.stopped_since.is_none() {
                self.stopped_since = Some(sample.timestamp);
            }
        } else {
            self.stopped_since = None;
        }
    }

    /// Enter a new phase, recording when
    pub fn enter_phase(&mut self, phase: AlertPhase, at: DateTime<Utc>) {
        self.phase = phase;
        self.phase_entered_at = at;
    }

    /// Clear detector state on confirmation-of-safety
    pub fn clear_history(&mut self) {
        self.recent_samples.clear();
        self.stopped_since = None;
    }

    /// Coordinate of the most recent sample, if any
    pub fn last_coordinate(&self) -> Option<Coordinate> {
        self.recent_samples.last().map(|s| s.coordinate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::route::RoutePoint;
    use chrono::Duration;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    fn test_route() -> PlannedRoute {
        PlannedRoute::new(
            vec![
                RoutePoint { coordinate: coord(28.6139, 77.2090), safety_score: 80.0 },
                RoutePoint { coordinate: coord(28.6169, 77.2120), safety_score: 80.0 },
            ],
            20.0,
        )
    }

    fn sample_at(ts: DateTime<Utc>, speed: f64) -> TrackSample {
        TrackSample { coordinate: coord(28.6139, 77.2090), speed_kmh: speed, timestamp: ts }
    }

    #[test]
    fn test_new_session() {
        let session = Session::new(TravelerId::from("t1"), test_route());

        assert!(!session.sid.is_empty());
        assert_eq!(session.phase, AlertPhase::Normal);
        assert!(session.recent_samples.is_empty());
        assert!(session.stopped_since.is_none());
        assert_eq!(session.samples_seen, 0);
    }

    #[test]
    fn test_push_sample_caps_window() {
        let mut session = Session::new(TravelerId::from("t1"), test_route());
        let t0 = Utc::now();

        for i in 0..7 {
            session.push_sample(sample_at(t0 + Duration::seconds(i), 5.0));
        }

        assert_eq!(session.recent_samples.len(), MAX_RECENT_SAMPLES);
        assert_eq!(session.samples_seen, 7);
        // Oldest evicted: window starts at the third sample
        assert_eq!(session.recent_samples[0].timestamp, t0 + Duration::seconds(2));
    }

    #[test]
    fn test_track_stop_sets_and_clears() {
        let mut session = Session::new(TravelerId::from("t1"), test_route());
        let t0 = Utc::now();

        session.track_stop(&sample_at(t0, 0.5), 1.0);
        assert_eq!(session.stopped_since, Some(t0));

        // Still stopped: keeps the original timestamp
        session.track_stop(&sample_at(t0 + Duration::seconds(30), 0.2), 1.0);
        assert_eq!(session.stopped_since, Some(t0));

        // A single fast sample clears the stop tracker
        session.track_stop(&sample_at(t0 + Duration::seconds(60), 2.0), 1.0);
        assert!(session.stopped_since.is_none());

        // Exactly at the threshold counts as moving
        session.track_stop(&sample_at(t0 + Duration::seconds(90), 1.0), 1.0);
        assert!(session.stopped_since.is_none());
    }

    #[test]
    fn test_clear_history() {
        let mut session = Session::new(TravelerId::from("t1"), test_route());
        let t0 = Utc::now();

        session.push_sample(sample_at(t0, 0.0));
        session.track_stop(&sample_at(t0, 0.0), 1.0);
        session.clear_history();

        assert!(session.recent_samples.is_empty());
        assert!(session.stopped_since.is_none());
    }

    #[test]
    fn test_phase_severity_order() {
        assert!(AlertPhase::Normal < AlertPhase::SoftCheck);
        assert!(AlertPhase::SoftCheck < AlertPhase::Escalation);
        assert!(AlertPhase::Escalation < AlertPhase::Emergency);
    }

    #[test]
    fn test_kind_as_str() {
        assert_eq!(AnomalyKind::StoppedUnsafe.as_str(), "stopped_unsafe");
        assert_eq!(AnomalyKind::RouteDeviation.as_str(), "route_deviation");
        assert_eq!(AnomalyKind::ErraticMovement.as_str(), "erratic_movement");
    }
}
