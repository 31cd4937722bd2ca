//! Per-session anomaly detection and alert phase driving
//!
//! One monitor exclusively owns one traveler's `Session`. Every sample
//! runs all three detectors (state stays consistent even when an earlier
//! detector fires); at most the first anomaly in priority order is
//! reported per call. Detected anomalies, grace expiry and confirmations
//! drive the phase machine, emitting phase-change events to the
//! dispatcher.

use crate::domain::geo::{self, Coordinate};
use crate::domain::route::PlannedRoute;
use crate::domain::session::{
    AlertPhase, AnomalyEvent, AnomalyKind, PhaseChangeEvent, Session, TrackSample, TravelerId,
};
use crate::infra::config::MonitorConfig;
use crate::infra::Metrics;
use crate::io::dispatch::DispatchSender;
use crate::io::scorer::{SafetyScorer, NEUTRAL_SCORE};
use crate::services::escalation::EscalationPolicy;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct GeofenceMonitor {
    session: Session,
    scorer: Arc<dyn SafetyScorer>,
    policy: EscalationPolicy,
    config: MonitorConfig,
    dispatch: DispatchSender,
    metrics: Arc<Metrics>,
    /// When the current grace window elapses; None outside soft-check
    /// and escalation
    grace_deadline: Option<Instant>,
}

impl GeofenceMonitor {
    pub fn new(
        traveler: TravelerId,
        planned_route: PlannedRoute,
        scorer: Arc<dyn SafetyScorer>,
        policy: EscalationPolicy,
        config: MonitorConfig,
        dispatch: DispatchSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            session: Session::new(traveler, planned_route),
            scorer,
            policy,
            config,
            dispatch,
            metrics,
            grace_deadline: None,
        }
    }

    /// Process one location sample.
    ///
    /// Mutates the session's sliding window and stop tracker, runs the
    /// detectors in priority order, and returns at most one anomaly.
    pub async fn observe(&mut self, sample: TrackSample) -> Option<AnomalyEvent> {
        let stopped_unsafe = self.detect_stopped_unsafe(&sample).await;

        let deviation_m = self.session.planned_route.distance_from_path_m(sample.coordinate);
        let deviated = deviation_m > self.config.deviation_threshold_m;

        self.session.push_sample(sample);
        let erratic = self.detect_erratic();

        let kind = if stopped_unsafe {
            Some(AnomalyKind::StoppedUnsafe)
        } else if deviated {
            Some(AnomalyKind::RouteDeviation)
        } else if erratic {
            Some(AnomalyKind::ErraticMovement)
        } else {
            None
        };

        let event = kind.map(|kind| AnomalyEvent {
            traveler: self.session.traveler.clone(),
            kind,
            coordinate: sample.coordinate,
            timestamp: sample.timestamp,
        });

        if let Some(ref event) = event {
            info!(
                traveler = %event.traveler,
                kind = %event.kind.as_str(),
                coordinate = %event.coordinate,
                deviation_m = %format!("{deviation_m:.0}"),
                phase = %self.session.phase.as_str(),
                "anomaly_detected"
            );
            self.metrics.record_anomaly(event.kind);
            self.dispatch.send_anomaly(event);

            if let Some(next) = self.policy.on_anomaly(self.session.phase, event.kind) {
                self.transition(next, Some(event.kind), event.timestamp);
            }
        }

        event
    }

    /// Stop tracker plus unsafe-area check.
    ///
    /// The scorer is only consulted once the stop has outlasted the
    /// window; a scorer failure degrades to the neutral score (no fire).
    async fn detect_stopped_unsafe(&mut self, sample: &TrackSample) -> bool {
        self.session.track_stop(sample, self.config.stop_speed_kmh);

        let Some(since) = self.session.stopped_since else {
            return false;
        };

        let stop_window = ChronoDuration::seconds(self.config.stop_window_secs as i64);
        if sample.timestamp - since <= stop_window {
            return false;
        }

        let score = match self.scorer.score(sample.coordinate, sample.timestamp).await {
            Ok(score) => score,
            Err(e) => {
                self.metrics.record_scorer_fallback();
                debug!(coordinate = %sample.coordinate, error = %e, "stop_score_fallback");
                NEUTRAL_SCORE
            }
        };

        score < self.config.unsafe_score
    }

    /// Count sharp direction changes across the sample window.
    ///
    /// Needs at least three samples (two bearings); fires when more than
    /// two consecutive-bearing deltas exceed the turn threshold.
    fn detect_erratic(&self) -> bool {
        let samples = &self.session.recent_samples;
        if samples.len() < 3 {
            return false;
        }

        let bearings: Vec<f64> = samples
            .windows(2)
            .map(|pair| geo::bearing_deg(pair[0].coordinate, pair[1].coordinate))
            .collect();

        let sharp_turns = bearings
            .windows(2)
            .filter(|pair| geo::bearing_delta_deg(pair[0], pair[1]) > self.config.erratic_turn_deg)
            .count();

        sharp_turns > 2
    }

    /// Advance the phase machine after a grace window elapsed without
    /// confirmation.
    pub fn grace_expired(&mut self) {
        if let Some(next) = self.policy.on_grace_expired(self.session.phase) {
            warn!(
                traveler = %self.session.traveler,
                from = %self.session.phase.as_str(),
                to = %next.as_str(),
                "grace_window_expired"
            );
            self.transition(next, None, Utc::now());
        } else {
            self.grace_deadline = None;
        }
    }

    /// Explicit confirmation-of-safety: reset to normal from any phase
    /// and clear detector history.
    pub fn confirm_safe(&mut self) {
        self.metrics.record_confirmation();

        if let Some(next) = self.policy.on_confirm_safe(self.session.phase) {
            self.transition(next, None, Utc::now());
        }
        self.session.clear_history();
        self.grace_deadline = None;

        info!(traveler = %self.session.traveler, "traveler_confirmed_safe");
    }

    /// Install a re-planned route, replacing the old one wholesale.
    pub fn replace_route(&mut self, route: PlannedRoute) {
        info!(
            traveler = %self.session.traveler,
            old_rid = %self.session.planned_route.rid,
            new_rid = %route.rid,
            confidence = %format!("{:.2}", route.confidence),
            "route_replaced"
        );
        self.metrics.record_replan();
        self.dispatch.send_session_event(
            &self.session.traveler,
            "route_replanned",
            Some(&route.rid),
            Some(route.confidence),
        );
        self.session.planned_route = route;
    }

    fn transition(&mut self, to: AlertPhase, trigger: Option<AnomalyKind>, at: DateTime<Utc>) {
        let from = self.session.phase;
        self.session.enter_phase(to, at);
        self.grace_deadline = self.policy.grace_for(to).map(|grace| Instant::now() + grace);

        self.metrics.record_phase_change(to == AlertPhase::Emergency);
        self.dispatch.send_phase_change(&PhaseChangeEvent {
            traveler: self.session.traveler.clone(),
            from,
            to,
            trigger,
            timestamp: at,
        });

        info!(
            traveler = %self.session.traveler,
            from = %from.as_str(),
            to = %to.as_str(),
            trigger = %trigger.map(|k| k.as_str()).unwrap_or("-"),
            "phase_change"
        );
    }

    pub fn phase(&self) -> AlertPhase {
        self.session.phase
    }

    pub fn grace_deadline(&self) -> Option<Instant> {
        self.grace_deadline
    }

    pub fn traveler(&self) -> &TravelerId {
        &self.session.traveler
    }

    pub fn last_coordinate(&self) -> Option<Coordinate> {
        self.session.last_coordinate()
    }

    pub fn destination(&self) -> Coordinate {
        self.session.planned_route.destination()
    }

    pub fn route_id(&self) -> &str {
        &self.session.planned_route.rid
    }

    #[cfg(test)]
    pub fn session(&self) -> &Session {
        &self.session
    }
}
