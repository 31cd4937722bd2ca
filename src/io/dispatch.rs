//! Typed channel for alert egress messages
//!
//! The dispatcher boundary: anomaly, phase-change and session lifecycle
//! events flow through a bounded mpsc channel to whatever consumes them
//! (the JSONL alert log in this binary). Sends never block the detector
//! hot path; a full channel drops the message and bumps a counter.

use crate::domain::session::{AnomalyEvent, PhaseChangeEvent, TravelerId};
use crate::infra::Metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Get epoch milliseconds for a timestamp
#[inline]
fn epoch_ms(at: DateTime<Utc>) -> u64 {
    at.timestamp_millis().max(0) as u64
}

/// Messages delivered to the alert consumer
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertMessage {
    /// A detector fired
    Anomaly(AnomalyPayload),
    /// The alert state machine moved
    PhaseChange(PhaseChangePayload),
    /// Session lifecycle (started, ended, idle_timeout, route_replanned)
    Session(SessionEventPayload),
}

/// Payload for detector anomalies
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyPayload {
    /// Deployment identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub traveler: String,
    /// Anomaly kind (stopped_unsafe, route_deviation, erratic_movement)
    pub kind: String,
    pub lat: f64,
    pub lng: f64,
    /// Timestamp (epoch ms)
    pub ts: u64,
}

/// Payload for phase transitions
#[derive(Debug, Clone, Serialize)]
pub struct PhaseChangePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub traveler: String,
    pub from: String,
    pub to: String,
    /// Triggering anomaly kind, absent for grace expiry and confirmations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    pub ts: u64,
}

/// Payload for session lifecycle events
#[derive(Debug, Clone, Serialize)]
pub struct SessionEventPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub traveler: String,
    /// Event type: started, ended, idle_timeout, route_replanned
    pub t: String,
    /// Route ID involved (for started / route_replanned)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    /// Route confidence (for started / route_replanned)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub ts: u64,
}

/// Sender handle for alert messages
///
/// Clone this to share across sessions. Non-blocking - if the channel is
/// full, messages are dropped and counted.
#[derive(Clone)]
pub struct DispatchSender {
    tx: mpsc::Sender<AlertMessage>,
    service_id: String,
    metrics: Arc<Metrics>,
}

impl DispatchSender {
    pub fn new(tx: mpsc::Sender<AlertMessage>, service_id: String, metrics: Arc<Metrics>) -> Self {
        Self { tx, service_id, metrics }
    }

    fn push(&self, message: AlertMessage) {
        if self.tx.try_send(message).is_err() {
            self.metrics.record_alert_dropped();
        }
    }

    /// Send a detector anomaly
    pub fn send_anomaly(&self, event: &AnomalyEvent) {
        self.push(AlertMessage::Anomaly(AnomalyPayload {
            service: Some(self.service_id.clone()),
            traveler: event.traveler.0.clone(),
            kind: event.kind.as_str().to_string(),
            lat: event.coordinate.lat(),
            lng: event.coordinate.lng(),
            ts: epoch_ms(event.timestamp),
        }));
    }

    /// Send a phase transition
    pub fn send_phase_change(&self, event: &PhaseChangeEvent) {
        self.push(AlertMessage::PhaseChange(PhaseChangePayload {
            service: Some(self.service_id.clone()),
            traveler: event.traveler.0.clone(),
            from: event.from.as_str().to_string(),
            to: event.to.as_str().to_string(),
            trigger: event.trigger.map(|k| k.as_str().to_string()),
            ts: epoch_ms(event.timestamp),
        }));
    }

    /// Send a session lifecycle event
    pub fn send_session_event(
        &self,
        traveler: &TravelerId,
        event: &str,
        rid: Option<&str>,
        confidence: Option<f64>,
    ) {
        self.push(AlertMessage::Session(SessionEventPayload {
            service: Some(self.service_id.clone()),
            traveler: traveler.0.clone(),
            t: event.to_string(),
            rid: rid.map(|r| r.to_string()),
            confidence,
            ts: epoch_ms(Utc::now()),
        }));
    }
}

/// Create a new dispatch channel pair
///
/// Returns (sender, receiver) where the sender can be cloned and shared.
pub fn create_dispatch_channel(
    capacity: usize,
    service_id: String,
    metrics: Arc<Metrics>,
) -> (DispatchSender, mpsc::Receiver<AlertMessage>) {
    let (tx, rx) = mpsc::channel(capacity);
    (DispatchSender::new(tx, service_id, metrics), rx)
}
