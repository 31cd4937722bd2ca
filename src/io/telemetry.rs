//! TCP listener for session control and location samples
//!
//! Line-delimited JSON over TCP, one request per line, one JSON response
//! per line. This is the dev/ops ingress wired into the binary; the
//! session control contract itself lives in the registry.
//!
//! Operations:
//!   {"op":"plan","traveler":"t1","source":{"lat":..,"lng":..},"destination":{..},"mode":"walking"}
//!   {"op":"sample","traveler":"t1","lat":..,"lng":..,"speed_kmh":..}
//!   {"op":"confirm_safe","traveler":"t1"}
//!   {"op":"end","traveler":"t1"}

use crate::domain::geo::Coordinate;
use crate::domain::route::TravelMode;
use crate::domain::session::{TrackSample, TravelerId};
use crate::services::optimizer::RouteOptimizer;
use crate::services::registry::SessionRegistry;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Telemetry listener configuration
#[derive(Debug, Clone)]
pub struct TelemetryListenerConfig {
    pub port: u16,
    pub enabled: bool,
}

impl Default for TelemetryListenerConfig {
    fn default() -> Self {
        Self { port: 25901, enabled: true }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ControlRequest {
    Plan {
        traveler: String,
        source: Coordinate,
        destination: Coordinate,
        #[serde(default)]
        mode: TravelMode,
    },
    Sample {
        traveler: String,
        lat: f64,
        lng: f64,
        #[serde(default)]
        speed_kmh: f64,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    ConfirmSafe {
        traveler: String,
    },
    End {
        traveler: String,
    },
}

/// Start the telemetry TCP listener
///
/// Accepts connections and processes control requests until shutdown.
pub async fn start_telemetry_listener(
    config: TelemetryListenerConfig,
    registry: Arc<SessionRegistry>,
    optimizer: Arc<RouteOptimizer>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        info!("telemetry_listener_disabled");
        return Ok(());
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(port = %config.port, "telemetry_listener_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("telemetry_listener_shutdown");
                    return Ok(());
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "telemetry_connection_accepted");
                        let registry = registry.clone();
                        let optimizer = optimizer.clone();
                        let conn_shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, registry, optimizer, conn_shutdown).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "telemetry_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    registry: Arc<SessionRegistry>,
    optimizer: Arc<RouteOptimizer>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => return, // connection closed
                    Err(e) => {
                        debug!(error = %e, "telemetry_read_failed");
                        return;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = handle_line(&line, &registry, &optimizer).await;
                let mut payload = response.to_string();
                payload.push('\n');
                if write_half.write_all(payload.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn handle_line(
    line: &str,
    registry: &SessionRegistry,
    optimizer: &RouteOptimizer,
) -> serde_json::Value {
    let request: ControlRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "telemetry_bad_request");
            return json!({"ok": false, "error": "bad_request", "detail": e.to_string()});
        }
    };

    match request {
        ControlRequest::Plan { traveler, source, destination, mode } => {
            match optimizer.select_safest_route(source, destination, mode).await {
                Ok(route) => {
                    let response = json!({
                        "ok": true,
                        "rid": route.rid.clone(),
                        "points": route.points.len(),
                        "total_travel_time": route.total_travel_time,
                        "total_safety_score": route.total_safety_score,
                        "confidence": route.confidence,
                    });
                    registry.start_session(TravelerId(traveler), route, mode).await;
                    response
                }
                Err(e) => json!({"ok": false, "error": "plan_failed", "detail": e.to_string()}),
            }
        }
        ControlRequest::Sample { traveler, lat, lng, speed_kmh, timestamp } => {
            let coordinate = match Coordinate::new(lat, lng) {
                Ok(coordinate) => coordinate,
                Err(e) => {
                    return json!({"ok": false, "error": "invalid_coordinate", "detail": e.to_string()});
                }
            };
            let sample = TrackSample {
                coordinate,
                speed_kmh: speed_kmh.max(0.0),
                timestamp: timestamp.unwrap_or_else(Utc::now),
            };
            match registry.submit_sample(&TravelerId(traveler), sample).await {
                Ok(Some(anomaly)) => json!({"ok": true, "anomaly": anomaly.kind.as_str()}),
                Ok(None) => json!({"ok": true}),
                Err(e) => json!({"ok": false, "error": "unknown_session", "detail": e.to_string()}),
            }
        }
        ControlRequest::ConfirmSafe { traveler } => {
            match registry.confirm_safe(&TravelerId(traveler)).await {
                Ok(()) => json!({"ok": true}),
                Err(e) => json!({"ok": false, "error": "unknown_session", "detail": e.to_string()}),
            }
        }
        ControlRequest::End { traveler } => {
            match registry.end_session(&TravelerId(traveler)).await {
                Ok(()) => json!({"ok": true}),
                Err(e) => json!({"ok": false, "error": "unknown_session", "detail": e.to_string()}),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::OptimizerConfig;
    use crate::infra::{Config, Metrics};
    use crate::io::dispatch::create_dispatch_channel;
    use crate::io::provider::SyntheticRouteProvider;
    use crate::io::scorer::StaticScorer;

    fn harness() -> (
        Arc<SessionRegistry>,
        Arc<RouteOptimizer>,
        tokio::sync::mpsc::Receiver<crate::io::dispatch::AlertMessage>,
    ) {
        let metrics = Arc::new(Metrics::new());
        let (dispatch, rx) = create_dispatch_channel(256, "test".to_string(), metrics.clone());

        let optimizer = Arc::new(RouteOptimizer::new(
            Arc::new(SyntheticRouteProvider::new()),
            Arc::new(StaticScorer::new(80.0)),
            OptimizerConfig::default(),
            metrics.clone(),
        ));
        let registry = Arc::new(SessionRegistry::new(
            &Config::default(),
            Arc::new(StaticScorer::new(80.0)),
            None,
            dispatch,
            metrics,
        ));
        (registry, optimizer, rx)
    }

    #[tokio::test]
    async fn test_plan_then_sample_roundtrip() {
        let (registry, optimizer, _rx) = harness();

        let response = handle_line(
            r#"{"op":"plan","traveler":"t1","source":{"lat":28.6139,"lng":77.2090},"destination":{"lat":28.6169,"lng":77.2120},"mode":"walking"}"#,
            &registry,
            &optimizer,
        )
        .await;
        assert_eq!(response["ok"], true);
        assert!(response["rid"].is_string());
        assert_eq!(registry.active_count(), 1);

        let response = handle_line(
            r#"{"op":"sample","traveler":"t1","lat":28.6139,"lng":77.2090,"speed_kmh":4.0}"#,
            &registry,
            &optimizer,
        )
        .await;
        assert_eq!(response["ok"], true);
        assert!(response.get("anomaly").is_none());

        // 300 m off the straight-line route
        let response = handle_line(
            r#"{"op":"sample","traveler":"t1","lat":28.6166,"lng":77.2010,"speed_kmh":4.0}"#,
            &registry,
            &optimizer,
        )
        .await;
        assert_eq!(response["ok"], true);
        assert_eq!(response["anomaly"], "route_deviation");

        let response =
            handle_line(r#"{"op":"end","traveler":"t1"}"#, &registry, &optimizer).await;
        assert_eq!(response["ok"], true);
    }

    #[tokio::test]
    async fn test_unknown_session_response() {
        let (registry, optimizer, _rx) = harness();

        let response = handle_line(
            r#"{"op":"sample","traveler":"nobody","lat":28.6,"lng":77.2}"#,
            &registry,
            &optimizer,
        )
        .await;
        assert_eq!(response["ok"], false);
        assert_eq!(response["error"], "unknown_session");
    }

    #[tokio::test]
    async fn test_invalid_coordinate_rejected_at_boundary() {
        let (registry, optimizer, _rx) = harness();

        let response = handle_line(
            r#"{"op":"sample","traveler":"t1","lat":95.0,"lng":77.2}"#,
            &registry,
            &optimizer,
        )
        .await;
        assert_eq!(response["ok"], false);
        assert_eq!(response["error"], "invalid_coordinate");
    }

    #[tokio::test]
    async fn test_malformed_line_rejected() {
        let (registry, optimizer, _rx) = harness();

        let response = handle_line("not json", &registry, &optimizer).await;
        assert_eq!(response["ok"], false);
        assert_eq!(response["error"], "bad_request");
    }
}
