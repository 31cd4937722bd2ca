//! End-to-end session flow: plan, track, escalate, confirm, tear down

use chrono::{Duration as ChronoDuration, Utc};
use saferoute::domain::geo::Coordinate;
use saferoute::domain::route::TravelMode;
use saferoute::domain::session::{AnomalyKind, TrackSample, TravelerId};
use saferoute::infra::{Config, Metrics};
use saferoute::io::dispatch::AlertMessage;
use saferoute::io::scorer::ScoredZone;
use saferoute::io::{create_dispatch_channel, StaticScorer, SyntheticRouteProvider};
use saferoute::services::{RouteOptimizer, SessionError, SessionRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;

const SOURCE: (f64, f64) = (28.6139, 77.2090);
const DESTINATION: (f64, f64) = (28.6169, 77.2120);

/// One degree of latitude on the haversine sphere, meters
const METERS_PER_DEG_LAT: f64 = 111_194.93;

fn coord(lat: f64, lng: f64) -> Coordinate {
    Coordinate::new(lat, lng).unwrap()
}

struct Harness {
    registry: SessionRegistry,
    optimizer: Arc<RouteOptimizer>,
    alerts: mpsc::Receiver<AlertMessage>,
    metrics: Arc<Metrics>,
}

fn harness(scorer: StaticScorer) -> Harness {
    let metrics = Arc::new(Metrics::new());
    let (dispatch, alerts) = create_dispatch_channel(512, "test".to_string(), metrics.clone());
    let scorer = Arc::new(scorer);

    let optimizer = Arc::new(RouteOptimizer::new(
        Arc::new(SyntheticRouteProvider::new()),
        scorer.clone(),
        Config::default().optimizer().clone(),
        metrics.clone(),
    ));
    let registry = SessionRegistry::new(
        &Config::default(),
        scorer,
        Some(optimizer.clone()),
        dispatch,
        metrics.clone(),
    );

    Harness { registry, optimizer, alerts, metrics }
}

fn drain(rx: &mut mpsc::Receiver<AlertMessage>) -> Vec<String> {
    let mut seen = Vec::new();
    while let Ok(message) = rx.try_recv() {
        seen.push(match message {
            AlertMessage::Anomaly(a) => format!("anomaly:{}", a.kind),
            AlertMessage::PhaseChange(p) => format!("phase:{}->{}", p.from, p.to),
            AlertMessage::Session(s) => format!("session:{}", s.t),
        });
    }
    seen
}

#[tokio::test]
async fn full_escalation_and_recovery_flow() {
    // Unsafe zone 350 m west of the corridor midpoint
    let off_lng = 77.2105 - 350.0 / (METERS_PER_DEG_LAT * 0.878);
    let unsafe_spot = coord(28.6154, off_lng);
    let mut h = harness(
        StaticScorer::new(80.0).with_zone(ScoredZone {
            center: unsafe_spot,
            radius_m: 150.0,
            score: 20.0,
        }),
    );

    // Plan the route through the optimizer, as the control surface does
    let route = h
        .optimizer
        .select_safest_route(
            coord(SOURCE.0, SOURCE.1),
            coord(DESTINATION.0, DESTINATION.1),
            TravelMode::Walking,
        )
        .await
        .unwrap();
    assert!(!route.points.is_empty());
    assert!((0.0..=1.0).contains(&route.confidence));

    let traveler = TravelerId::from("walker-1");
    h.registry.start_session(traveler.clone(), route, TravelMode::Walking).await;

    let departure = Utc::now();
    let at = |secs: i64| departure + ChronoDuration::seconds(secs);

    // On the corridor: quiet
    let anomaly = h
        .registry
        .submit_sample(
            &traveler,
            TrackSample { coordinate: coord(SOURCE.0, SOURCE.1), speed_kmh: 4.5, timestamp: at(0) },
        )
        .await
        .unwrap();
    assert!(anomaly.is_none());

    // Wanders into the unsafe zone: deviation, soft check opens
    let anomaly = h
        .registry
        .submit_sample(
            &traveler,
            TrackSample { coordinate: unsafe_spot, speed_kmh: 3.0, timestamp: at(60) },
        )
        .await
        .unwrap();
    assert_eq!(anomaly.unwrap().kind, AnomalyKind::RouteDeviation);

    // Still deviating: escalation
    let anomaly = h
        .registry
        .submit_sample(
            &traveler,
            TrackSample { coordinate: unsafe_spot, speed_kmh: 0.5, timestamp: at(120) },
        )
        .await
        .unwrap();
    assert_eq!(anomaly.unwrap().kind, AnomalyKind::RouteDeviation);

    // Stopped in the unsafe zone past the five-minute window: emergency
    let anomaly = h
        .registry
        .submit_sample(
            &traveler,
            TrackSample { coordinate: unsafe_spot, speed_kmh: 0.0, timestamp: at(120 + 301) },
        )
        .await
        .unwrap();
    assert_eq!(anomaly.unwrap().kind, AnomalyKind::StoppedUnsafe);

    // Traveler checks in: back to normal from emergency
    h.registry.confirm_safe(&traveler).await.unwrap();
    h.registry.end_session(&traveler).await.unwrap();

    let seen = drain(&mut h.alerts);
    let expected = [
        "session:started",
        "anomaly:route_deviation",
        "phase:normal->soft_check",
        "phase:soft_check->escalation",
        "anomaly:stopped_unsafe",
        "phase:escalation->emergency",
        "phase:emergency->normal",
        "session:ended",
    ];
    for needle in expected {
        assert!(seen.iter().any(|s| s == needle), "missing {needle} in {seen:?}");
    }

    let summary = h.metrics.report(0);
    assert_eq!(summary.sessions_started_total, 1);
    assert_eq!(summary.sessions_ended_total, 1);
    assert_eq!(summary.emergencies_total, 1);
    assert_eq!(summary.confirmations_total, 1);
    assert!(summary.samples_total >= 4);
}

#[tokio::test]
async fn unknown_traveler_is_rejected_per_call() {
    let h = harness(StaticScorer::new(80.0));
    let ghost = TravelerId::from("ghost");

    let sample = TrackSample {
        coordinate: coord(SOURCE.0, SOURCE.1),
        speed_kmh: 4.0,
        timestamp: Utc::now(),
    };
    assert!(matches!(
        h.registry.submit_sample(&ghost, sample).await,
        Err(SessionError::UnknownSession(_))
    ));
    assert!(matches!(
        h.registry.confirm_safe(&ghost).await,
        Err(SessionError::UnknownSession(_))
    ));
    assert!(matches!(
        h.registry.end_session(&ghost).await,
        Err(SessionError::UnknownSession(_))
    ));
}

#[tokio::test]
async fn sessions_are_independent_across_travelers() {
    let mut h = harness(StaticScorer::new(80.0));

    let route = h
        .optimizer
        .select_safest_route(
            coord(SOURCE.0, SOURCE.1),
            coord(DESTINATION.0, DESTINATION.1),
            TravelMode::Walking,
        )
        .await
        .unwrap();

    let alice = TravelerId::from("alice");
    let bob = TravelerId::from("bob");
    h.registry.start_session(alice.clone(), route.clone(), TravelMode::Walking).await;
    h.registry.start_session(bob.clone(), route, TravelMode::Walking).await;
    assert_eq!(h.registry.active_count(), 2);

    // Alice deviates; Bob stays on the corridor
    let off_lat = SOURCE.0 + 400.0 / METERS_PER_DEG_LAT;
    let anomaly = h
        .registry
        .submit_sample(
            &alice,
            TrackSample {
                coordinate: coord(off_lat, SOURCE.1),
                speed_kmh: 4.0,
                timestamp: Utc::now(),
            },
        )
        .await
        .unwrap();
    assert!(anomaly.is_some());

    let anomaly = h
        .registry
        .submit_sample(
            &bob,
            TrackSample {
                coordinate: coord(SOURCE.0, SOURCE.1),
                speed_kmh: 4.0,
                timestamp: Utc::now(),
            },
        )
        .await
        .unwrap();
    assert!(anomaly.is_none(), "bob inherited alice's state");

    h.registry.end_session(&alice).await.unwrap();

    // Bob's session survives Alice's teardown
    let anomaly = h
        .registry
        .submit_sample(
            &bob,
            TrackSample {
                coordinate: coord(SOURCE.0, SOURCE.1),
                speed_kmh: 4.0,
                timestamp: Utc::now(),
            },
        )
        .await
        .unwrap();
    assert!(anomaly.is_none());
    h.registry.end_session(&bob).await.unwrap();

    drain(&mut h.alerts);
}

#[tokio::test]
async fn erratic_zigzag_walk_is_flagged() {
    let mut h = harness(StaticScorer::new(80.0));

    let route = h
        .optimizer
        .select_safest_route(
            coord(SOURCE.0, SOURCE.1),
            coord(DESTINATION.0, DESTINATION.1),
            TravelMode::Walking,
        )
        .await
        .unwrap();

    let traveler = TravelerId::from("zigzag");
    h.registry.start_session(traveler.clone(), route, TravelMode::Walking).await;

    let departure = Utc::now();
    // ~55 m north-south oscillation around the route start
    let hop = 0.0005;
    let lats = [SOURCE.0, SOURCE.0 + hop, SOURCE.0, SOURCE.0 + hop, SOURCE.0];

    let mut last = None;
    for (i, lat) in lats.into_iter().enumerate() {
        last = h
            .registry
            .submit_sample(
                &traveler,
                TrackSample {
                    coordinate: coord(lat, SOURCE.1),
                    speed_kmh: 5.0,
                    timestamp: departure + ChronoDuration::seconds(i as i64 * 15),
                },
            )
            .await
            .unwrap();
    }

    assert_eq!(last.unwrap().kind, AnomalyKind::ErraticMovement);

    h.registry.end_session(&traveler).await.unwrap();
    let seen = drain(&mut h.alerts);
    assert!(seen.contains(&"anomaly:erratic_movement".to_string()));
}
