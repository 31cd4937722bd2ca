//! Scenario simulator - plans a route and replays a scripted walk
//!
//! Runs entirely offline against the synthetic route provider and a
//! static scorer with a staged unsafe zone. Useful for eyeballing the
//! full escalation ladder without a live feed:
//!
//!   cargo run --bin sim
//!   cargo run --bin sim -- --scenario deviation
//!
//! Scenarios:
//! - `walk`      clean end-to-end walk, no anomalies
//! - `deviation` wanders off the corridor, then confirms safe
//! - `stop`      stops in an unsafe area long enough to reach emergency

use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use saferoute::domain::geo::Coordinate;
use saferoute::domain::route::TravelMode;
use saferoute::domain::session::{TrackSample, TravelerId};
use saferoute::infra::{Config, Metrics};
use saferoute::io::{
    create_dispatch_channel, AlertMessage, StaticScorer, SyntheticRouteProvider,
};
use saferoute::io::scorer::ScoredZone;
use saferoute::services::{RouteOptimizer, SessionRegistry};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sim")]
#[command(about = "Offline scenario runner for the tracking core")]
struct Args {
    /// Scenario to replay: walk, deviation, stop
    #[arg(short, long, default_value = "deviation")]
    scenario: String,
}

/// Delhi test corridor used across scenarios
const SOURCE: (f64, f64) = (28.6139, 77.2090);
const DESTINATION: (f64, f64) = (28.6169, 77.2120);

/// One degree of latitude on the haversine sphere, meters
const METERS_PER_DEG_LAT: f64 = 111_194.93;

/// (lat, lng, speed_kmh, seconds since departure)
type Step = (f64, f64, f64, i64);

fn walk_steps() -> Vec<Step> {
    vec![
        (28.6139, 77.2090, 4.5, 0),
        (28.6145, 77.2096, 4.5, 60),
        (28.6151, 77.2102, 4.2, 120),
        (28.6157, 77.2108, 4.5, 180),
        (28.6163, 77.2114, 4.4, 240),
        (28.6169, 77.2120, 4.5, 300),
    ]
}

fn deviation_steps() -> Vec<Step> {
    let off = 350.0 / METERS_PER_DEG_LAT;
    vec![
        (28.6139, 77.2090, 4.5, 0),
        (28.6145, 77.2096, 4.5, 60),
        // Wanders well off the corridor
        (28.6145 + off, 77.2096, 4.0, 120),
        (28.6145 + off, 77.2096, 3.5, 180),
    ]
}

fn stop_steps() -> Vec<Step> {
    let off = 350.0 / METERS_PER_DEG_LAT;
    let lat = 28.6145 + off;
    vec![
        (28.6139, 77.2090, 4.5, 0),
        // Off the corridor and stationary in the staged unsafe zone
        (lat, 77.2096, 0.0, 60),
        (lat, 77.2096, 0.0, 120),
        (lat, 77.2096, 0.0, 500),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    let source = Coordinate::new(SOURCE.0, SOURCE.1)?;
    let destination = Coordinate::new(DESTINATION.0, DESTINATION.1)?;

    // Unsafe zone sits where the deviation scenarios wander
    let unsafe_center = Coordinate::new(28.6145 + 350.0 / METERS_PER_DEG_LAT, 77.2096)?;
    let scorer = Arc::new(
        StaticScorer::new(75.0)
            .with_zone(ScoredZone { center: unsafe_center, radius_m: 150.0, score: 18.0 }),
    );

    let config = Config::default();
    let metrics = Arc::new(Metrics::new());
    let (dispatch, mut alerts) =
        create_dispatch_channel(256, "sim".to_string(), metrics.clone());

    let optimizer = Arc::new(RouteOptimizer::new(
        Arc::new(SyntheticRouteProvider::new()),
        scorer.clone(),
        config.optimizer().clone(),
        metrics.clone(),
    ));
    let registry =
        SessionRegistry::new(&config, scorer, Some(optimizer.clone()), dispatch, metrics);

    // Plan and start
    let route = optimizer
        .select_safest_route(source, destination, TravelMode::Walking)
        .await?;
    info!(
        rid = %route.rid,
        points = %route.points.len(),
        travel_time_min = %format!("{:.1}", route.total_travel_time),
        confidence = %format!("{:.2}", route.confidence),
        "sim_route_planned"
    );

    let traveler = TravelerId::from("sim-traveler");
    registry.start_session(traveler.clone(), route, TravelMode::Walking).await;

    let steps = match args.scenario.as_str() {
        "walk" => walk_steps(),
        "stop" => stop_steps(),
        _ => deviation_steps(),
    };

    let departure = Utc::now();
    for (lat, lng, speed, offset) in steps {
        let sample = TrackSample {
            coordinate: Coordinate::new(lat, lng)?,
            speed_kmh: speed,
            timestamp: departure + ChronoDuration::seconds(offset),
        };
        let anomaly = registry.submit_sample(&traveler, sample).await?;
        println!(
            "t+{offset:>3}s ({lat:.6},{lng:.6}) speed={speed:.1} -> {}",
            anomaly.map(|a| a.kind.as_str()).unwrap_or("ok")
        );
    }

    if args.scenario == "deviation" {
        registry.confirm_safe(&traveler).await?;
        println!("traveler confirmed safe");
    }

    registry.end_session(&traveler).await?;

    println!("\ndispatched alerts:");
    while let Ok(message) = alerts.try_recv() {
        match message {
            AlertMessage::Anomaly(a) => {
                println!("  anomaly      {} at ({:.6},{:.6})", a.kind, a.lat, a.lng)
            }
            AlertMessage::PhaseChange(p) => println!(
                "  phase        {} -> {}{}",
                p.from,
                p.to,
                p.trigger.map(|t| format!(" ({t})")).unwrap_or_default()
            ),
            AlertMessage::Session(s) => println!("  session      {}", s.t),
        }
    }

    Ok(())
}
