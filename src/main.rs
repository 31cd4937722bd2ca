//! SafeRoute - safest-path planning and live travel monitoring
//!
//! Plans the safest route between two points, watches each traveler's
//! live position against it, and escalates through a graduated alert
//! protocol when something looks wrong.
//!
//! Module structure:
//! - `domain/` - Core types (Coordinate, PlannedRoute, Session, events)
//! - `io/` - External interfaces (scorer, route provider, dispatch, telemetry)
//! - `services/` - Business logic (RouteOptimizer, GeofenceMonitor, SessionRegistry)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use saferoute::infra::{Config, Metrics};
use saferoute::io::{
    create_dispatch_channel, start_telemetry_listener, AlertLog, CachedScorer, HttpRouteProvider,
    HttpSafetyScorer, RouteProvider, SafetyScorer, StaticScorer, SyntheticRouteProvider,
    TelemetryListenerConfig,
};
use saferoute::services::{RouteOptimizer, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// SafeRoute - safest-path planning and live travel monitoring
#[derive(Parser, Debug)]
#[command(name = "saferoute", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(
        version = %env!("CARGO_PKG_VERSION"),
        git = %env!("GIT_HASH"),
        "saferoute starting"
    );

    // Parse command line arguments using clap
    let args = Args::parse();

    // Load configuration from TOML file
    let config = Config::load_from_path(&args.config);

    let scorer_desc =
        if config.scorer_base_url().is_empty() { "static" } else { config.scorer_base_url() };
    let provider_desc =
        if config.provider_base_url().is_empty() { "synthetic" } else { config.provider_base_url() };
    info!(
        config_file = %config.config_file(),
        scorer = %scorer_desc,
        provider = %provider_desc,
        deviation_threshold_m = %config.monitor().deviation_threshold_m,
        stop_window_secs = %config.monitor().stop_window_secs,
        soft_check_grace_secs = %config.soft_check_grace_secs(),
        escalation_grace_secs = %config.escalation_grace_secs(),
        replan_interval_secs = %config.replan_interval_secs(),
        telemetry_port = %config.telemetry_listener_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared components
    let metrics = Arc::new(Metrics::new());

    // Alert dispatch channel feeding the JSONL writer
    let (dispatch, dispatch_rx) = create_dispatch_channel(
        config.egress_capacity(),
        config.service_id().to_string(),
        metrics.clone(),
    );
    let alert_log = AlertLog::new(config.egress_file());
    let writer_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        alert_log.run(dispatch_rx, writer_shutdown).await;
    });

    // Safety scorer: HTTP when configured, static neutral otherwise,
    // always behind the TTL cache
    let raw_scorer: Arc<dyn SafetyScorer> = if config.scorer_base_url().is_empty() {
        Arc::new(StaticScorer::default())
    } else {
        Arc::new(HttpSafetyScorer::new(
            config.scorer_base_url(),
            Duration::from_millis(config.scorer_timeout_ms()),
        ))
    };
    let scorer: Arc<dyn SafetyScorer> = Arc::new(CachedScorer::new(
        raw_scorer,
        Duration::from_secs(config.scorer_cache_ttl_secs()),
        config.scorer_cache_capacity(),
        metrics.clone(),
    ));

    // Route provider: HTTP when configured, straight-line synthesis otherwise
    let provider: Arc<dyn RouteProvider> = if config.provider_base_url().is_empty() {
        Arc::new(SyntheticRouteProvider::new())
    } else {
        Arc::new(HttpRouteProvider::new(
            config.provider_base_url(),
            Duration::from_millis(config.provider_timeout_ms()),
        ))
    };

    let optimizer = Arc::new(RouteOptimizer::new(
        provider,
        scorer.clone(),
        config.optimizer().clone(),
        metrics.clone(),
    ));

    let registry = Arc::new(SessionRegistry::new(
        &config,
        scorer,
        Some(optimizer.clone()),
        dispatch,
        metrics.clone(),
    ));

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let registry_for_metrics = registry.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let summary = metrics_clone.report(registry_for_metrics.active_count());
            summary.log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the telemetry listener - the ingress for session control;
    // consumes the task until shutdown
    let listener_config = TelemetryListenerConfig {
        port: config.telemetry_listener_port(),
        enabled: config.telemetry_listener_enabled(),
    };
    if listener_config.enabled {
        if let Err(e) =
            start_telemetry_listener(listener_config, registry.clone(), optimizer, shutdown_rx)
                .await
        {
            tracing::error!(error = %e, "telemetry_listener_error");
        }
    } else {
        // No ingress configured: stay up until the shutdown signal
        let mut wait = shutdown_rx;
        let _ = wait.wait_for(|stopped| *stopped).await;
    }

    // Tear down live sessions, canceling their timers
    registry.shutdown_all().await;

    info!("saferoute shutdown complete");
    Ok(())
}
