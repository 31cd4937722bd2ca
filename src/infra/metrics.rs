//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];

/// Number of histogram buckets, exported for payload arrays
pub const METRICS_NUM_BUCKETS: usize = 11;
const NUM_BUCKETS: usize = METRICS_NUM_BUCKETS;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps interval counters to get a
/// consistent snapshot.
pub struct Metrics {
    /// Total samples ever observed (monotonic)
    samples_total: AtomicU64,
    /// Samples since last report (reset on report)
    samples_since_report: AtomicU64,
    /// Sum of observe latencies in microseconds (reset on report)
    observe_latency_sum_us: AtomicU64,
    /// Max observe latency in microseconds (reset on report)
    observe_latency_max_us: AtomicU64,
    /// Observe latency histogram buckets (reset on report)
    observe_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Anomalies by kind (monotonic)
    stopped_unsafe_total: AtomicU64,
    route_deviation_total: AtomicU64,
    erratic_movement_total: AtomicU64,
    /// Phase transitions (monotonic)
    phase_changes_total: AtomicU64,
    /// Sessions reaching emergency (monotonic)
    emergencies_total: AtomicU64,
    /// Confirmation-of-safety resets (monotonic)
    confirmations_total: AtomicU64,
    /// Session lifecycle (monotonic)
    sessions_started_total: AtomicU64,
    sessions_ended_total: AtomicU64,
    /// Route optimization passes (monotonic)
    plans_total: AtomicU64,
    /// Re-plans applied to live sessions (monotonic)
    replans_total: AtomicU64,
    /// Per-point scoring failures recovered with the neutral default (monotonic)
    scorer_fallbacks_total: AtomicU64,
    /// Scorer cache hits/misses (monotonic)
    scorer_cache_hits: AtomicU64,
    scorer_cache_misses: AtomicU64,
    /// Alerts dropped due to dispatch channel full (monotonic)
    alerts_dropped: AtomicU64,
    /// Time of last report for rate calculation
    last_report: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            samples_total: AtomicU64::new(0),
            samples_since_report: AtomicU64::new(0),
            observe_latency_sum_us: AtomicU64::new(0),
            observe_latency_max_us: AtomicU64::new(0),
            observe_latency_buckets: Default::default(),
            stopped_unsafe_total: AtomicU64::new(0),
            route_deviation_total: AtomicU64::new(0),
            erratic_movement_total: AtomicU64::new(0),
            phase_changes_total: AtomicU64::new(0),
            emergencies_total: AtomicU64::new(0),
            confirmations_total: AtomicU64::new(0),
            sessions_started_total: AtomicU64::new(0),
            sessions_ended_total: AtomicU64::new(0),
            plans_total: AtomicU64::new(0),
            replans_total: AtomicU64::new(0),
            scorer_fallbacks_total: AtomicU64::new(0),
            scorer_cache_hits: AtomicU64::new(0),
            scorer_cache_misses: AtomicU64::new(0),
            alerts_dropped: AtomicU64::new(0),
            last_report: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record one processed sample with its observe latency
    pub fn record_sample_observed(&self, latency_us: u64) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
        self.samples_since_report.fetch_add(1, Ordering::Relaxed);
        self.observe_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.observe_latency_max_us, latency_us);
        self.observe_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anomaly(&self, kind: crate::domain::session::AnomalyKind) {
        use crate::domain::session::AnomalyKind;
        let counter = match kind {
            AnomalyKind::StoppedUnsafe => &self.stopped_unsafe_total,
            AnomalyKind::RouteDeviation => &self.route_deviation_total,
            AnomalyKind::ErraticMovement => &self.erratic_movement_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_phase_change(&self, to_emergency: bool) {
        self.phase_changes_total.fetch_add(1, Ordering::Relaxed);
        if to_emergency {
            self.emergencies_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_confirmation(&self) {
        self.confirmations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_ended(&self) {
        self.sessions_ended_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_plan(&self) {
        self.plans_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replan(&self) {
        self.replans_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scorer_fallback(&self) {
        self.scorer_fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scorer_cache_hit(&self) {
        self.scorer_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scorer_cache_miss(&self) {
        self.scorer_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_dropped(&self) {
        self.alerts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Produce a snapshot, resetting interval counters
    pub fn report(&self, active_sessions: usize) -> MetricsSummary {
        let samples_interval = self.samples_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.observe_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.observe_latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.observe_latency_buckets);

        let mut last_report = self.last_report.lock();
        let elapsed = last_report.elapsed();
        *last_report = Instant::now();
        drop(last_report);

        let samples_per_sec = if elapsed.as_secs_f64() > 0.0 {
            samples_interval as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency_us =
            if samples_interval > 0 { latency_sum / samples_interval } else { 0 };

        MetricsSummary {
            samples_total: self.samples_total.load(Ordering::Relaxed),
            samples_per_sec,
            avg_observe_latency_us: avg_latency_us,
            max_observe_latency_us: latency_max,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            stopped_unsafe_total: self.stopped_unsafe_total.load(Ordering::Relaxed),
            route_deviation_total: self.route_deviation_total.load(Ordering::Relaxed),
            erratic_movement_total: self.erratic_movement_total.load(Ordering::Relaxed),
            phase_changes_total: self.phase_changes_total.load(Ordering::Relaxed),
            emergencies_total: self.emergencies_total.load(Ordering::Relaxed),
            confirmations_total: self.confirmations_total.load(Ordering::Relaxed),
            sessions_started_total: self.sessions_started_total.load(Ordering::Relaxed),
            sessions_ended_total: self.sessions_ended_total.load(Ordering::Relaxed),
            active_sessions,
            plans_total: self.plans_total.load(Ordering::Relaxed),
            replans_total: self.replans_total.load(Ordering::Relaxed),
            scorer_fallbacks_total: self.scorer_fallbacks_total.load(Ordering::Relaxed),
            scorer_cache_hits: self.scorer_cache_hits.load(Ordering::Relaxed),
            scorer_cache_misses: self.scorer_cache_misses.load(Ordering::Relaxed),
            alerts_dropped: self.alerts_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub samples_total: u64,
    pub samples_per_sec: f64,
    pub avg_observe_latency_us: u64,
    pub max_observe_latency_us: u64,
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub stopped_unsafe_total: u64,
    pub route_deviation_total: u64,
    pub erratic_movement_total: u64,
    pub phase_changes_total: u64,
    pub emergencies_total: u64,
    pub confirmations_total: u64,
    pub sessions_started_total: u64,
    pub sessions_ended_total: u64,
    pub active_sessions: usize,
    pub plans_total: u64,
    pub replans_total: u64,
    pub scorer_fallbacks_total: u64,
    pub scorer_cache_hits: u64,
    pub scorer_cache_misses: u64,
    pub alerts_dropped: u64,
}

impl MetricsSummary {
    /// Emit the summary as a structured log line
    pub fn log(&self) {
        info!(
            samples_total = %self.samples_total,
            samples_per_sec = %format!("{:.1}", self.samples_per_sec),
            avg_latency_us = %self.avg_observe_latency_us,
            max_latency_us = %self.max_observe_latency_us,
            lat_p50_us = %self.lat_p50_us,
            lat_p95_us = %self.lat_p95_us,
            lat_p99_us = %self.lat_p99_us,
            active_sessions = %self.active_sessions,
            sessions_started = %self.sessions_started_total,
            sessions_ended = %self.sessions_ended_total,
            stopped_unsafe = %self.stopped_unsafe_total,
            route_deviation = %self.route_deviation_total,
            erratic_movement = %self.erratic_movement_total,
            phase_changes = %self.phase_changes_total,
            emergencies = %self.emergencies_total,
            confirmations = %self.confirmations_total,
            plans = %self.plans_total,
            replans = %self.replans_total,
            scorer_fallbacks = %self.scorer_fallbacks_total,
            cache_hits = %self.scorer_cache_hits,
            cache_misses = %self.scorer_cache_misses,
            alerts_dropped = %self.alerts_dropped,
            "metrics_report"
        );
    }
}
