//! Safety scoring client
//!
//! Wraps the external safety-scoring collaborator behind the
//! [`SafetyScorer`] trait. The model contract: a score in [0, 100] for a
//! location and timestamp, with a neutral 50 when it has no data for the
//! area. Transport failures surface as errors; degradation policy (neutral
//! substitution) belongs to the caller.

use crate::domain::geo::Coordinate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Documented neutral default when the scorer has no data for a location
pub const NEUTRAL_SCORE: f64 = 50.0;

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("scorer request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("scorer returned status {0}")]
    Status(u16),
}

/// External safety scoring model, treated as an opaque function
#[async_trait]
pub trait SafetyScorer: Send + Sync {
    /// Score a location at a point in time, in [0, 100]
    async fn score(&self, location: Coordinate, at: DateTime<Utc>) -> Result<f64, ScorerError>;
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: f64,
}

/// HTTP client for the safety scoring service
///
/// `GET {base_url}/score?lat=..&lng=..&at=<rfc3339>` returning `{"score": f}`.
pub struct HttpSafetyScorer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSafetyScorer {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl SafetyScorer for HttpSafetyScorer {
    async fn score(&self, location: Coordinate, at: DateTime<Utc>) -> Result<f64, ScorerError> {
        let url = format!("{}/score", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", location.lat().to_string()),
                ("lng", location.lng().to_string()),
                ("at", at.to_rfc3339()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScorerError::Status(status.as_u16()));
        }

        let body: ScoreResponse = response.json().await?;
        Ok(body.score.clamp(0.0, 100.0))
    }
}

/// Cache key: ~11 m grid cell plus hour bucket. Scores drift with the
/// time of day, not with every GPS jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    lat_e4: i64,
    lng_e4: i64,
    hour: i64,
}

impl CacheKey {
    fn new(location: Coordinate, at: DateTime<Utc>) -> Self {
        Self {
            lat_e4: (location.lat() * 1e4).round() as i64,
            lng_e4: (location.lng() * 1e4).round() as i64,
            hour: at.timestamp() / 3600,
        }
    }
}

/// TTL cache decorator for any [`SafetyScorer`]
///
/// Only successful scores are cached; failures always hit the inner
/// scorer again. The map is cleared wholesale when it outgrows the
/// configured capacity.
pub struct CachedScorer {
    inner: Arc<dyn SafetyScorer>,
    cache: Mutex<FxHashMap<CacheKey, (f64, Instant)>>,
    ttl: Duration,
    capacity: usize,
    metrics: Arc<crate::infra::Metrics>,
}

impl CachedScorer {
    pub fn new(
        inner: Arc<dyn SafetyScorer>,
        ttl: Duration,
        capacity: usize,
        metrics: Arc<crate::infra::Metrics>,
    ) -> Self {
        Self { inner, cache: Mutex::new(FxHashMap::default()), ttl, capacity, metrics }
    }
}

#[async_trait]
impl SafetyScorer for CachedScorer {
    async fn score(&self, location: Coordinate, at: DateTime<Utc>) -> Result<f64, ScorerError> {
        let key = CacheKey::new(location, at);

        {
            let cache = self.cache.lock();
            if let Some(&(score, inserted)) = cache.get(&key) {
                if inserted.elapsed() <= self.ttl {
                    self.metrics.record_scorer_cache_hit();
                    return Ok(score);
                }
            }
        }

        self.metrics.record_scorer_cache_miss();
        let score = self.inner.score(location, at).await?;

        let mut cache = self.cache.lock();
        if cache.len() >= self.capacity {
            debug!(entries = %cache.len(), "scorer_cache_cleared");
            cache.clear();
        }
        cache.insert(key, (score, Instant::now()));

        Ok(score)
    }
}

/// A circular area with a fixed safety score, used by the static scorer
#[derive(Debug, Clone, Copy)]
pub struct ScoredZone {
    pub center: Coordinate,
    pub radius_m: f64,
    pub score: f64,
}

/// Offline scorer returning a fixed default, with optional overriding
/// zones. Used when no scoring service is configured, and by the
/// simulator to stage unsafe areas.
pub struct StaticScorer {
    default_score: f64,
    zones: Vec<ScoredZone>,
}

impl StaticScorer {
    pub fn new(default_score: f64) -> Self {
        Self { default_score, zones: Vec::new() }
    }

    pub fn with_zone(mut self, zone: ScoredZone) -> Self {
        self.zones.push(zone);
        self
    }
}

impl Default for StaticScorer {
    fn default() -> Self {
        Self::new(NEUTRAL_SCORE)
    }
}

#[async_trait]
impl SafetyScorer for StaticScorer {
    async fn score(&self, location: Coordinate, _at: DateTime<Utc>) -> Result<f64, ScorerError> {
        for zone in &self.zones {
            if crate::domain::geo::haversine_m(location, zone.center) <= zone.radius_m {
                return Ok(zone.score);
            }
        }
        Ok(self.default_score)
    }
}
