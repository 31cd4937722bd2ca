//! Composite route scoring and selection
//!
//! Requests alternatives from the route provider, scores every point via
//! the safety scorer, and selects one route by a weighted blend of
//! normalized safety and normalized travel time. Pure function of its
//! inputs and the collaborator responses at call time; no memoization at
//! this layer.

use crate::domain::geo::Coordinate;
use crate::domain::route::{PlannedRoute, RouteAlternative, RoutePoint, TravelMode};
use crate::infra::config::OptimizerConfig;
use crate::infra::Metrics;
use crate::io::provider::{ProviderError, RouteProvider};
use crate::io::scorer::{SafetyScorer, NEUTRAL_SCORE};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum OptimizeError {
    /// Provider returned zero usable alternatives - no route exists
    #[error("route provider returned no alternatives")]
    NoAlternatives,
    /// Scorer unreachable for every point of every alternative
    #[error("safety scorer unavailable for the entire optimization pass")]
    ScoringUnavailable,
    /// Provider transport failure
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// A scored alternative pending selection
struct ScoredAlternative {
    points: Vec<RoutePoint>,
    travel_time_minutes: f64,
    composite_score: f64,
}

pub struct RouteOptimizer {
    provider: Arc<dyn RouteProvider>,
    scorer: Arc<dyn SafetyScorer>,
    config: OptimizerConfig,
    metrics: Arc<Metrics>,
}

impl RouteOptimizer {
    pub fn new(
        provider: Arc<dyn RouteProvider>,
        scorer: Arc<dyn SafetyScorer>,
        config: OptimizerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { provider, scorer, config, metrics }
    }

    /// Select the safest route between two coordinates.
    ///
    /// Fails with [`OptimizeError::NoAlternatives`] when the provider has
    /// no route, and with [`OptimizeError::ScoringUnavailable`] only when
    /// the scorer failed for every single point; individual point
    /// failures fall back to the neutral default and the pass continues.
    pub async fn select_safest_route(
        &self,
        source: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
    ) -> Result<PlannedRoute, OptimizeError> {
        let alternatives = self.provider.alternatives(source, destination, mode).await?;

        // Alternatives without points cannot be scored or tracked
        let alternatives: Vec<RouteAlternative> =
            alternatives.into_iter().filter(|a| !a.points.is_empty()).collect();
        if alternatives.is_empty() {
            return Err(OptimizeError::NoAlternatives);
        }

        let alternative_count = alternatives.len();
        let now = Utc::now();
        let mut scored = Vec::with_capacity(alternative_count);
        let mut total_points = 0usize;
        let mut failed_points = 0usize;

        for alternative in alternatives {
            let mut points = Vec::with_capacity(alternative.points.len());
            let mut total_score = 0.0;

            for coordinate in &alternative.points {
                total_points += 1;
                let safety_score = match self.scorer.score(*coordinate, now).await {
                    Ok(score) => score,
                    Err(e) => {
                        failed_points += 1;
                        self.metrics.record_scorer_fallback();
                        debug!(coordinate = %coordinate, error = %e, "point_score_fallback");
                        NEUTRAL_SCORE
                    }
                };
                total_score += safety_score;
                points.push(RoutePoint { coordinate: *coordinate, safety_score });
            }

            let normalized_safety = total_score / (points.len() as f64 * 100.0);
            let normalized_time =
                (1.0 - alternative.travel_time_minutes / self.config.time_norm_minutes).max(0.0);
            let composite_score = self.config.safety_weight * normalized_safety
                + self.config.time_weight * normalized_time;

            scored.push(ScoredAlternative {
                points,
                travel_time_minutes: alternative.travel_time_minutes,
                composite_score,
            });
        }

        if failed_points == total_points {
            return Err(OptimizeError::ScoringUnavailable);
        }

        // Maximum composite wins; ties break to the faster route, then to
        // provider order (first wins).
        let mut best = 0;
        for (i, candidate) in scored.iter().enumerate().skip(1) {
            let current = &scored[best];
            if candidate.composite_score > current.composite_score
                || (candidate.composite_score == current.composite_score
                    && candidate.travel_time_minutes < current.travel_time_minutes)
            {
                best = i;
            }
        }

        let winner = scored.swap_remove(best);
        let route = PlannedRoute::new(winner.points, winner.travel_time_minutes);

        self.metrics.record_plan();
        info!(
            rid = %route.rid,
            alternatives = %alternative_count,
            points = %route.points.len(),
            composite = %format!("{:.3}", winner.composite_score),
            travel_time_min = %format!("{:.1}", route.total_travel_time),
            confidence = %format!("{:.2}", route.confidence),
            fallback_points = %failed_points,
            "route_selected"
        );

        Ok(route)
    }
}
