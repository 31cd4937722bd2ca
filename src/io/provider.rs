//! Route alternative client
//!
//! Wraps the external directions collaborator behind the
//! [`RouteProvider`] trait: ordered coordinate sequences plus a
//! travel-time estimate per alternative. An empty result is valid and
//! means no route exists.

use crate::domain::geo::{self, Coordinate};
use crate::domain::route::{RouteAlternative, TravelMode};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("route provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("route provider returned status {0}")]
    Status(u16),
}

/// External route alternative service, treated as an opaque function
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn alternatives(
        &self,
        source: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
    ) -> Result<Vec<RouteAlternative>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct AlternativeResponse {
    /// Coordinates are range-checked during deserialization
    points: Vec<Coordinate>,
    travel_time_minutes: f64,
}

#[derive(Debug, Deserialize)]
struct AlternativesResponse {
    alternatives: Vec<AlternativeResponse>,
}

/// HTTP client for the route alternative service
///
/// `GET {base_url}/alternatives?src=..&dst=..&mode=..` returning
/// `{"alternatives": [{"points": [{lat,lng}..], "travel_time_minutes": f}]}`.
pub struct HttpRouteProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRouteProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl RouteProvider for HttpRouteProvider {
    async fn alternatives(
        &self,
        source: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
    ) -> Result<Vec<RouteAlternative>, ProviderError> {
        let url = format!("{}/alternatives", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("src", format!("{},{}", source.lat(), source.lng())),
                ("dst", format!("{},{}", destination.lat(), destination.lng())),
                ("mode", mode.as_str().to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body: AlternativesResponse = response.json().await?;
        Ok(body
            .alternatives
            .into_iter()
            .map(|a| RouteAlternative {
                points: a.points,
                travel_time_minutes: a.travel_time_minutes.max(0.0),
            })
            .collect())
    }
}

/// Assumed walking pace for synthetic travel-time estimates (km/h)
const SYNTHETIC_WALK_KMH: f64 = 4.8;

/// Offline provider interpolating a straight line between source and
/// destination. Used when no directions service is configured, and by
/// the simulator.
pub struct SyntheticRouteProvider {
    waypoints: usize,
}

impl SyntheticRouteProvider {
    pub fn new() -> Self {
        Self { waypoints: 5 }
    }

    pub fn with_waypoints(mut self, waypoints: usize) -> Self {
        self.waypoints = waypoints.max(1);
        self
    }
}

impl Default for SyntheticRouteProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteProvider for SyntheticRouteProvider {
    async fn alternatives(
        &self,
        source: Coordinate,
        destination: Coordinate,
        _mode: TravelMode,
    ) -> Result<Vec<RouteAlternative>, ProviderError> {
        let n = self.waypoints;
        let lat_step = (destination.lat() - source.lat()) / n as f64;
        let lng_step = (destination.lng() - source.lng()) / n as f64;

        let points: Vec<Coordinate> = (0..=n)
            .map(|i| {
                // Interpolation between two valid coordinates stays in range
                Coordinate::new(
                    source.lat() + lat_step * i as f64,
                    source.lng() + lng_step * i as f64,
                )
                .expect("interpolated coordinate in range")
            })
            .collect();

        let distance_km = geo::haversine_m(source, destination) / 1000.0;
        let travel_time_minutes = distance_km / SYNTHETIC_WALK_KMH * 60.0;

        Ok(vec![RouteAlternative { points, travel_time_minutes }])
    }
}
