//! Domain models - core types for route planning and live tracking
//!
//! This module contains the canonical data types used throughout the system:
//! - `geo` - validated coordinates and great-circle geometry
//! - `route` - route points, alternatives and the selected `PlannedRoute`
//! - `session` - traveler session state, anomaly and phase-change events

pub mod geo;
pub mod route;
pub mod session;
