//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `scorer` - Safety scoring client (HTTP, cached, static fallback)
//! - `provider` - Route alternative client (HTTP, synthetic fallback)
//! - `dispatch` - Typed channel for alert egress messages
//! - `egress` - Alert output to file (JSONL format)
//! - `telemetry` - TCP listener for session control and location samples

pub mod dispatch;
pub mod egress;
pub mod provider;
pub mod scorer;
pub mod telemetry;

// Re-export commonly used types
pub use dispatch::{create_dispatch_channel, AlertMessage, DispatchSender};
pub use egress::AlertLog;
pub use provider::{HttpRouteProvider, RouteProvider, SyntheticRouteProvider};
pub use scorer::{CachedScorer, HttpSafetyScorer, SafetyScorer, StaticScorer, NEUTRAL_SCORE};
pub use telemetry::{start_telemetry_listener, TelemetryListenerConfig};
