//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. Default: config/dev.toml
//!
//! The `[escalation]` grace windows are required fields: they govern how
//! fast a silent traveler escalates to emergency and must be an explicit
//! operator decision, never a built-in constant.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Deployment identifier included in egress payloads
    #[serde(default = "default_service_id")]
    pub id: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { id: default_service_id() }
    }
}

fn default_service_id() -> String {
    "saferoute".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScorerConfig {
    /// Base URL of the safety scoring service; empty = static fallback scorer
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_scorer_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: default_scorer_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_scorer_timeout_ms() -> u64 {
    2000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    4096
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the route alternative service; empty = synthetic provider
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { base_url: String::new(), timeout_ms: default_provider_timeout_ms() }
    }
}

fn default_provider_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_safety_weight")]
    pub safety_weight: f64,
    #[serde(default = "default_time_weight")]
    pub time_weight: f64,
    /// Travel-time normalization span in minutes
    #[serde(default = "default_time_norm_minutes")]
    pub time_norm_minutes: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            safety_weight: default_safety_weight(),
            time_weight: default_time_weight(),
            time_norm_minutes: default_time_norm_minutes(),
        }
    }
}

fn default_safety_weight() -> f64 {
    0.7
}

fn default_time_weight() -> f64 {
    0.3
}

fn default_time_norm_minutes() -> f64 {
    60.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Distance from the planned route that counts as a deviation (meters)
    #[serde(default = "default_deviation_threshold_m")]
    pub deviation_threshold_m: f64,
    /// Below this speed a traveler counts as stopped (km/h)
    #[serde(default = "default_stop_speed_kmh")]
    pub stop_speed_kmh: f64,
    /// Continuous stop duration that triggers the unsafe-stop check (seconds)
    #[serde(default = "default_stop_window_secs")]
    pub stop_window_secs: u64,
    /// Safety score below which a stop location counts as unsafe
    #[serde(default = "default_unsafe_score")]
    pub unsafe_score: f64,
    /// Bearing change that counts as a sharp turn (degrees)
    #[serde(default = "default_erratic_turn_deg")]
    pub erratic_turn_deg: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            deviation_threshold_m: default_deviation_threshold_m(),
            stop_speed_kmh: default_stop_speed_kmh(),
            stop_window_secs: default_stop_window_secs(),
            unsafe_score: default_unsafe_score(),
            erratic_turn_deg: default_erratic_turn_deg(),
        }
    }
}

fn default_deviation_threshold_m() -> f64 {
    200.0
}

fn default_stop_speed_kmh() -> f64 {
    1.0
}

fn default_stop_window_secs() -> u64 {
    300
}

fn default_unsafe_score() -> f64 {
    30.0
}

fn default_erratic_turn_deg() -> f64 {
    90.0
}

/// Grace windows are deliberately required - no serde defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct EscalationConfig {
    /// Seconds to wait for confirmation in soft-check before escalating
    pub soft_check_grace_secs: u64,
    /// Seconds to wait for confirmation in escalation before emergency
    pub escalation_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfig {
    /// End a session after this long without a sample (0 = disabled)
    #[serde(default)]
    pub idle_timeout_secs: u64,
    /// Re-plan the route from the current position on this interval (0 = disabled)
    #[serde(default)]
    pub replan_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub listener_enabled: bool,
    #[serde(default = "default_telemetry_port")]
    pub listener_port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            listener_enabled: default_telemetry_enabled(),
            listener_port: default_telemetry_port(),
        }
    }
}

fn default_telemetry_enabled() -> bool {
    true
}

fn default_telemetry_port() -> u16 {
    25901
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for alert egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
    /// Bounded dispatch channel capacity
    #[serde(default = "default_egress_capacity")]
    pub capacity: usize,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file(), capacity: default_egress_capacity() }
    }
}

fn default_egress_file() -> String {
    "alerts.jsonl".to_string()
}

fn default_egress_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub egress: EgressConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    service_id: String,
    scorer_base_url: String,
    scorer_timeout_ms: u64,
    scorer_cache_ttl_secs: u64,
    scorer_cache_capacity: usize,
    provider_base_url: String,
    provider_timeout_ms: u64,
    optimizer: OptimizerConfig,
    monitor: MonitorConfig,
    soft_check_grace_secs: u64,
    escalation_grace_secs: u64,
    idle_timeout_secs: u64,
    replan_interval_secs: u64,
    telemetry_listener_enabled: bool,
    telemetry_listener_port: u16,
    metrics_interval_secs: u64,
    egress_file: String,
    egress_capacity: usize,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_id: default_service_id(),
            scorer_base_url: String::new(),
            scorer_timeout_ms: default_scorer_timeout_ms(),
            scorer_cache_ttl_secs: default_cache_ttl_secs(),
            scorer_cache_capacity: default_cache_capacity(),
            provider_base_url: String::new(),
            provider_timeout_ms: default_provider_timeout_ms(),
            optimizer: OptimizerConfig::default(),
            monitor: MonitorConfig::default(),
            soft_check_grace_secs: 120,
            escalation_grace_secs: 180,
            idle_timeout_secs: 0,
            replan_interval_secs: 0,
            telemetry_listener_enabled: true,
            telemetry_listener_port: default_telemetry_port(),
            metrics_interval_secs: default_metrics_interval_secs(),
            egress_file: default_egress_file(),
            egress_capacity: default_egress_capacity(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            service_id: toml_config.service.id,
            scorer_base_url: toml_config.scorer.base_url,
            scorer_timeout_ms: toml_config.scorer.timeout_ms,
            scorer_cache_ttl_secs: toml_config.scorer.cache_ttl_secs,
            scorer_cache_capacity: toml_config.scorer.cache_capacity,
            provider_base_url: toml_config.provider.base_url,
            provider_timeout_ms: toml_config.provider.timeout_ms,
            optimizer: toml_config.optimizer,
            monitor: toml_config.monitor,
            soft_check_grace_secs: toml_config.escalation.soft_check_grace_secs,
            escalation_grace_secs: toml_config.escalation.escalation_grace_secs,
            idle_timeout_secs: toml_config.session.idle_timeout_secs,
            replan_interval_secs: toml_config.session.replan_interval_secs,
            telemetry_listener_enabled: toml_config.telemetry.listener_enabled,
            telemetry_listener_port: toml_config.telemetry.listener_port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            egress_file: toml_config.egress.file,
            egress_capacity: toml_config.egress.capacity,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {e:#}. Using defaults.");
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn scorer_base_url(&self) -> &str {
        &self.scorer_base_url
    }

    pub fn scorer_timeout_ms(&self) -> u64 {
        self.scorer_timeout_ms
    }

    pub fn scorer_cache_ttl_secs(&self) -> u64 {
        self.scorer_cache_ttl_secs
    }

    pub fn scorer_cache_capacity(&self) -> usize {
        self.scorer_cache_capacity
    }

    pub fn provider_base_url(&self) -> &str {
        &self.provider_base_url
    }

    pub fn provider_timeout_ms(&self) -> u64 {
        self.provider_timeout_ms
    }

    pub fn optimizer(&self) -> &OptimizerConfig {
        &self.optimizer
    }

    pub fn monitor(&self) -> &MonitorConfig {
        &self.monitor
    }

    pub fn soft_check_grace_secs(&self) -> u64 {
        self.soft_check_grace_secs
    }

    pub fn escalation_grace_secs(&self) -> u64 {
        self.escalation_grace_secs
    }

    pub fn idle_timeout_secs(&self) -> u64 {
        self.idle_timeout_secs
    }

    pub fn replan_interval_secs(&self) -> u64 {
        self.replan_interval_secs
    }

    pub fn telemetry_listener_enabled(&self) -> bool {
        self.telemetry_listener_enabled
    }

    pub fn telemetry_listener_port(&self) -> u16 {
        self.telemetry_listener_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn egress_capacity(&self) -> usize {
        self.egress_capacity
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set grace windows
    #[cfg(test)]
    pub fn with_grace_secs(mut self, soft_check: u64, escalation: u64) -> Self {
        self.soft_check_grace_secs = soft_check;
        self.escalation_grace_secs = escalation;
        self
    }

    /// Builder method for tests to set the replan interval
    #[cfg(test)]
    pub fn with_replan_interval_secs(mut self, secs: u64) -> Self {
        self.replan_interval_secs = secs;
        self
    }

    /// Builder method for tests to set the idle timeout
    #[cfg(test)]
    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_id(), "saferoute");
        assert_eq!(config.monitor().deviation_threshold_m, 200.0);
        assert_eq!(config.monitor().stop_speed_kmh, 1.0);
        assert_eq!(config.monitor().stop_window_secs, 300);
        assert_eq!(config.monitor().unsafe_score, 30.0);
        assert_eq!(config.optimizer().safety_weight, 0.7);
        assert_eq!(config.optimizer().time_weight, 0.3);
        assert_eq!(config.metrics_interval_secs(), 10);
        assert_eq!(config.egress_file(), "alerts.jsonl");
    }

    #[test]
    fn test_grace_windows_required_in_toml() {
        // A config without [escalation] must not parse
        let result: Result<TomlConfig, _> = toml::from_str("[service]\nid = \"x\"\n");
        assert!(result.is_err());

        let result: Result<TomlConfig, _> = toml::from_str(
            "[escalation]\nsoft_check_grace_secs = 90\nescalation_grace_secs = 120\n",
        );
        let config = result.unwrap();
        assert_eq!(config.escalation.soft_check_grace_secs, 90);
        assert_eq!(config.escalation.escalation_grace_secs, 120);
    }

    #[test]
    fn test_disabled_intervals_default_zero() {
        let config: TomlConfig = toml::from_str(
            "[escalation]\nsoft_check_grace_secs = 90\nescalation_grace_secs = 120\n",
        )
        .unwrap();
        assert_eq!(config.session.idle_timeout_secs, 0);
        assert_eq!(config.session.replan_interval_secs, 0);
    }
}
