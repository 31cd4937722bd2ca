//! Integration tests for configuration loading

use saferoute::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[service]
id = "test-site"

[scorer]
base_url = "http://scorer.test:9000"
timeout_ms = 1500

[provider]
base_url = "http://routes.test:9001"

[optimizer]
safety_weight = 0.8
time_weight = 0.2

[monitor]
deviation_threshold_m = 150.0
stop_window_secs = 240
unsafe_score = 25.0

[escalation]
soft_check_grace_secs = 60
escalation_grace_secs = 90

[session]
idle_timeout_secs = 600
replan_interval_secs = 120

[telemetry]
listener_enabled = false
listener_port = 26000

[metrics]
interval_secs = 15

[egress]
file = "out/alerts.jsonl"
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.service_id(), "test-site");
    assert_eq!(config.scorer_base_url(), "http://scorer.test:9000");
    assert_eq!(config.scorer_timeout_ms(), 1500);
    assert_eq!(config.provider_base_url(), "http://routes.test:9001");
    assert_eq!(config.optimizer().safety_weight, 0.8);
    assert_eq!(config.optimizer().time_weight, 0.2);
    assert_eq!(config.monitor().deviation_threshold_m, 150.0);
    assert_eq!(config.monitor().stop_window_secs, 240);
    assert_eq!(config.monitor().unsafe_score, 25.0);
    assert_eq!(config.soft_check_grace_secs(), 60);
    assert_eq!(config.escalation_grace_secs(), 90);
    assert_eq!(config.idle_timeout_secs(), 600);
    assert_eq!(config.replan_interval_secs(), 120);
    assert!(!config.telemetry_listener_enabled());
    assert_eq!(config.telemetry_listener_port(), 26000);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.egress_file(), "out/alerts.jsonl");
}

#[test]
fn test_minimal_config_uses_section_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();

    // Only the required escalation section
    let config_content = r#"
[escalation]
soft_check_grace_secs = 45
escalation_grace_secs = 75
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.soft_check_grace_secs(), 45);
    assert_eq!(config.escalation_grace_secs(), 75);
    assert_eq!(config.scorer_timeout_ms(), 2000);
    assert_eq!(config.provider_timeout_ms(), 5000);
    assert_eq!(config.monitor().deviation_threshold_m, 200.0);
    assert_eq!(config.monitor().stop_speed_kmh, 1.0);
    assert_eq!(config.optimizer().safety_weight, 0.7);
    assert_eq!(config.egress_file(), "alerts.jsonl");
    // Disabled unless configured
    assert_eq!(config.idle_timeout_secs(), 0);
    assert_eq!(config.replan_interval_secs(), 0);
}

#[test]
fn test_missing_escalation_section_fails() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[service]\nid = \"x\"\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.service_id(), "saferoute");
    assert_eq!(config.monitor().deviation_threshold_m, 200.0);
}

#[test]
fn test_repo_dev_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml");
    let config = Config::from_file(path).unwrap();
    assert_eq!(config.service_id(), "saferoute-dev");
    assert_eq!(config.soft_check_grace_secs(), 120);
    assert_eq!(config.escalation_grace_secs(), 180);
}
