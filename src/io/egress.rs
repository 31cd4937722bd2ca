//! Alert egress - writes dispatched alerts to file
//!
//! Alerts are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::io::dispatch::AlertMessage;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Egress writer for alert messages
pub struct AlertLog {
    file_path: String,
}

impl AlertLog {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "alert_log_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write an alert to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_message(&self, message: &AlertMessage) -> bool {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "alert_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, file = %self.file_path, "alert_egress_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "alert_written");

        Ok(())
    }

    /// Consume the dispatch channel, writing until shutdown or close
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<AlertMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("alert_writer_started");

        loop {
            tokio::select! {
                message = rx.recv() => {
                    match message {
                        Some(m) => {
                            self.write_message(&m);
                        }
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        // Drain whatever is already queued before exiting
                        while let Ok(m) = rx.try_recv() {
                            self.write_message(&m);
                        }
                        break;
                    }
                }
            }
        }

        info!("alert_writer_stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::dispatch::{AnomalyPayload, PhaseChangePayload};
    use std::fs;
    use tempfile::tempdir;

    fn anomaly_message() -> AlertMessage {
        AlertMessage::Anomaly(AnomalyPayload {
            service: Some("test".to_string()),
            traveler: "t1".to_string(),
            kind: "route_deviation".to_string(),
            lat: 28.6139,
            lng: 77.2090,
            ts: 1736012345678,
        })
    }

    #[test]
    fn test_write_message() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("alerts.jsonl");
        let log = AlertLog::new(file_path.to_str().unwrap());

        assert!(log.write_message(&anomaly_message()));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["type"], "anomaly");
        assert_eq!(parsed["traveler"], "t1");
        assert_eq!(parsed["kind"], "route_deviation");
        assert_eq!(parsed["ts"], 1736012345678_u64);
    }

    #[test]
    fn test_append_multiple_messages() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("alerts.jsonl");
        let log = AlertLog::new(file_path.to_str().unwrap());

        log.write_message(&anomaly_message());
        log.write_message(&AlertMessage::PhaseChange(PhaseChangePayload {
            service: None,
            traveler: "t1".to_string(),
            from: "normal".to_string(),
            to: "soft_check".to_string(),
            trigger: Some("route_deviation".to_string()),
            ts: 1736012345999,
        }));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        for line in &lines {
            let _parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        }

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["type"], "phase_change");
        assert_eq!(second["trigger"], "route_deviation");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("dir").join("alerts.jsonl");
        let log = AlertLog::new(nested.to_str().unwrap());

        assert!(log.write_message(&anomaly_message()));
        assert!(nested.exists());
    }

    #[tokio::test]
    async fn test_run_consumes_channel() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("alerts.jsonl");
        let log = AlertLog::new(file_path.to_str().unwrap());

        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(anomaly_message()).await.unwrap();
        drop(tx); // close channel so run() exits

        log.run(rx, shutdown_rx).await;

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
