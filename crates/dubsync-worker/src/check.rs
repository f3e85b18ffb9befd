//! Environment check.
//!
//! `dubsync-worker check` reports what a run would find: media toolchain
//! presence, model files, and the resolved device. Read-only; nothing is
//! downloaded or written.

use serde::Serialize;
use serde_json::json;

use crate::config::WorkerConfig;

/// Environment status for the `check` subcommand.
#[derive(Debug, Serialize)]
pub struct EnvironmentReport {
    pub ffmpeg: bool,
    pub ffprobe: bool,
    pub detector_model: ModelStatus,
    pub generator_model: ModelStatus,
    pub device: String,
}

/// Presence and size of one model file.
#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub path: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<f64>,
}

impl ModelStatus {
    fn probe(path: &std::path::Path) -> Self {
        let size_mb = std::fs::metadata(path)
            .ok()
            .map(|m| (m.len() as f64 / (1024.0 * 1024.0) * 10.0).round() / 10.0);
        Self {
            path: path.display().to_string(),
            exists: size_mb.is_some(),
            size_mb,
        }
    }
}

/// Inspect the environment for the given configuration.
pub fn environment_report(config: &WorkerConfig) -> EnvironmentReport {
    EnvironmentReport {
        ffmpeg: which::which("ffmpeg").is_ok(),
        ffprobe: which::which("ffprobe").is_ok(),
        detector_model: ModelStatus::probe(&config.detector_model),
        generator_model: ModelStatus::probe(&config.generator_model),
        device: config.device.to_string(),
    }
}

/// Render the report as the stream's terminal `result` event.
pub fn report_event_json(report: &EnvironmentReport) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("type".to_string(), json!("result"));
    if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(report) {
        map.extend(fields);
    }
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_event_shape() {
        let config = WorkerConfig::default();
        let report = environment_report(&config);
        let value = report_event_json(&report);

        assert_eq!(value["type"], "result");
        assert!(value["ffmpeg"].is_boolean());
        assert_eq!(value["device"], "cpu");
        assert_eq!(
            value["detector_model"]["path"],
            config.detector_model.display().to_string()
        );
    }

    #[test]
    fn test_missing_model_has_no_size() {
        let status = ModelStatus::probe(std::path::Path::new("/nonexistent/model.onnx"));
        assert!(!status.exists);
        assert!(status.size_mb.is_none());
    }

    #[test]
    fn test_present_model_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, vec![0u8; 1024 * 1024]).unwrap();

        let status = ModelStatus::probe(&path);
        assert!(status.exists);
        assert_eq!(status.size_mb, Some(1.0));
    }
}
