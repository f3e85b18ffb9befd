//! Report events emitted to a supervising process.
//!
//! The pipeline communicates with its caller through an append-only, ordered
//! stream of JSON events. Progress events may repeat; the stream ends with
//! exactly one terminal event, either `result` or `error`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single event on the report stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportEvent {
    /// Progress update (0-100) with a human-readable stage message.
    Progress { percent: u8, message: String },

    /// Terminal failure. No partial output is valid once this is emitted.
    Error { message: String },

    /// Terminal success with the run summary.
    Result(DubSummary),
}

impl ReportEvent {
    /// Build a progress event, clamping the percentage to 100.
    pub fn progress(percent: u8, message: impl Into<String>) -> Self {
        Self::Progress {
            percent: percent.min(100),
            message: message.into(),
        }
    }

    /// Build a terminal error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportEvent::Error { .. } | ReportEvent::Result(_))
    }
}

/// Summary of a completed dubbing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DubSummary {
    /// Path of the written output container.
    pub output_path: String,
    /// Number of frames synthesized.
    pub frames: usize,
    /// Output duration in seconds, two decimals.
    pub duration: f64,
    /// Wall-clock processing time in seconds, two decimals.
    pub processing_time: f64,
    /// Output file size in megabytes, two decimals.
    pub file_size_mb: f64,
    /// Inference device the run used.
    pub device: String,
    /// Completion timestamp.
    pub completed_at: DateTime<Utc>,
}
