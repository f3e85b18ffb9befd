//! Error types for the dubbing pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during dubbing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("No face detected in a sampled frame")]
    NoFaceDetected,

    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("Detector out of memory: {0}")]
    DetectorOverload(String),

    #[error("Encoding failed: {0}")]
    EncodingFailure(String),

    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an invalid-audio error.
    pub fn invalid_audio(message: impl Into<String>) -> Self {
        Self::InvalidAudio(message.into())
    }

    /// Create a detector-overload error.
    pub fn detector_overload(message: impl Into<String>) -> Self {
        Self::DetectorOverload(message.into())
    }

    /// Create an encoding-failure error.
    pub fn encoding_failure(message: impl Into<String>) -> Self {
        Self::EncodingFailure(message.into())
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an inference failure error.
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::InferenceFailed(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }
}
