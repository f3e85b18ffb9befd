//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] dubsync_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the failure came from missing/invalid user input rather than
    /// the pipeline itself. Callers use this to phrase the error event.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            WorkerError::Media(dubsync_media::MediaError::MissingInput(_))
                | WorkerError::Media(dubsync_media::MediaError::InvalidAudio(_))
                | WorkerError::Media(dubsync_media::MediaError::InvalidVideo(_))
                | WorkerError::ConfigError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_input_error_classification() {
        let err: WorkerError =
            dubsync_media::MediaError::MissingInput(PathBuf::from("x.mp4")).into();
        assert!(err.is_input_error());

        let err: WorkerError = dubsync_media::MediaError::NoFaceDetected.into();
        assert!(!err.is_input_error());
    }
}
