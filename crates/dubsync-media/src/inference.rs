//! Collaborator traits for the neural networks.
//!
//! The face detector and mouth generator are external collaborators with a
//! fixed input/output contract; the pipeline receives them as injected trait
//! objects so the core logic stays testable with deterministic stubs.

use async_trait::async_trait;
use dubsync_models::BoundingBox;
use ndarray::Array4;

use crate::error::MediaResult;
use crate::frame::Frame;

/// Face detector collaborator.
///
/// Must be deterministic for identical pixel input. A frame without a face
/// yields `None` rather than an error; the tracker decides whether that is
/// fatal. A batch that exhausts device memory returns
/// [`MediaError::DetectorOverload`](crate::MediaError::DetectorOverload),
/// which the tracker recovers from by halving its batch size.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Detect the dominant face in each frame, preserving input order.
    async fn detect_batch(&self, frames: &[Frame]) -> MediaResult<Vec<Option<BoundingBox>>>;
}

/// Lip-sync generator collaborator.
///
/// Order-preserving: output patch `i` corresponds to input tuple `i`. The
/// accelerator behind this trait is not safely shared, so the pipeline awaits
/// each batch before submitting the next.
#[async_trait]
pub trait MouthGenerator: Send + Sync {
    /// Generate mouth patches for a batch.
    ///
    /// `mel` has shape `[n, 1, n_mels, window_width]`; `faces` has shape
    /// `[n, 6, s, s]` (masked crop channels 0..3, unmasked 3..6, values in
    /// [0,1]). The result has shape `[n, 3, s, s]` with values in [0,1].
    async fn generate(
        &self,
        mel: &Array4<f32>,
        faces: &Array4<f32>,
    ) -> MediaResult<Array4<f32>>;
}
