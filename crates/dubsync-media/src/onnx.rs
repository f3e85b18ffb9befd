//! ONNX Runtime adapters for the collaborator networks.
//!
//! The detector and generator are opaque graphs with a fixed tensor
//! contract; these adapters only move pixels and mel features across that
//! boundary. Exported collaborator models use a single output tensor named
//! `output`:
//!
//! - detector: input `[n, 3, h, w]` RGB in [0,1] -> output `[n, 5]` rows of
//!   `(x1, y1, x2, y2, score)` in input pixel coordinates; a score below the
//!   confidence threshold means no face in that frame.
//! - generator: inputs `[n, 1, n_mels, 16]` mel and `[n, 6, 96, 96]` faces
//!   -> output `[n, 3, 96, 96]` in [0,1].
//!
//! Inference runs on a blocking thread; the sessions are `Mutex`-guarded
//! because the accelerator is not safely shared across concurrent calls.

use async_trait::async_trait;
use dubsync_models::BoundingBox;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::inference::{FaceDetector, MouthGenerator};

/// Minimum detector confidence for a box to count as a face.
const SCORE_THRESHOLD: f32 = 0.5;

fn load_session(model_path: &Path) -> MediaResult<Session> {
    if !model_path.exists() {
        return Err(MediaError::model_not_found(model_path.display().to_string()));
    }
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::inference_failed(format!("ORT read model file: {e}")))?;

    Session::builder()
        .map_err(|e| MediaError::inference_failed(format!("ORT session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::inference_failed(format!("ORT opt level: {e}")))?
        .commit_from_memory(model_bytes.as_slice())
        .map_err(|e| MediaError::inference_failed(format!("ORT load model: {e}")))
}

/// Classify an ONNX Runtime failure: allocation exhaustion is recoverable
/// upstream (the tracker halves its batch), anything else is fatal.
fn classify_ort_error(context: &str, message: String) -> MediaError {
    let lower = message.to_lowercase();
    if lower.contains("alloc") || lower.contains("out of memory") || lower.contains("oom") {
        MediaError::detector_overload(message)
    } else {
        MediaError::inference_failed(format!("{context}: {message}"))
    }
}

/// ONNX-backed face detector collaborator.
#[derive(Debug)]
pub struct OnnxFaceDetector {
    session: Arc<Mutex<Session>>,
}

impl OnnxFaceDetector {
    /// Load the detector graph from disk.
    pub fn load(model_path: impl AsRef<Path>) -> MediaResult<Self> {
        let session = load_session(model_path.as_ref())?;
        debug!(model = %model_path.as_ref().display(), "loaded face detector");
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
        })
    }
}

#[async_trait]
impl FaceDetector for OnnxFaceDetector {
    async fn detect_batch(&self, frames: &[Frame]) -> MediaResult<Vec<Option<BoundingBox>>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }
        let (h, w) = (frames[0].height() as usize, frames[0].width() as usize);
        for f in frames {
            if f.height() as usize != h || f.width() as usize != w {
                return Err(MediaError::inference_failed(
                    "detector batch mixes frame sizes",
                ));
            }
        }

        // HWC u8 -> NCHW f32 in [0,1]
        let n = frames.len();
        let mut data = vec![0f32; n * 3 * h * w];
        for (b, frame) in frames.iter().enumerate() {
            let raw = frame.as_raw();
            for y in 0..h {
                for x in 0..w {
                    let src = (y * w + x) * 3;
                    for c in 0..3 {
                        data[((b * 3 + c) * h + y) * w + x] = raw[src + c] as f32 / 255.0;
                    }
                }
            }
        }

        let session = Arc::clone(&self.session);
        let shape = vec![n, 3, h, w];
        let (out_shape, out_data) =
            run_session(session, vec![(shape, data)], "face detection").await?;

        if out_shape.len() != 2 || out_shape[1] < 5 || out_shape[0] != n {
            return Err(MediaError::inference_failed(format!(
                "unexpected detector output shape: {out_shape:?}"
            )));
        }

        let stride = out_shape[1];
        Ok((0..n)
            .map(|i| {
                let row = &out_data[i * stride..(i + 1) * stride];
                if row[4] < SCORE_THRESHOLD {
                    None
                } else {
                    Some(BoundingBox::new(
                        row[0] as f64,
                        row[1] as f64,
                        row[2] as f64,
                        row[3] as f64,
                    ))
                }
            })
            .collect())
    }
}

/// ONNX-backed lip-sync generator collaborator.
pub struct OnnxMouthGenerator {
    session: Arc<Mutex<Session>>,
}

impl OnnxMouthGenerator {
    /// Load the generator graph from disk.
    pub fn load(model_path: impl AsRef<Path>) -> MediaResult<Self> {
        let session = load_session(model_path.as_ref())?;
        debug!(model = %model_path.as_ref().display(), "loaded mouth generator");
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
        })
    }
}

#[async_trait]
impl MouthGenerator for OnnxMouthGenerator {
    async fn generate(
        &self,
        mel: &Array4<f32>,
        faces: &Array4<f32>,
    ) -> MediaResult<Array4<f32>> {
        let n = faces.shape()[0];
        let mel_input = (
            mel.shape().to_vec(),
            mel.as_standard_layout().iter().copied().collect::<Vec<f32>>(),
        );
        let face_input = (
            faces.shape().to_vec(),
            faces
                .as_standard_layout()
                .iter()
                .copied()
                .collect::<Vec<f32>>(),
        );

        let session = Arc::clone(&self.session);
        let (out_shape, out_data) =
            run_session(session, vec![mel_input, face_input], "mouth generation").await?;

        if out_shape.len() != 4 || out_shape[0] != n || out_shape[1] != 3 {
            return Err(MediaError::inference_failed(format!(
                "unexpected generator output shape: {out_shape:?}"
            )));
        }

        Array4::from_shape_vec(
            (out_shape[0], out_shape[1], out_shape[2], out_shape[3]),
            out_data,
        )
        .map_err(|e| MediaError::inference_failed(format!("generator output layout: {e}")))
    }
}

/// Run a session on a blocking thread with positional f32 tensor inputs,
/// returning the `output` tensor's shape and data.
async fn run_session(
    session: Arc<Mutex<Session>>,
    inputs: Vec<(Vec<usize>, Vec<f32>)>,
    context: &'static str,
) -> MediaResult<(Vec<usize>, Vec<f32>)> {
    tokio::task::spawn_blocking(move || {
        let mut tensors = Vec::with_capacity(inputs.len());
        for (shape, data) in inputs {
            let tensor = Tensor::from_array((shape, data.into_boxed_slice()))
                .map_err(|e| MediaError::inference_failed(format!("ORT tensor: {e}")))?;
            tensors.push(tensor);
        }

        let mut session = session
            .lock()
            .map_err(|_| MediaError::inference_failed("ORT session poisoned"))?;

        let mut tensors = tensors.into_iter();
        let outputs = match (tensors.next(), tensors.next()) {
            (Some(a), None) => session.run(ort::inputs![a]),
            (Some(a), Some(b)) => session.run(ort::inputs![a, b]),
            _ => return Err(MediaError::inference_failed("no input tensors")),
        }
        .map_err(|e| classify_ort_error(context, e.to_string()))?;

        let output = outputs
            .get("output")
            .ok_or_else(|| MediaError::inference_failed("ORT returned no `output` tensor"))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::inference_failed(format!("ORT extract: {e}")))?;

        let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        Ok((shape, data.to_vec()))
    })
    .await
    .map_err(|e| MediaError::inference_failed(format!("inference task panicked: {e}")))?
}
