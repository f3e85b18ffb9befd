#![deny(unreachable_patterns)]
//! Lip-sync dubbing pipeline core.
//!
//! This crate provides:
//! - Temporal face tracking over sparse detector samples
//! - Audio-frame alignment of a fixed-rate mel stream to a video timeline
//! - Lazy batch windowing in the generator's input layout
//! - Feathered-mask compositing of generated mouth patches
//! - Log-mel feature extraction from 16 kHz mono audio
//! - FFmpeg/FFprobe subprocess I/O for frames, audio, and muxing
//! - ONNX Runtime adapters for the detector/generator collaborators

pub mod audio;
pub mod batcher;
pub mod compositor;
pub mod error;
pub mod frame;
pub mod inference;
pub mod onnx;
pub mod pipeline;
pub mod probe;
pub mod tracker;
pub mod video;

pub use audio::{align_mel_windows, melspectrogram, MelConfig};
pub use batcher::{Batch, BatchIterator};
pub use compositor::composite;
pub use error::{MediaError, MediaResult};
pub use frame::Frame;
pub use inference::{FaceDetector, MouthGenerator};
pub use onnx::{OnnxFaceDetector, OnnxMouthGenerator};
pub use pipeline::{generate_frames, run_dub, synthesize_frames, DubConfig, DubRequest, ProgressSink};
pub use probe::{probe_video, VideoInfo};
pub use tracker::{track_faces, TrackedFace, TrackerConfig};
pub use video::{decode_frames, extract_audio, VideoEncoder};

/// Side length of the square face crop the generator consumes.
pub const GEN_INPUT_SIZE: u32 = 96;

/// Mel time-steps per audio window.
pub const MEL_WINDOW_WIDTH: usize = 16;

/// Mel frames per second of audio (hop 200 at 16 kHz).
pub const MEL_FRAMES_PER_SEC: f64 = 80.0;
