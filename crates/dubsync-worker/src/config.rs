//! Worker configuration.
//!
//! Precedence: CLI flag > `DUBSYNC_*` environment variable > default.

use dubsync_media::{DubConfig, MelConfig, TrackerConfig};
use dubsync_models::{Device, PadSpec};
use std::path::PathBuf;

use crate::cli::RunArgs;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Face detector ONNX model path
    pub detector_model: PathBuf,
    /// Mouth generator ONNX model path
    pub generator_model: PathBuf,
    /// Frame rate assumed for still-image inputs
    pub fps_for_still: f64,
    /// Integer downscale factor applied while decoding
    pub resize_factor: u32,
    /// Box padding applied before cropping
    pub pads: PadSpec,
    /// Upper bound on detector sampling per clip
    pub max_samples: usize,
    /// Box smoothing window; 0 disables
    pub smoothing_window: usize,
    /// Detector batch size
    pub detect_batch_size: usize,
    /// Generator batch size
    pub gen_batch_size: usize,
    /// Inference device
    pub device: Device,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            detector_model: PathBuf::from("models/face_detector.onnx"),
            generator_model: PathBuf::from("models/mouth_generator.onnx"),
            fps_for_still: 25.0,
            resize_factor: 1,
            pads: PadSpec::default(),
            max_samples: 8,
            smoothing_window: 5,
            detect_batch_size: 8,
            gen_batch_size: 32,
            device: Device::Cpu,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            detector_model: std::env::var("DUBSYNC_DETECTOR_MODEL")
                .map(PathBuf::from)
                .unwrap_or(defaults.detector_model),
            generator_model: std::env::var("DUBSYNC_GENERATOR_MODEL")
                .map(PathBuf::from)
                .unwrap_or(defaults.generator_model),
            fps_for_still: env_parsed("DUBSYNC_STILL_FPS").unwrap_or(defaults.fps_for_still),
            resize_factor: env_parsed("DUBSYNC_RESIZE_FACTOR").unwrap_or(defaults.resize_factor),
            pads: defaults.pads,
            max_samples: env_parsed("DUBSYNC_MAX_SAMPLES").unwrap_or(defaults.max_samples),
            smoothing_window: env_parsed("DUBSYNC_SMOOTHING_WINDOW")
                .unwrap_or(defaults.smoothing_window),
            detect_batch_size: env_parsed("DUBSYNC_DETECT_BATCH")
                .unwrap_or(defaults.detect_batch_size),
            gen_batch_size: env_parsed("DUBSYNC_GEN_BATCH").unwrap_or(defaults.gen_batch_size),
            device: std::env::var("DUBSYNC_DEVICE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.device),
        }
    }

    /// Apply CLI overrides on top of this config.
    pub fn with_overrides(mut self, args: &RunArgs) -> Self {
        if let Some(path) = &args.detector_model {
            self.detector_model = path.clone();
        }
        if let Some(path) = &args.generator_model {
            self.generator_model = path.clone();
        }
        if let Some(fps) = args.fps {
            self.fps_for_still = fps;
        }
        if let Some(factor) = args.resize_factor {
            self.resize_factor = factor;
        }
        if let Some(pads) = args.pads {
            self.pads = pads;
        }
        if let Some(size) = args.detect_batch_size {
            self.detect_batch_size = size;
        }
        if let Some(size) = args.batch_size {
            self.gen_batch_size = size;
        }
        if let Some(window) = args.smoothing_window {
            self.smoothing_window = window;
        }
        if let Some(device) = args.device {
            self.device = device;
        }
        self
    }

    /// Build the pipeline configuration.
    pub fn dub_config(&self) -> DubConfig {
        DubConfig {
            fps_for_still: self.fps_for_still,
            resize_factor: self.resize_factor,
            tracker: TrackerConfig {
                max_samples: self.max_samples,
                pads: self.pads,
                smoothing_window: self.smoothing_window,
                detect_batch_size: self.detect_batch_size,
            },
            gen_batch_size: self.gen_batch_size,
            mel_window_width: dubsync_media::MEL_WINDOW_WIDTH,
            mel: MelConfig::default(),
            device: self.device,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
