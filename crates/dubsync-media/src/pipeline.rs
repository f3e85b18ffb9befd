//! End-to-end dubbing pipeline.
//!
//! Strictly ordered, single-pass: decode -> mel -> align -> track -> batch ->
//! generate -> composite -> encode. Generation is awaited batch by batch (the
//! accelerator behind the generator is not safely shared), and output frames
//! are written in input order. A fatal error aborts the whole run; a partial
//! result would silently desynchronize audio and video.

use dubsync_models::{Device, DubSummary};
use metrics::{counter, histogram};
use ndarray::{s, Array2};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use crate::audio::{align_mel_windows, load_wav_16k_mono, melspectrogram, MelConfig};
use crate::batcher::BatchIterator;
use crate::compositor::composite;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::inference::{FaceDetector, MouthGenerator};
use crate::tracker::{track_faces, TrackedFace, TrackerConfig};
use crate::video::{decode_frames, extract_audio, VideoEncoder};
use crate::MEL_WINDOW_WIDTH;

/// Progress consumer. The pipeline reports stage progress through this; the
/// terminal result/error event is the caller's to emit, exactly once.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, percent: u8, message: &str);
}

/// Pipeline tuning knobs with the reference-configuration defaults.
#[derive(Debug, Clone)]
pub struct DubConfig {
    /// Frame rate assumed when the face input is a still image.
    pub fps_for_still: f64,
    /// Integer downscale applied while decoding video frames.
    pub resize_factor: u32,
    /// Face tracker settings.
    pub tracker: TrackerConfig,
    /// Generator batch size.
    pub gen_batch_size: usize,
    /// Mel time-steps per audio window.
    pub mel_window_width: usize,
    /// Mel extraction parameters.
    pub mel: MelConfig,
    /// Device the collaborators run on (reporting only; the collaborators
    /// arrive already bound to it).
    pub device: Device,
}

impl Default for DubConfig {
    fn default() -> Self {
        Self {
            fps_for_still: 25.0,
            resize_factor: 1,
            tracker: TrackerConfig::default(),
            gen_batch_size: 32,
            mel_window_width: MEL_WINDOW_WIDTH,
            mel: MelConfig::default(),
            device: Device::Cpu,
        }
    }
}

/// One dubbing job.
#[derive(Debug, Clone)]
pub struct DubRequest {
    pub face_path: PathBuf,
    pub audio_path: PathBuf,
    pub output_path: PathBuf,
    pub config: DubConfig,
}

/// Run a complete dubbing job and return the result summary.
pub async fn run_dub(
    request: &DubRequest,
    detector: &dyn FaceDetector,
    generator: &dyn MouthGenerator,
    sink: &dyn ProgressSink,
) -> MediaResult<DubSummary> {
    let started = Instant::now();
    let config = &request.config;

    if !request.face_path.exists() {
        return Err(MediaError::MissingInput(request.face_path.clone()));
    }
    if !request.audio_path.exists() {
        return Err(MediaError::MissingInput(request.audio_path.clone()));
    }

    sink.progress(0, &format!("using device: {}", config.device));

    // ---- 1. Decode frames ----
    sink.progress(5, "reading video frames...");
    let (mut frames, fps) =
        decode_frames(&request.face_path, config.resize_factor, config.fps_for_still).await?;
    sink.progress(
        10,
        &format!("read {} frames ({fps:.1} fps)", frames.len()),
    );

    // ---- 2. Audio features ----
    sink.progress(15, "processing audio...");
    let workdir = tempfile::tempdir()?;
    let wav_path = workdir.path().join("audio_16k.wav");
    extract_audio(&request.audio_path, &wav_path).await?;
    let samples = load_wav_16k_mono(&wav_path)?;
    let mel = melspectrogram(&samples, &config.mel)?;
    let windows = align_mel_windows(&mel, fps, config.mel_window_width)?;
    sink.progress(20, &format!("audio processed: {} windows", windows.len()));

    // The window count is authoritative; drop trailing frames with no audio.
    frames.truncate(windows.len());
    let (frame_w, frame_h) = (frames[0].width(), frames[0].height());

    // ---- 3. Face tracking ----
    sink.progress(25, "detecting faces...");
    sink.progress(27, "sampling frames for face detection...");
    let tracked = track_faces(&frames, detector, &config.tracker).await?;
    sink.progress(40, "face detection complete");

    // ---- 4. Generator ready ----
    // Collaborators arrive pre-loaded; this marks the stage boundary for
    // callers that show a staged progress bar.
    sink.progress(45, "preparing mouth generator...");
    sink.progress(50, "generator ready");

    // ---- 5. Synthesis ----
    sink.progress(55, "starting mouth synthesis...");
    let total = windows.len();
    let output_frames = generate_frames(
        frames,
        windows,
        tracked,
        config.gen_batch_size,
        generator,
        |batch_idx, total_batches, frames_done| {
            let percent = 55 + (batch_idx as f64 / total_batches as f64 * 35.0) as u8;
            let speed = frames_done as f64 / started.elapsed().as_secs_f64().max(0.001);
            sink.progress(
                percent.min(90),
                &format!("synthesizing... {frames_done}/{total} frames ({speed:.1} fps)"),
            );
        },
    )
    .await?;

    // ---- 6. Mux ----
    sink.progress(92, "muxing audio and video...");
    let mut encoder = VideoEncoder::new(
        &request.output_path,
        frame_w,
        frame_h,
        fps,
        &request.audio_path,
    )
    .await?;
    for frame in &output_frames {
        encoder.write_frame(frame).await?;
    }
    let size_bytes = encoder.finish().await?;

    let processing_time = started.elapsed().as_secs_f64();
    let summary = DubSummary {
        output_path: request.output_path.display().to_string(),
        frames: output_frames.len(),
        duration: round2(output_frames.len() as f64 / fps),
        processing_time: round2(processing_time),
        file_size_mb: round2(size_bytes as f64 / (1024.0 * 1024.0)),
        device: config.device.to_string(),
        completed_at: chrono::Utc::now(),
    };

    info!(
        frames = summary.frames,
        seconds = summary.processing_time,
        "dub complete"
    );
    sink.progress(100, "complete");
    Ok(summary)
}

/// Generate and composite output frames from the aligned streams.
///
/// Batches are consumed strictly in order; `on_batch` is called after each
/// with `(batch_index, total_batches, frames_done)`.
pub async fn generate_frames(
    frames: Vec<Frame>,
    windows: Vec<Array2<f32>>,
    tracked: Vec<TrackedFace>,
    gen_batch_size: usize,
    generator: &dyn MouthGenerator,
    mut on_batch: impl FnMut(usize, usize, usize) + Send,
) -> MediaResult<Vec<Frame>> {
    let total = windows.len();
    let batch_size = gen_batch_size.max(1);
    let total_batches = total.div_ceil(batch_size).max(1);

    let mut output_frames = Vec::with_capacity(total);
    let batcher = BatchIterator::new(frames, windows, tracked, batch_size);

    for (batch_idx, batch) in batcher.enumerate() {
        let gen_started = Instant::now();
        let patches = generator.generate(&batch.mel, &batch.faces).await?;
        histogram!("dubsync_generation_seconds").record(gen_started.elapsed().as_secs_f64());

        if patches.shape()[0] != batch.len() {
            return Err(MediaError::inference_failed(format!(
                "generator returned {} patches for a batch of {}",
                patches.shape()[0],
                batch.len()
            )));
        }

        for (i, (frame, bbox)) in batch.frames.iter().zip(&batch.boxes).enumerate() {
            let patch = patches.slice(s![i, .., .., ..]);
            output_frames.push(composite(&patch, frame, bbox)?);
        }

        counter!("dubsync_frames_processed_total").increment(batch.len() as u64);
        on_batch(batch_idx, total_batches, output_frames.len());
    }

    Ok(output_frames)
}

/// In-memory half of the pipeline: tracked faces plus aligned windows in,
/// composited frames out. Everything here runs without FFmpeg, which is what
/// the end-to-end tests exercise.
pub async fn synthesize_frames(
    mut frames: Vec<Frame>,
    windows: Vec<Array2<f32>>,
    detector: &dyn FaceDetector,
    generator: &dyn MouthGenerator,
    config: &DubConfig,
) -> MediaResult<Vec<Frame>> {
    frames.truncate(windows.len());
    let tracked = track_faces(&frames, detector, &config.tracker).await?;
    generate_frames(
        frames,
        windows,
        tracked,
        config.gen_batch_size,
        generator,
        |_, _, _| {},
    )
    .await
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
