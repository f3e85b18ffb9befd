//! Temporal face tracker.
//!
//! Running the detector on every frame of a clip is the most expensive part
//! of the pipeline, and raw per-frame detections jitter. The tracker instead
//! samples a handful of frames, detects on those, linearly interpolates boxes
//! for the frames in between, and smooths the result with a short sliding
//! window before cropping.

use dubsync_models::{BoundingBox, PadSpec};
use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::inference::FaceDetector;

/// Tracker tuning knobs.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Upper bound on detector invocations per clip (approximate; the last
    /// frame is always sampled in addition).
    pub max_samples: usize,
    /// Padding applied to each detected box before clamping.
    pub pads: PadSpec,
    /// Sliding mean window over per-frame boxes; 0 disables smoothing.
    pub smoothing_window: usize,
    /// Initial detector batch size; halved on overload.
    pub detect_batch_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_samples: 8,
            pads: PadSpec::default(),
            smoothing_window: 5,
            detect_batch_size: 8,
        }
    }
}

/// A face crop and the box it was cut from, one per frame.
#[derive(Debug, Clone)]
pub struct TrackedFace {
    pub crop: Frame,
    pub bbox: BoundingBox,
}

/// Track the dominant face across `frames`, returning one crop+box per frame.
///
/// Fatal conditions: the detector returning `None` for any sampled frame
/// (`NoFaceDetected`), or overloading even at batch size 1.
pub async fn track_faces(
    frames: &[Frame],
    detector: &dyn FaceDetector,
    config: &TrackerConfig,
) -> MediaResult<Vec<TrackedFace>> {
    let n = frames.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let sample_indices = sample_indices(n, config.max_samples);
    info!(
        sampled = sample_indices.len(),
        total = n,
        "sampling frames for face detection"
    );

    let sampled: Vec<Frame> = sample_indices.iter().map(|&i| frames[i].clone()).collect();
    let detections = detect_with_backoff(detector, &sampled, config.detect_batch_size).await?;

    // Pad and clamp; a missed detection on a sampled frame is fatal — an
    // interpolated stand-in would silently desynchronize mouth placement.
    let mut sampled_boxes = Vec::with_capacity(detections.len());
    for (det, frame) in detections.into_iter().zip(&sampled) {
        let raw = det.ok_or(MediaError::NoFaceDetected)?;
        sampled_boxes.push(raw.pad_clamped(&config.pads, frame.width(), frame.height()));
    }

    let mut boxes = interpolate_boxes(n, &sample_indices, &sampled_boxes);

    if config.smoothing_window > 0 {
        boxes = smooth_boxes(&boxes, config.smoothing_window);
    }

    let mut tracked = Vec::with_capacity(n);
    for (frame, bbox) in frames.iter().zip(boxes) {
        let crop = frame.crop(&bbox.crop_rect())?;
        tracked.push(TrackedFace { crop, bbox });
    }
    Ok(tracked)
}

/// Choose the frame indices to run the detector on.
///
/// Short clips are detected in full; longer ones at a stride of roughly
/// `n / max_samples`, with the last frame forced into the set so
/// interpolation has an anchor at both ends.
fn sample_indices(n: usize, max_samples: usize) -> Vec<usize> {
    if n <= 10 {
        return (0..n).collect();
    }
    let stride = (n / max_samples.max(1)).max(1);
    let mut indices: Vec<usize> = (0..n).step_by(stride).collect();
    if indices.last() != Some(&(n - 1)) {
        indices.push(n - 1);
    }
    indices
}

/// Run detection over `sampled` in sub-batches, halving the batch size each
/// time the detector reports overload. Results come back in sample order.
async fn detect_with_backoff(
    detector: &dyn FaceDetector,
    sampled: &[Frame],
    initial_batch_size: usize,
) -> MediaResult<Vec<Option<BoundingBox>>> {
    let mut batch_size = initial_batch_size.max(1);
    loop {
        match detect_in_batches(detector, sampled, batch_size).await {
            Ok(detections) => return Ok(detections),
            Err(MediaError::DetectorOverload(msg)) => {
                if batch_size == 1 {
                    return Err(MediaError::DetectorOverload(msg));
                }
                batch_size /= 2;
                warn!(batch_size, "detector overloaded, retrying with smaller batches");
            }
            Err(e) => return Err(e),
        }
    }
}

async fn detect_in_batches(
    detector: &dyn FaceDetector,
    sampled: &[Frame],
    batch_size: usize,
) -> MediaResult<Vec<Option<BoundingBox>>> {
    let mut detections = Vec::with_capacity(sampled.len());
    for chunk in sampled.chunks(batch_size) {
        detections.extend(detector.detect_batch(chunk).await?);
    }
    Ok(detections)
}

/// Fill one box per frame from the sampled boxes.
///
/// Interior frames of each consecutive sample pair `(a, b)` get the linear
/// blend over the half-open range `[a, b)`; every sampled index is then
/// written exactly once from its own detection, so sample boxes are exact
/// regardless of stride arithmetic.
fn interpolate_boxes(
    n: usize,
    sample_indices: &[usize],
    sampled_boxes: &[BoundingBox],
) -> Vec<BoundingBox> {
    debug_assert_eq!(sample_indices.len(), sampled_boxes.len());

    let mut boxes = vec![BoundingBox::new(0.0, 0.0, 0.0, 0.0); n];

    for (pair_i, pair_b) in sample_indices.windows(2).zip(sampled_boxes.windows(2)) {
        let (a, b) = (pair_i[0], pair_i[1]);
        for j in a..b {
            let t = (j - a) as f64 / (b - a) as f64;
            boxes[j] = BoundingBox::lerp(&pair_b[0], &pair_b[1], t);
        }
    }
    for (&idx, &bx) in sample_indices.iter().zip(sampled_boxes) {
        boxes[idx] = bx;
    }
    boxes
}

/// Sliding mean over a forward-looking window of `window` boxes.
///
/// The last `window - 1` frames reuse the tail window, so the sequence ends
/// as steady as it runs. Trades a slight temporal lag for far less jitter.
fn smooth_boxes(boxes: &[BoundingBox], window: usize) -> Vec<BoundingBox> {
    let n = boxes.len();
    (0..n)
        .map(|i| {
            let slice = if i + window <= n {
                &boxes[i..i + window]
            } else {
                &boxes[n.saturating_sub(window)..]
            };
            BoundingBox::mean(slice).expect("smoothing window is non-empty")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic stub: returns a box derived from the frame's top-left
    /// pixel, or `None` when that pixel is zero.
    struct PixelBoxDetector {
        calls: AtomicUsize,
        /// Batches larger than this fail with overload.
        overload_above: Option<usize>,
    }

    impl PixelBoxDetector {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                overload_above: None,
            }
        }

        fn overloading_above(limit: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                overload_above: Some(limit),
            }
        }
    }

    #[async_trait]
    impl FaceDetector for PixelBoxDetector {
        async fn detect_batch(&self, frames: &[Frame]) -> MediaResult<Vec<Option<BoundingBox>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.overload_above {
                if frames.len() > limit {
                    return Err(MediaError::detector_overload("stub OOM"));
                }
            }
            Ok(frames
                .iter()
                .map(|f| {
                    let v = f.image().get_pixel(0, 0).0[0] as f64;
                    if v == 0.0 {
                        None
                    } else {
                        Some(BoundingBox::new(v, v, v + 20.0, v + 20.0))
                    }
                })
                .collect())
        }
    }

    fn frames_with_values(values: &[u8]) -> Vec<Frame> {
        values
            .iter()
            .map(|&v| Frame::solid(120, 120, [v, 0, 0]))
            .collect()
    }

    fn no_smoothing() -> TrackerConfig {
        TrackerConfig {
            smoothing_window: 0,
            pads: PadSpec::new(0, 0, 0, 0),
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn test_sample_indices_short_clip_samples_all() {
        assert_eq!(sample_indices(10, 8), (0..10).collect::<Vec<_>>());
        assert_eq!(sample_indices(1, 8), vec![0]);
    }

    #[test]
    fn test_sample_indices_includes_endpoints() {
        let indices = sample_indices(100, 8);
        assert_eq!(indices[0], 0);
        assert_eq!(*indices.last().unwrap(), 99);
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sample_indices_never_empty() {
        for n in 1..50 {
            assert!(!sample_indices(n, 8).is_empty());
        }
    }

    #[test]
    fn test_interpolation_endpoints_exact() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(30.0, 30.0, 60.0, 60.0);
        let boxes = interpolate_boxes(7, &[0, 6], &[a, b]);

        assert_eq!(boxes[0], a);
        assert_eq!(boxes[6], b);
        // Midpoint is the blend
        assert_eq!(boxes[3].x1, 15.0);
        assert_eq!(boxes[3].y2, 35.0);
    }

    #[test]
    fn test_interpolation_duplicate_sample_index() {
        // A redundantly appended final sample (a == b) must not divide by zero
        // and must leave the final box exact.
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let boxes = interpolate_boxes(3, &[0, 2, 2], &[a, a, a]);
        assert_eq!(boxes[2], a);
    }

    #[test]
    fn test_smoothing_constant_sequence_unchanged() {
        let b = BoundingBox::new(5.0, 5.0, 25.0, 25.0);
        let smoothed = smooth_boxes(&vec![b; 12], 5);
        assert!(smoothed.iter().all(|s| *s == b));
    }

    #[test]
    fn test_smoothing_tail_window() {
        let boxes: Vec<BoundingBox> = (0..6)
            .map(|i| BoundingBox::new(i as f64, 0.0, i as f64 + 1.0, 1.0))
            .collect();
        let smoothed = smooth_boxes(&boxes, 3);

        // First entry averages indices 0..3
        assert!((smoothed[0].x1 - 1.0).abs() < 1e-9);
        // Last two entries share the tail window 3..6
        assert!((smoothed[4].x1 - 4.0).abs() < 1e-9);
        assert_eq!(smoothed[4], smoothed[5]);
    }

    #[tokio::test]
    async fn test_track_short_clip_detects_every_frame() {
        let frames = frames_with_values(&[50; 4]);
        let detector = PixelBoxDetector::new();
        let tracked = track_faces(&frames, &detector, &no_smoothing())
            .await
            .unwrap();

        assert_eq!(tracked.len(), 4);
        for t in &tracked {
            assert_eq!(t.bbox, BoundingBox::new(50.0, 50.0, 70.0, 70.0));
            assert_eq!(t.crop.width(), 20);
            assert_eq!(t.crop.height(), 20);
        }
    }

    #[tokio::test]
    async fn test_track_single_frame() {
        let frames = frames_with_values(&[30]);
        let detector = PixelBoxDetector::new();
        let tracked = track_faces(&frames, &detector, &no_smoothing())
            .await
            .unwrap();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].bbox.x1, 30.0);
    }

    #[tokio::test]
    async fn test_track_missing_face_is_fatal() {
        // Third frame has a zero pixel -> stub reports no face.
        let frames = frames_with_values(&[40, 40, 0, 40]);
        let detector = PixelBoxDetector::new();
        let err = track_faces(&frames, &detector, &no_smoothing())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NoFaceDetected));
    }

    #[tokio::test]
    async fn test_track_boxes_clamped_under_extreme_pads() {
        let frames = frames_with_values(&[90; 3]);
        let detector = PixelBoxDetector::new();
        let config = TrackerConfig {
            pads: PadSpec::new(500, 500, 500, 500),
            smoothing_window: 0,
            ..TrackerConfig::default()
        };
        let tracked = track_faces(&frames, &detector, &config).await.unwrap();
        for t in &tracked {
            assert!(t.bbox.x1 >= 0.0 && t.bbox.y1 >= 0.0);
            assert!(t.bbox.x2 <= 120.0 && t.bbox.y2 <= 120.0);
            assert_eq!(t.crop.width(), 120);
        }
    }

    #[tokio::test]
    async fn test_detector_backoff_recovers() {
        let frames = frames_with_values(&[60; 8]);
        let detector = PixelBoxDetector::overloading_above(2);
        let tracked = track_faces(&frames, &detector, &no_smoothing())
            .await
            .unwrap();
        assert_eq!(tracked.len(), 8);
        // 8 -> overload, 4 -> overload, 2 -> four successful chunks.
        assert!(detector.calls.load(Ordering::SeqCst) >= 6);
    }

    #[tokio::test]
    async fn test_detector_backoff_fatal_at_batch_one() {
        let frames = frames_with_values(&[60; 4]);
        let detector = PixelBoxDetector::overloading_above(0);
        let err = track_faces(&frames, &detector, &no_smoothing())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DetectorOverload(_)));
    }
}
