//! Batch windower.
//!
//! Assembles aligned (face-crop, audio-window) pairs into fixed-size batches
//! in the generator's input layout, and passes source frames and boxes
//! through for compositing. The iterator is lazy, finite, and single-pass:
//! it consumes its inputs, and restarting means rebuilding it from source
//! frames and windows.

use dubsync_models::BoundingBox;
use ndarray::{Array2, Array4};

use crate::frame::Frame;
use crate::tracker::TrackedFace;
use crate::GEN_INPUT_SIZE;

/// One generator batch plus the pass-through data compositing needs.
#[derive(Debug)]
pub struct Batch {
    /// Face crops in model layout `[n, 6, s, s]`: channels 0..3 the
    /// lower-half-masked copy, channels 3..6 the unmasked crop, values in
    /// [0,1]. The generator fills the masked half.
    pub faces: Array4<f32>,
    /// Mel windows stacked as `[n, 1, n_mels, window_width]`.
    pub mel: Array4<f32>,
    /// Source frames, one per tuple, in order.
    pub frames: Vec<Frame>,
    /// Face boxes, one per tuple, in order.
    pub boxes: Vec<BoundingBox>,
}

impl Batch {
    /// Number of tuples in this batch.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Lazy batch producer over the aligned per-frame streams.
///
/// Pairing uses `i % frames.len()` against `windows[i]`: if more windows
/// than frames arrive, frames are reused in a loop. Upstream truncation
/// normally prevents that, but the wraparound is deliberate policy, kept for
/// still-image inputs where a single frame carries the whole track.
pub struct BatchIterator {
    frames: Vec<Frame>,
    windows: Vec<Array2<f32>>,
    tracked: Vec<TrackedFace>,
    batch_size: usize,
    cursor: usize,
}

impl BatchIterator {
    /// Take ownership of the aligned streams.
    ///
    /// `frames` and `tracked` must be the same length; `batch_size` must be
    /// at least 1.
    pub fn new(
        frames: Vec<Frame>,
        windows: Vec<Array2<f32>>,
        tracked: Vec<TrackedFace>,
        batch_size: usize,
    ) -> Self {
        debug_assert_eq!(frames.len(), tracked.len());
        Self {
            frames,
            windows,
            tracked,
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }
}

impl Iterator for BatchIterator {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.windows.len() || self.frames.is_empty() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.windows.len());
        let count = end - self.cursor;
        let size = GEN_INPUT_SIZE as usize;
        let n_mels = self.windows[self.cursor].nrows();
        let window_width = self.windows[self.cursor].ncols();

        let mut faces = Array4::<f32>::zeros((count, 6, size, size));
        let mut mel = Array4::<f32>::zeros((count, 1, n_mels, window_width));
        let mut frames = Vec::with_capacity(count);
        let mut boxes = Vec::with_capacity(count);

        for (slot, i) in (self.cursor..end).enumerate() {
            let idx = i % self.frames.len();
            let tracked = &self.tracked[idx];

            let crop = tracked
                .crop
                .resize(GEN_INPUT_SIZE, GEN_INPUT_SIZE);
            let pixels = crop.image();
            for y in 0..size {
                for x in 0..size {
                    let px = pixels.get_pixel(x as u32, y as u32).0;
                    for c in 0..3 {
                        let value = px[c] as f32 / 255.0;
                        faces[[slot, 3 + c, y, x]] = value;
                        // Lower half of the masked copy stays zero; the
                        // generator synthesizes it from the audio.
                        if y < size / 2 {
                            faces[[slot, c, y, x]] = value;
                        }
                    }
                }
            }

            mel.slice_mut(ndarray::s![slot, 0, .., ..])
                .assign(&self.windows[i]);

            frames.push(self.frames[idx].clone());
            boxes.push(tracked.bbox);
        }

        self.cursor = end;
        Some(Batch {
            faces,
            mel,
            frames,
            boxes,
        })
    }
}
