//! Audio-frame alignment.
//!
//! The mel stream runs at a fixed 80 frames per second while the video runs
//! at whatever rate the container declares; this module maps each output
//! frame index onto a fixed-width window of mel columns. The number of
//! windows it emits is authoritative: the video is truncated to it, never
//! padded.

use ndarray::{s, Array2};
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::MEL_FRAMES_PER_SEC;

/// Cut one mel window per output frame.
///
/// Window `i` starts at `floor(i * 80 / fps)` and spans `window_width`
/// columns. Once a window would run past the end of the matrix, a single
/// final window covering the last `window_width` columns is emitted and the
/// sequence stops — that window may overlap the previous one heavily, which
/// is accepted in preference to padding.
pub fn align_mel_windows(
    mel: &Array2<f32>,
    fps: f64,
    window_width: usize,
) -> MediaResult<Vec<Array2<f32>>> {
    if fps <= 0.0 {
        return Err(MediaError::InvalidVideo(format!(
            "non-positive frame rate: {fps}"
        )));
    }
    let total = mel.ncols();
    if total < window_width {
        return Err(MediaError::invalid_audio(format!(
            "mel matrix has {total} columns, need at least {window_width}"
        )));
    }

    let multiplier = MEL_FRAMES_PER_SEC / fps;
    let mut windows = Vec::new();
    let mut i = 0usize;
    loop {
        let start = (i as f64 * multiplier) as usize;
        if start + window_width > total {
            windows.push(mel.slice(s![.., total - window_width..]).to_owned());
            break;
        }
        windows.push(mel.slice(s![.., start..start + window_width]).to_owned());
        i += 1;
    }

    debug!(windows = windows.len(), fps, "aligned mel windows");
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Mel matrix whose column `c` holds the value `c` in every row, so a
    /// window's origin is readable from its first column.
    fn indexed_mel(cols: usize) -> Array2<f32> {
        Array2::from_shape_fn((80, cols), |(_, c)| c as f32)
    }

    fn window_start(w: &Array2<f32>) -> usize {
        w[[0, 0]] as usize
    }

    #[test]
    fn test_windows_are_exact_width() {
        let mel = indexed_mel(64);
        let windows = align_mel_windows(&mel, 25.0, 16).unwrap();
        assert!(windows.iter().all(|w| w.shape() == [80, 16]));
    }

    #[test]
    fn test_starts_follow_frame_multiplier() {
        // 80 / 25 = 3.2 mel columns per video frame, floored per index.
        let mel = indexed_mel(64);
        let windows = align_mel_windows(&mel, 25.0, 16).unwrap();

        let starts: Vec<usize> = windows.iter().map(window_start).collect();
        assert_eq!(&starts[..5], &[0, 3, 6, 9, 12]);

        // start(15) = 48 fits exactly; start(16) = 51 would overrun, so the
        // final window is clamped to the last 16 columns (also 48).
        assert_eq!(starts.len(), 17);
        assert_eq!(*starts.last().unwrap(), 48);
    }

    #[test]
    fn test_final_window_duplicates_rather_than_pads() {
        let mel = indexed_mel(24);
        let windows = align_mel_windows(&mel, 25.0, 16).unwrap();

        // start = 0, 3, 6; start(3) = 9 would need column 25 -> clamped.
        let starts: Vec<usize> = windows.iter().map(window_start).collect();
        assert_eq!(starts, vec![0, 3, 6, 8]);
        assert_eq!(windows.len(), 4);
    }

    #[test]
    fn test_exact_fit_has_no_overrun() {
        let mel = indexed_mel(16);
        let windows = align_mel_windows(&mel, 80.0, 16).unwrap();
        // multiplier 1.0: window 0 fits exactly, window 1 clamps to the same
        // span and terminates.
        assert_eq!(windows.len(), 2);
        assert_eq!(window_start(&windows[0]), 0);
        assert_eq!(window_start(&windows[1]), 0);
    }

    #[test]
    fn test_short_matrix_rejected() {
        let mel = indexed_mel(10);
        let err = align_mel_windows(&mel, 25.0, 16).unwrap_err();
        assert!(matches!(err, MediaError::InvalidAudio(_)));
    }

    #[test]
    fn test_non_positive_fps_rejected() {
        let mel = indexed_mel(32);
        assert!(align_mel_windows(&mel, 0.0, 16).is_err());
    }
}
