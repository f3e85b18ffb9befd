//! Frame compositor.
//!
//! Places a generated mouth patch back into its source frame. Replacing the
//! whole detected face would show seams at the jaw and hairline and amplify
//! box jitter, so only the lower face is taken from the generated patch,
//! through a soft-edged blend mask; identity, lighting, and hair motion stay
//! with the original frame.

use dubsync_models::{BoundingBox, CropRect};
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::{Array2, ArrayView3};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Fraction of box height where the vertical blend ramp begins.
const BLEND_START: f32 = 0.35;
/// Fraction of box height where the generated patch fully takes over.
const BLEND_END: f32 = 0.55;
/// Fraction of box width feathered on each side.
const EDGE_FEATHER: f32 = 0.15;
/// Gaussian sigma applied to the assembled mask.
const MASK_BLUR_SIGMA: f32 = 5.0;

/// Blend `patch` (`[3, s, s]`, values in [0,1]) into a copy of
/// `source_frame` at `bbox`. Pixels outside the box are untouched.
pub fn composite(
    patch: &ArrayView3<f32>,
    source_frame: &Frame,
    bbox: &BoundingBox,
) -> MediaResult<Frame> {
    let rect = bbox.crop_rect();
    if rect.width == 0 || rect.height == 0 {
        return Err(MediaError::InvalidVideo(format!(
            "degenerate face box {}x{}",
            rect.width, rect.height
        )));
    }

    let patch_img = patch_to_image(patch)?;
    let resized = image::imageops::resize(
        &patch_img,
        rect.width,
        rect.height,
        image::imageops::FilterType::Triangle,
    );

    let mask = build_blend_mask(rect.height, rect.width);

    let mut output = source_frame.clone();
    blend_region(&mut output, &resized, &mask, &rect);
    Ok(output)
}

/// Convert a `[3, s, s]` float patch to an RGB8 image.
fn patch_to_image(patch: &ArrayView3<f32>) -> MediaResult<RgbImage> {
    let shape = patch.shape();
    if shape.len() != 3 || shape[0] != 3 {
        return Err(MediaError::inference_failed(format!(
            "expected patch shape [3, h, w], got {shape:?}"
        )));
    }
    let (h, w) = (shape[1] as u32, shape[2] as u32);
    let mut img = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let px = [
                to_u8(patch[[0, y as usize, x as usize]]),
                to_u8(patch[[1, y as usize, x as usize]]),
                to_u8(patch[[2, y as usize, x as usize]]),
            ];
            img.put_pixel(x, y, Rgb(px));
        }
    }
    Ok(img)
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Build the per-pixel blend mask for a box of the given size.
///
/// Vertical gradient (0 above `BLEND_START`, 1 below `BLEND_END`, linear
/// ramp between), a linear feather over the outer `EDGE_FEATHER` of columns
/// on each side, then a Gaussian blur to soften the piecewise-linear kinks.
/// Recomputed per frame: the box size varies frame to frame.
pub fn build_blend_mask(height: u32, width: u32) -> Array2<f32> {
    let (h, w) = (height as usize, width as usize);
    let blend_start = (h as f32 * BLEND_START) as usize;
    let blend_end = (h as f32 * BLEND_END) as usize;

    let mut mask = Array2::<f32>::zeros((h, w));
    for row in 0..h {
        let weight = if row < blend_start {
            0.0
        } else if row >= blend_end {
            1.0
        } else {
            (row - blend_start) as f32 / (blend_end - blend_start) as f32
        };
        mask.row_mut(row).fill(weight);
    }

    let edge_w = ((w as f32 * EDGE_FEATHER) as usize).max(1);
    for col in 0..edge_w.min(w) {
        let factor = col as f32 / edge_w as f32;
        for row in 0..h {
            mask[[row, col]] *= factor;
            mask[[row, w - 1 - col]] *= factor;
        }
    }

    blur_mask(&mask)
}

/// Gaussian-blur the mask via an `image` luma buffer.
fn blur_mask(mask: &Array2<f32>) -> Array2<f32> {
    let (h, w) = (mask.nrows(), mask.ncols());
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
            Luma([mask[[y as usize, x as usize]]])
        });
    let blurred = image::imageops::blur(&buffer, MASK_BLUR_SIGMA);
    Array2::from_shape_fn((h, w), |(y, x)| {
        blurred.get_pixel(x as u32, y as u32).0[0].clamp(0.0, 1.0)
    })
}

/// Per-pixel blend of the generated region into `frame` at `rect`:
/// `out = original * (1 - m) + generated * m`, rounded and clamped.
fn blend_region(frame: &mut Frame, generated: &RgbImage, mask: &Array2<f32>, rect: &CropRect) {
    let img = frame.image_mut();
    for y in 0..rect.height {
        for x in 0..rect.width {
            let m = mask[[y as usize, x as usize]];
            let orig = img.get_pixel(rect.x + x, rect.y + y).0;
            let gen = generated.get_pixel(x, y).0;
            let mut out = [0u8; 3];
            for c in 0..3 {
                let blended = orig[c] as f32 * (1.0 - m) + gen[c] as f32 * m;
                out[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
            img.put_pixel(rect.x + x, rect.y + y, Rgb(out));
        }
    }
}
