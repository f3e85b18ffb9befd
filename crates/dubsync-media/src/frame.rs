//! Frame pixel buffers.
//!
//! A [`Frame`] is an owned RGB8 buffer. Frames are strictly ordered by their
//! position in the decoded sequence; ownership moves stage to stage and only
//! the compositor holds a source frame and its copy at the same time.

use dubsync_models::CropRect;
use image::imageops::FilterType;
use image::RgbImage;

use crate::error::{MediaError, MediaResult};

/// An owned RGB8 video frame (height x width x 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Wrap an existing RGB image buffer.
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Build a frame from raw RGB24 bytes (row-major, no padding).
    pub fn from_raw(width: u32, height: u32, bytes: Vec<u8>) -> MediaResult<Self> {
        let expected = width as usize * height as usize * 3;
        if bytes.len() != expected {
            return Err(MediaError::InvalidVideo(format!(
                "raw frame is {} bytes, expected {} for {}x{}",
                bytes.len(),
                expected,
                width,
                height
            )));
        }
        let buffer = RgbImage::from_raw(width, height, bytes).ok_or_else(|| {
            MediaError::InvalidVideo("raw frame buffer does not match dimensions".to_string())
        })?;
        Ok(Self { buffer })
    }

    /// Frame width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Frame height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Borrow the underlying image buffer.
    #[inline]
    pub fn image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Mutably borrow the underlying image buffer.
    #[inline]
    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.buffer
    }

    /// Raw RGB24 bytes, row-major.
    #[inline]
    pub fn as_raw(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Copy out the region described by `rect`.
    ///
    /// The rectangle must be non-empty and inside the frame; the tracker
    /// guarantees both by clamping boxes before cropping.
    pub fn crop(&self, rect: &CropRect) -> MediaResult<Frame> {
        if rect.width == 0 || rect.height == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "empty crop rect {}x{}",
                rect.width, rect.height
            )));
        }
        if rect.x + rect.width > self.width() || rect.y + rect.height > self.height() {
            return Err(MediaError::InvalidVideo(format!(
                "crop rect {}x{}+{}+{} exceeds frame {}x{}",
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                self.width(),
                self.height()
            )));
        }
        let view =
            image::imageops::crop_imm(&self.buffer, rect.x, rect.y, rect.width, rect.height);
        Ok(Frame::new(view.to_image()))
    }

    /// Resize to exact dimensions with bilinear filtering.
    pub fn resize(&self, width: u32, height: u32) -> Frame {
        Frame::new(image::imageops::resize(
            &self.buffer,
            width,
            height,
            FilterType::Triangle,
        ))
    }

    /// Integer downscale used when decoding oversized sources.
    pub fn downscaled(&self, factor: u32) -> Frame {
        if factor <= 1 {
            return self.clone();
        }
        self.resize(
            (self.width() / factor).max(1),
            (self.height() / factor).max(1),
        )
    }

    /// Fill with a uniform color. Test-fixture helper, also used by `check`.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        Frame::new(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_validates_length() {
        assert!(Frame::from_raw(4, 4, vec![0u8; 48]).is_ok());
        assert!(Frame::from_raw(4, 4, vec![0u8; 47]).is_err());
    }

    #[test]
    fn test_crop_bounds() {
        let frame = Frame::solid(10, 10, [1, 2, 3]);
        let ok = CropRect {
            x: 2,
            y: 2,
            width: 4,
            height: 4,
        };
        let crop = frame.crop(&ok).unwrap();
        assert_eq!(crop.width(), 4);
        assert_eq!(crop.height(), 4);
        assert_eq!(crop.image().get_pixel(0, 0).0, [1, 2, 3]);

        let oob = CropRect {
            x: 8,
            y: 8,
            width: 4,
            height: 4,
        };
        assert!(frame.crop(&oob).is_err());
    }

    #[test]
    fn test_downscaled() {
        let frame = Frame::solid(64, 48, [0, 0, 0]);
        let half = frame.downscaled(2);
        assert_eq!(half.width(), 32);
        assert_eq!(half.height(), 24);

        let same = frame.downscaled(1);
        assert_eq!(same.width(), 64);
    }
}
