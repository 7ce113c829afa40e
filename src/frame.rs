//! Decoded camera frames.
//!
//! A `Frame` is owned by exactly one pipeline invocation. It is never shared
//! between detections, and nothing downstream keeps it after the thumbnail
//! has been written.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

/// A decoded, non-empty RGB raster.
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Decode an encoded camera snapshot (JPEG or PNG).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(anyhow!("frame bytes are empty"));
        }
        let decoded = image::load_from_memory(bytes).context("decode camera frame")?;
        Self::from_rgb(decoded.to_rgb8())
    }

    pub fn from_rgb(image: RgbImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(anyhow!(
                "frame has empty dimensions {}x{}",
                image.width(),
                image.height()
            ));
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }
}

/// Result of asking for a camera's frame.
///
/// `NoData` is not an error: the camera simply had nothing usable, and its
/// count is defined as zero.
pub enum FrameOutcome {
    Ready(Frame),
    NoData { reason: String },
}

impl FrameOutcome {
    /// Classify raw source bytes. Absent, empty and undecodable bytes all
    /// collapse to `NoData`.
    pub fn from_bytes(bytes: Option<&[u8]>) -> Self {
        let Some(bytes) = bytes else {
            return FrameOutcome::NoData {
                reason: "no captured image".to_string(),
            };
        };
        match Frame::decode(bytes) {
            Ok(frame) => FrameOutcome::Ready(frame),
            Err(e) => FrameOutcome::NoData {
                reason: format!("{:#}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn encoded_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .expect("encode png");
        out
    }

    #[test]
    fn decodes_png_bytes() -> Result<()> {
        let frame = Frame::decode(&encoded_png(8, 4))?;
        assert_eq!((frame.width(), frame.height()), (8, 4));
        assert_eq!(frame.as_rgb().get_pixel(0, 0), &Rgb([10, 20, 30]));
        Ok(())
    }

    #[test]
    fn missing_empty_and_garbage_bytes_are_no_data() {
        assert!(matches!(
            FrameOutcome::from_bytes(None),
            FrameOutcome::NoData { .. }
        ));
        assert!(matches!(
            FrameOutcome::from_bytes(Some(&[])),
            FrameOutcome::NoData { .. }
        ));
        assert!(matches!(
            FrameOutcome::from_bytes(Some(b"not an image")),
            FrameOutcome::NoData { .. }
        ));
    }

    #[test]
    fn zero_sized_raster_is_rejected() {
        assert!(Frame::from_rgb(RgbImage::new(0, 5)).is_err());
    }
}
