//! Bounding-box overlay and thumbnail persistence.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use sha2::{Digest, Sha256};

use crate::artifact::ArtifactStore;
use crate::detect::Detection;

pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const BOX_THICKNESS: u32 = 2;
pub const THUMBNAIL_WIDTH: u32 = 352;
pub const THUMBNAIL_HEIGHT: u32 = 240;
const JPEG_QUALITY: u8 = 95;

/// Called with the full-size annotated crop before it is persisted.
///
/// Returning an error aborts the write for that camera.
pub trait ConfirmHook {
    fn confirm(&self, camera_id: &str, annotated: &RgbImage) -> Result<()>;
}

/// An encoded thumbnail and the SHA-256 of its bytes.
#[derive(Clone, Debug)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub digest: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DetectionAnnotator;

impl DetectionAnnotator {
    pub fn new() -> Self {
        Self
    }

    /// Copy of `cropped` with one red box per detection.
    pub fn draw(&self, cropped: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = cropped.clone();
        for d in detections {
            for inset in 0..BOX_THICKNESS {
                let w = d.width.saturating_sub(2 * inset);
                let h = d.height.saturating_sub(2 * inset);
                if w == 0 || h == 0 {
                    break;
                }
                let rect = Rect::at((d.x + inset) as i32, (d.y + inset) as i32).of_size(w, h);
                draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
            }
        }
        canvas
    }

    /// Downscale to the thumbnail size and encode as JPEG.
    pub fn encode(&self, annotated: &RgbImage) -> Result<Thumbnail> {
        let small = imageops::resize(
            annotated,
            THUMBNAIL_WIDTH,
            THUMBNAIL_HEIGHT,
            FilterType::Triangle,
        );
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
            .encode_image(&small)
            .context("encode thumbnail")?;
        let digest = hex::encode(Sha256::digest(&bytes));
        Ok(Thumbnail { bytes, digest })
    }

    /// Draw, optionally confirm, encode and write the thumbnail for one
    /// camera. The same inputs always produce the same bytes.
    pub fn annotate(
        &self,
        camera_id: &str,
        cropped: &RgbImage,
        detections: &[Detection],
        artifacts: &dyn ArtifactStore,
        hook: Option<&dyn ConfirmHook>,
    ) -> Result<Thumbnail> {
        let annotated = self.draw(cropped, detections);
        if let Some(hook) = hook {
            hook.confirm(camera_id, &annotated)
                .with_context(|| format!("confirmation for camera {}", camera_id))?;
        }
        let thumbnail = self.encode(&annotated)?;
        artifacts.write(camera_id, &thumbnail.bytes)?;
        log::debug!(
            "camera {}: thumbnail {} bytes sha256={}",
            camera_id,
            thumbnail.bytes.len(),
            thumbnail.digest
        );
        Ok(thumbnail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::InMemoryArtifactStore;
    use anyhow::anyhow;
    use std::cell::Cell;

    fn gray_crop() -> RgbImage {
        RgbImage::from_pixel(1000, 500, Rgb([90, 90, 90]))
    }

    struct Counting(Cell<u32>);

    impl ConfirmHook for Counting {
        fn confirm(&self, _camera_id: &str, annotated: &RgbImage) -> Result<()> {
            assert_eq!(annotated.dimensions(), (1000, 500));
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    struct Refuse;

    impl ConfirmHook for Refuse {
        fn confirm(&self, _camera_id: &str, _annotated: &RgbImage) -> Result<()> {
            Err(anyhow!("operator declined"))
        }
    }

    #[test]
    fn boxes_are_two_pixels_of_red() {
        let annotator = DetectionAnnotator::new();
        let out = annotator.draw(&gray_crop(), &[Detection::new(100, 50, 40, 30)]);
        assert_eq!(out.get_pixel(100, 50), &BOX_COLOR);
        assert_eq!(out.get_pixel(101, 51), &BOX_COLOR);
        assert_eq!(out.get_pixel(139, 79), &BOX_COLOR);
        assert_eq!(out.get_pixel(102, 52), &Rgb([90, 90, 90]));
        assert_eq!(out.get_pixel(120, 65), &Rgb([90, 90, 90]));
    }

    #[test]
    fn source_crop_is_left_untouched() {
        let crop = gray_crop();
        let _ = DetectionAnnotator::new().draw(&crop, &[Detection::new(0, 0, 20, 20)]);
        assert_eq!(crop.get_pixel(0, 0), &Rgb([90, 90, 90]));
    }

    #[test]
    fn thumbnail_is_352_by_240_jpeg() -> Result<()> {
        let thumb = DetectionAnnotator::new().encode(&gray_crop())?;
        let decoded = image::load_from_memory(&thumb.bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (352, 240));
        assert_eq!(thumb.digest.len(), 64);
        Ok(())
    }

    #[test]
    fn repeated_annotation_is_byte_identical() -> Result<()> {
        let store = InMemoryArtifactStore::new();
        let annotator = DetectionAnnotator::new();
        let boxes = [Detection::new(10, 10, 25, 25), Detection::new(600, 300, 50, 40)];
        let first = annotator.annotate("7", &gray_crop(), &boxes, &store, None)?;
        let stored = store.read("7")?;
        let second = annotator.annotate("7", &gray_crop(), &boxes, &store, None)?;
        assert_eq!(first.digest, second.digest);
        assert_eq!(stored, store.read("7")?);
        Ok(())
    }

    #[test]
    fn hook_sees_full_size_crop_and_can_veto() -> Result<()> {
        let store = InMemoryArtifactStore::new();
        let annotator = DetectionAnnotator::new();
        let hook = Counting(Cell::new(0));
        annotator.annotate("1", &gray_crop(), &[], &store, Some(&hook))?;
        assert_eq!(hook.0.get(), 1);

        assert!(annotator
            .annotate("2", &gray_crop(), &[], &store, Some(&Refuse))
            .is_err());
        assert!(!store.has("2")?);
        Ok(())
    }
}
