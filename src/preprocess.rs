//! Frame normalization ahead of cascade detection.
//!
//! The steps are fixed and never branch on image content:
//! resize, crop away the timestamp band, luminance, 5x5 Gaussian,
//! 3x3 dilation, 2x2 elliptical closing.

use image::imageops;
use image::{GrayImage, ImageBuffer, Luma, Pixel, RgbImage};
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};

use crate::frame::Frame;

/// Canonical working resolution every camera is resized to.
pub const CANONICAL_WIDTH: u32 = 1000;
pub const CANONICAL_HEIGHT: u32 = 600;

/// Rows `CROP_TOP..CANONICAL_HEIGHT` are kept; the band above holds the
/// camera's on-image caption and timestamp.
pub const CROP_TOP: u32 = 100;

/// BT.601 luma weights in 14-bit fixed point (R, G, B).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// 5-tap Gaussian used when no sigma is given (binomial 1-4-6-4-1).
const GAUSSIAN_5: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

/// Output of preprocessing.
///
/// `cropped` is the color crop used for annotation; `filtered` is the
/// single-channel frame the detector scans. Both share one coordinate space.
pub struct Preprocessed {
    pub cropped: RgbImage,
    pub filtered: GrayImage,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, frame: &Frame) -> Preprocessed {
        let cropped = crop_canonical(frame.as_rgb());
        let gray = luma_bt601(&cropped);
        let blurred = gaussian_5(&gray);
        let dilated = grayscale_dilate(&blurred, &Mask::square(1));
        let filtered = close(&dilated, &ellipse_2x2());
        Preprocessed { cropped, filtered }
    }
}

fn crop_canonical(source: &RgbImage) -> RgbImage {
    let resized = resize_linear(source, CANONICAL_WIDTH, CANONICAL_HEIGHT);
    imageops::crop_imm(
        &resized,
        0,
        CROP_TOP,
        CANONICAL_WIDTH,
        CANONICAL_HEIGHT - CROP_TOP,
    )
    .to_image()
}

/// Bilinear resize sampling at pixel centers, with no low-pass prefilter
/// when shrinking. Edge samples clamp to the border.
pub(crate) fn resize_linear<P>(
    source: &ImageBuffer<P, Vec<P::Subpixel>>,
    width: u32,
    height: u32,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel,
{
    let (src_w, src_h) = source.dimensions();
    if (src_w, src_h) == (width, height) {
        return source.clone();
    }
    if src_w == 0 || src_h == 0 {
        return ImageBuffer::new(width, height);
    }
    ImageBuffer::from_fn(width, height, |x, y| {
        let u = (x as f32 + 0.5) / width as f32;
        let v = (y as f32 + 0.5) / height as f32;
        imageops::sample_bilinear(source, u, v).unwrap_or_else(|| {
            let sx = ((u * src_w as f32) as u32).min(src_w - 1);
            let sy = ((v * src_h as f32) as u32).min(src_h - 1);
            *source.get_pixel(sx, sy)
        })
    })
}

/// Luminance with BT.601 weights, rounded to nearest.
fn luma_bt601(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let sum = LUMA_R * r as u32 + LUMA_G * g as u32 + LUMA_B * b as u32;
        Luma([((sum + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8])
    })
}

/// 5x5 binomial blur computed in f32 and rounded back to u8.
fn gaussian_5(image: &GrayImage) -> GrayImage {
    let wide: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
            Luma([image.get_pixel(x, y).0[0] as f32])
        });
    let blurred = separable_filter_equal(&wide, &GAUSSIAN_5);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([blurred.get_pixel(x, y).0[0].round().clamp(0.0, 255.0) as u8])
    })
}

/// The 2x2 elliptical structuring element, anchored at its bottom-right cell:
///
/// ```text
/// . #
/// # #
/// ```
fn ellipse_2x2() -> Mask {
    let mut shape = GrayImage::new(2, 2);
    shape.put_pixel(1, 0, Luma([255]));
    shape.put_pixel(0, 1, Luma([255]));
    shape.put_pixel(1, 1, Luma([255]));
    Mask::from_image(&shape, 1, 1)
}

fn close(image: &GrayImage, mask: &Mask) -> GrayImage {
    grayscale_erode(&grayscale_dilate(image, mask), mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(width: u32, height: u32, fill: Rgb<u8>) -> Frame {
        Frame::from_rgb(RgbImage::from_pixel(width, height, fill)).expect("frame")
    }

    #[test]
    fn output_has_cropped_working_resolution() {
        let out = ImagePreprocessor::new().run(&frame(352, 240, Rgb([90, 90, 90])));
        assert_eq!(out.cropped.dimensions(), (1000, 500));
        assert_eq!(out.filtered.dimensions(), (1000, 500));
    }

    #[test]
    fn uniform_frame_stays_uniform() {
        let out = ImagePreprocessor::new().run(&frame(640, 480, Rgb([120, 120, 120])));
        assert!(out.filtered.pixels().all(|p| p.0[0] == 120));
    }

    #[test]
    fn timestamp_band_is_discarded() {
        // Bright caption band across the top sixth, dark road below.
        let mut img = RgbImage::from_pixel(1000, 600, Rgb([0, 0, 0]));
        for y in 0..90 {
            for x in 0..1000 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let out = ImagePreprocessor::new().run(&Frame::from_rgb(img).expect("frame"));
        assert!(out.cropped.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn dilation_grows_a_bright_point() {
        let mut img = RgbImage::from_pixel(1000, 600, Rgb([0, 0, 0]));
        img.put_pixel(500, 350, Rgb([255, 255, 255]));
        let out = ImagePreprocessor::new().run(&Frame::from_rgb(img).expect("frame"));
        // Crop shifts rows by CROP_TOP; blur + dilation spread the point.
        let center = out.filtered.get_pixel(500, 250).0[0];
        let neighbour = out.filtered.get_pixel(501, 251).0[0];
        assert!(center > 0);
        assert!(neighbour > 0);
    }

    #[test]
    fn luminance_uses_bt601_weights() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        img.put_pixel(2, 0, Rgb([0, 0, 255]));
        let gray = luma_bt601(&img);
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 29);
    }

    #[test]
    fn blur_rounds_across_a_step_edge() {
        let img = GrayImage::from_fn(16, 5, |x, _| Luma([if x < 8 { 0 } else { 255 }]));
        let blurred = gaussian_5(&img);
        let row: Vec<u8> = (5..11).map(|x| blurred.get_pixel(x, 2).0[0]).collect();
        assert_eq!(row, vec![0, 16, 80, 175, 239, 255]);
    }

    #[test]
    fn downscale_samples_without_prefiltering() {
        // Columns 1 and 2 of every four are bright; pixel-center sampling
        // at a 4:1 shrink lands between them.
        let img = GrayImage::from_fn(8, 4, |x, _| {
            Luma([if x % 4 == 1 || x % 4 == 2 { 255 } else { 0 }])
        });
        let small = resize_linear(&img, 2, 1);
        assert_eq!(small.get_pixel(0, 0).0[0], 255);
        assert_eq!(small.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn preprocessing_is_deterministic() {
        let mut img = RgbImage::new(320, 200);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, ((x + y) % 256) as u8]);
        }
        let frame = Frame::from_rgb(img).expect("frame");
        let a = ImagePreprocessor::new().run(&frame);
        let b = ImagePreprocessor::new().run(&frame);
        assert_eq!(a.filtered, b.filtered);
        assert_eq!(a.cropped, b.cropped);
    }
}
