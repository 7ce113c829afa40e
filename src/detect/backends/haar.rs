use std::borrow::Cow;
use std::path::Path;

use anyhow::Result;
use image::GrayImage;

use crate::detect::backend::{DetectorParams, VehicleDetector};
use crate::detect::cascade::CascadeModel;
use crate::detect::grouping::{group_rectangles, GROUP_EPS};
use crate::detect::integral::IntegralImages;
use crate::detect::result::Detection;
use crate::preprocess::resize_linear;

/// Viola-Jones multi-scale scan over a Haar cascade.
///
/// The image is shrunk by `scale_factor` per level while the cascade window
/// stays fixed; a hit at `(x, y)` on a level maps back to the full frame
/// scaled by that level's factor. Raw hits are merged by neighbor grouping.
pub struct HaarCascadeDetector {
    model: CascadeModel,
    params: DetectorParams,
}

impl HaarCascadeDetector {
    pub fn new(model: CascadeModel, params: DetectorParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { model, params })
    }

    /// Load the cascade definition. A missing or invalid model is fatal for
    /// detection.
    pub fn from_file<P: AsRef<Path>>(path: P, params: DetectorParams) -> Result<Self> {
        let model = CascadeModel::load(path)?;
        log::info!(
            "loaded cascade: window {}x{}, {} stages",
            model.window().0,
            model.window().1,
            model.stage_count()
        );
        Self::new(model, params)
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Every raw window hit before neighbor grouping, in frame coordinates.
    pub fn raw_hits(&self, frame: &GrayImage) -> Vec<Detection> {
        let (win_w, win_h) = self.model.window();
        let tilted = self.model.has_tilted_features();
        let mut hits = Vec::new();
        let mut factor = 1.0f64;

        loop {
            let window_w = (win_w as f64 * factor).round() as u32;
            let window_h = (win_h as f64 * factor).round() as u32;
            let scaled_w = (frame.width() as f64 / factor).round() as u32;
            let scaled_h = (frame.height() as f64 / factor).round() as u32;

            // Stop once the window no longer fits with room to slide.
            if scaled_w <= win_w || scaled_h <= win_h {
                break;
            }
            if let Some((max_w, max_h)) = self.params.max_size {
                if window_w > max_w || window_h > max_h {
                    break;
                }
            }
            if window_w >= self.params.min_size.0 && window_h >= self.params.min_size.1 {
                let unscaled = scaled_w == frame.width() && scaled_h == frame.height();
                let level: Cow<GrayImage> = if unscaled {
                    Cow::Borrowed(frame)
                } else {
                    Cow::Owned(resize_linear(frame, scaled_w, scaled_h))
                };
                let integral = IntegralImages::new(&level, tilted);
                let step = if factor > 2.0 { 1 } else { 2 };

                for y in (0..scaled_h - win_h).step_by(step) {
                    for x in (0..scaled_w - win_w).step_by(step) {
                        if self.model.accepts(&integral, x, y) {
                            hits.push(Detection::new(
                                (x as f64 * factor).round() as u32,
                                (y as f64 * factor).round() as u32,
                                window_w,
                                window_h,
                            ));
                        }
                    }
                }
            }

            factor *= self.params.scale_factor;
        }
        hits
    }
}

impl VehicleDetector for HaarCascadeDetector {
    fn name(&self) -> &'static str {
        "haar"
    }

    fn detect(&self, frame: &GrayImage) -> Result<Vec<Detection>> {
        let hits = self.raw_hits(frame);
        let detections = group_rectangles(&hits, self.params.min_neighbors, GROUP_EPS);
        log::trace!(
            "haar scan: {} raw hits, {} after grouping",
            hits.len(),
            detections.len()
        );
        Ok(detections)
    }
}
