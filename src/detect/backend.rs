use anyhow::{anyhow, Result};
use image::GrayImage;

use crate::detect::result::Detection;

/// Pyramid step between successive scan scales.
pub const DEFAULT_SCALE_FACTOR: f64 = 1.04;
/// Raw hits a merged box needs before it counts as a vehicle.
pub const DEFAULT_MIN_NEIGHBORS: u32 = 6;
/// Smallest box, in preprocessed-frame pixels, that may be reported.
pub const DEFAULT_MIN_SIZE: (u32, u32) = (20, 20);

/// Sliding-window scan parameters. Tunable, never derived from image content.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorParams {
    pub scale_factor: f64,
    pub min_neighbors: u32,
    pub min_size: (u32, u32),
    pub max_size: Option<(u32, u32)>,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: DEFAULT_MIN_SIZE,
            max_size: None,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<()> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            return Err(anyhow!(
                "scale factor must be greater than 1.0, got {}",
                self.scale_factor
            ));
        }
        if let Some((max_w, max_h)) = self.max_size {
            if max_w < self.min_size.0 || max_h < self.min_size.1 {
                return Err(anyhow!("max detection size is smaller than min size"));
            }
        }
        Ok(())
    }
}

/// Vehicle detector backend.
///
/// A backend is loaded once and then shared read-only across every camera,
/// so `detect` takes `&self` and implementations must be `Send + Sync`.
/// The frame is borrowed for the duration of the call only.
pub trait VehicleDetector: Send + Sync {
    /// Backend identifier, used in logs.
    fn name(&self) -> &'static str;

    /// Find vehicle bounding boxes in a preprocessed single-channel frame.
    fn detect(&self, frame: &GrayImage) -> Result<Vec<Detection>>;
}
