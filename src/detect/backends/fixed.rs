use anyhow::Result;
use image::GrayImage;

use crate::detect::backend::VehicleDetector;
use crate::detect::result::Detection;

/// Backend that reports the same boxes for every frame.
///
/// Used where detection has to be deterministic without a trained model,
/// e.g. pipeline tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct FixedBoxesDetector {
    boxes: Vec<Detection>,
}

impl FixedBoxesDetector {
    pub fn new(boxes: Vec<Detection>) -> Self {
        Self { boxes }
    }

    /// `count` non-overlapping 20x20 boxes laid out on a row-major grid.
    pub fn with_count(count: usize) -> Self {
        let boxes = (0..count)
            .map(|i| {
                let col = (i % 20) as u32;
                let row = (i / 20) as u32;
                Detection::new(10 + col * 45, 10 + row * 45, 20, 20)
            })
            .collect();
        Self { boxes }
    }
}

impl VehicleDetector for FixedBoxesDetector {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn detect(&self, _frame: &GrayImage) -> Result<Vec<Detection>> {
        Ok(self.boxes.clone())
    }
}
