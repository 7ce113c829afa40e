#![cfg(feature = "backend-opencv")]

use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;

use crate::detect::backend::{DetectorParams, VehicleDetector};
use crate::detect::result::Detection;

/// OpenCV `CascadeClassifier` backend.
///
/// `detect_multi_scale` needs `&mut self`, so the classifier sits behind a
/// mutex to satisfy the shared read-only detector contract.
pub struct OpenCvDetector {
    classifier: Mutex<CascadeClassifier>,
    params: DetectorParams,
}

impl OpenCvDetector {
    pub fn from_file<P: AsRef<Path>>(path: P, params: DetectorParams) -> Result<Self> {
        params.validate()?;
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("cascade path {} is not valid UTF-8", path.display()))?;
        let classifier = CascadeClassifier::new(path_str)
            .with_context(|| format!("failed to load cascade model {}", path.display()))?;
        if classifier.empty()? {
            return Err(anyhow!("cascade model {} is empty", path.display()));
        }
        Ok(Self {
            classifier: Mutex::new(classifier),
            params,
        })
    }
}

impl VehicleDetector for OpenCvDetector {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn detect(&self, frame: &GrayImage) -> Result<Vec<Detection>> {
        let mat = Mat::from_slice_rows_cols(
            frame.as_raw(),
            frame.height() as usize,
            frame.width() as usize,
        )
        .context("wrap frame as Mat")?;

        let (min_w, min_h) = self.params.min_size;
        let max_size = self
            .params
            .max_size
            .map(|(w, h)| Size::new(w as i32, h as i32))
            .unwrap_or_default();

        let mut objects = Vector::<Rect>::new();
        {
            let mut classifier = self
                .classifier
                .lock()
                .map_err(|_| anyhow!("cascade classifier lock poisoned"))?;
            classifier
                .detect_multi_scale(
                    &mat,
                    &mut objects,
                    self.params.scale_factor,
                    self.params.min_neighbors as i32,
                    0,
                    Size::new(min_w as i32, min_h as i32),
                    max_size,
                )
                .context("opencv detect_multi_scale failed")?;
        }

        Ok(objects
            .iter()
            .map(|r| {
                Detection::new(
                    r.x.max(0) as u32,
                    r.y.max(0) as u32,
                    r.width.max(0) as u32,
                    r.height.max(0) as u32,
                )
            })
            .collect())
    }
}
