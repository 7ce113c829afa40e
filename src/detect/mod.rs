mod backend;
pub mod backends;
pub mod cascade;
mod grouping;
mod integral;
mod result;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};

pub use backend::{
    DetectorParams, VehicleDetector, DEFAULT_MIN_NEIGHBORS, DEFAULT_MIN_SIZE,
    DEFAULT_SCALE_FACTOR,
};
pub use backends::{FixedBoxesDetector, HaarCascadeDetector};
pub use cascade::CascadeModel;
pub use grouping::{group_rectangles, GROUP_EPS};
pub use integral::IntegralImages;
pub use result::Detection;

#[cfg(feature = "backend-opencv")]
pub use backends::OpenCvDetector;

/// Which cascade implementation evaluates the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    Haar,
    #[cfg(feature = "backend-opencv")]
    OpenCv,
}

impl FromStr for DetectorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "haar" => Ok(DetectorKind::Haar),
            #[cfg(feature = "backend-opencv")]
            "opencv" => Ok(DetectorKind::OpenCv),
            other => Err(anyhow!(
                "unknown detector backend '{}' (available: {})",
                other,
                DetectorKind::available().join(", ")
            )),
        }
    }
}

impl DetectorKind {
    pub fn available() -> Vec<&'static str> {
        #[allow(unused_mut)]
        let mut names = vec!["haar"];
        #[cfg(feature = "backend-opencv")]
        names.push("opencv");
        names
    }
}

/// Load the cascade model once. The returned detector is shared read-only
/// by every detection call; failure here is fatal for the detection path.
pub fn load_detector(
    kind: DetectorKind,
    cascade_path: &Path,
    params: DetectorParams,
) -> Result<Arc<dyn VehicleDetector>> {
    let detector: Arc<dyn VehicleDetector> = match kind {
        DetectorKind::Haar => Arc::new(HaarCascadeDetector::from_file(cascade_path, params)?),
        #[cfg(feature = "backend-opencv")]
        DetectorKind::OpenCv => Arc::new(OpenCvDetector::from_file(cascade_path, params)?),
    };
    log::info!(
        "detector '{}' ready (scale {}, neighbors {}, min size {}x{})",
        detector.name(),
        params.scale_factor,
        params.min_neighbors,
        params.min_size.0,
        params.min_size.1
    );
    Ok(detector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() -> Result<()> {
        assert_eq!("haar".parse::<DetectorKind>()?, DetectorKind::Haar);
        assert_eq!(" HAAR ".parse::<DetectorKind>()?, DetectorKind::Haar);
        assert!("yolo".parse::<DetectorKind>().is_err());
        Ok(())
    }

    #[test]
    fn missing_model_is_fatal() {
        let result = load_detector(
            DetectorKind::Haar,
            Path::new("/definitely/missing/cars.xml"),
            DetectorParams::default(),
        );
        assert!(result.is_err());
    }
}
