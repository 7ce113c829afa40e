pub mod fixed;
pub mod haar;

#[cfg(feature = "backend-opencv")]
pub mod opencv;

pub use fixed::FixedBoxesDetector;
pub use haar::HaarCascadeDetector;

#[cfg(feature = "backend-opencv")]
pub use self::opencv::OpenCvDetector;
