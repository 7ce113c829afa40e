//! Camera image sources.
//!
//! - `CapturedImageDir`: snapshots previously downloaded to disk
//! - `FeedClient` (feature: fetch): the public camera list and live snapshots
//!
//! Sources hand back raw encoded bytes. Decoding happens in `Frame`, so a
//! corrupt snapshot is reported as "no data" by the pipeline rather than as
//! a source failure.

mod captured;
#[cfg(feature = "fetch")]
pub mod feed;

use anyhow::Result;

use crate::record::CameraRecord;

pub use captured::{CapturedImageDir, CAPTURED_IMAGES_DIR};
#[cfg(feature = "fetch")]
pub use feed::{CaptureStats, FeedClient};

pub trait FrameSource {
    /// Encoded snapshot bytes for `record`, or `None` when the camera has no
    /// snapshot.
    fn load(&self, record: &CameraRecord) -> Result<Option<Vec<u8>>>;
}
