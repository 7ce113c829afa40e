//! Traffic density map
//!
//! Counts vehicles in traffic-camera snapshots and renders a color-coded map
//! of where the roads are busy.
//!
//! # Pipeline
//!
//! For every camera in the record store:
//!
//! 1. **Preprocess**: resize, crop the caption band, grayscale, blur, dilate
//!    and close (`preprocess`).
//! 2. **Detect**: sliding-window Haar cascade over the filtered frame
//!    (`detect`).
//! 3. **Annotate**: red boxes on the color crop, written as a thumbnail
//!    (`annotate`, `artifact`).
//!
//! The count is written back to the store. After every camera is done, the
//! map pass reads the store again:
//!
//! 4. **Classify**: count to density tier (`density`).
//! 5. **Plan**: paint order and per-tier styles (`overlay`).
//! 6. **Compose**: popup per camera (`popup`) and render the page (`render`).
//!
//! # Module Structure
//!
//! - `record`, `storage`: camera records and the SQLite-backed store
//! - `ingest`: captured snapshots, and the live feed behind the `fetch` feature
//! - `frame`, `preprocess`, `detect`, `annotate`: per-camera detection
//! - `density`, `overlay`, `popup`, `render`: map output
//! - `pipeline`: wiring of the two passes
//! - `config`: layered file and environment configuration

pub mod annotate;
pub mod artifact;
pub mod config;
pub mod density;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod popup;
pub mod preprocess;
pub mod record;
pub mod render;
pub mod storage;

pub use annotate::{ConfirmHook, DetectionAnnotator, Thumbnail};
pub use artifact::{ArtifactStore, FilesystemArtifactStore, InMemoryArtifactStore};
pub use config::PipelineConfig;
pub use density::{classify, classify_optional, DensityTier};
pub use detect::{
    load_detector, Detection, DetectorKind, DetectorParams, FixedBoxesDetector,
    HaarCascadeDetector, VehicleDetector,
};
pub use frame::{Frame, FrameOutcome};
#[cfg(feature = "fetch")]
pub use ingest::FeedClient;
pub use ingest::{CapturedImageDir, FrameSource};
pub use overlay::{LayerKind, OverlayPlanner, OverlayStyle, PlannedCamera};
pub use pipeline::{build_map, plan_map, DetectionOutcome, DetectionSummary, Pipeline};
pub use popup::{ImageSource, Popup, PopupComposer};
pub use preprocess::{ImagePreprocessor, Preprocessed};
pub use record::CameraRecord;
pub use render::{LeafletRenderer, MapEntry, MapRenderer};
pub use storage::{InMemoryRecordStore, RecordStore, SqliteRecordStore};
