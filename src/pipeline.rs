//! Per-camera detection and the map build that follows it.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::annotate::{ConfirmHook, DetectionAnnotator};
use crate::artifact::ArtifactStore;
use crate::detect::VehicleDetector;
use crate::frame::FrameOutcome;
use crate::ingest::FrameSource;
use crate::overlay::OverlayPlanner;
use crate::popup::PopupComposer;
use crate::preprocess::ImagePreprocessor;
use crate::record::CameraRecord;
use crate::render::{MapEntry, MapRenderer};
use crate::storage::RecordStore;

/// What a detection pass produced for one camera.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// The frame was scanned and a thumbnail written.
    Counted { car_count: u32, thumbnail_digest: String },
    /// Nothing usable to scan. The count is zero and no thumbnail is written.
    NoData { reason: String },
}

impl DetectionOutcome {
    pub fn car_count(&self) -> u32 {
        match self {
            DetectionOutcome::Counted { car_count, .. } => *car_count,
            DetectionOutcome::NoData { .. } => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectionSummary {
    pub cameras: usize,
    pub counted: usize,
    pub no_data: usize,
    pub vehicles: u64,
}

pub struct Pipeline {
    preprocessor: ImagePreprocessor,
    detector: Arc<dyn VehicleDetector>,
    annotator: DetectionAnnotator,
}

impl Pipeline {
    pub fn new(detector: Arc<dyn VehicleDetector>) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(),
            detector,
            annotator: DetectionAnnotator::new(),
        }
    }

    /// Preprocess, detect and annotate one encoded snapshot.
    pub fn detect_bytes(
        &self,
        camera_id: &str,
        bytes: Option<&[u8]>,
        artifacts: &dyn ArtifactStore,
        hook: Option<&dyn ConfirmHook>,
    ) -> Result<DetectionOutcome> {
        let frame = match FrameOutcome::from_bytes(bytes) {
            FrameOutcome::Ready(frame) => frame,
            FrameOutcome::NoData { reason } => {
                log::info!("camera {}: no data ({})", camera_id, reason);
                return Ok(DetectionOutcome::NoData { reason });
            }
        };
        let prepared = self.preprocessor.run(&frame);
        let detections = self
            .detector
            .detect(&prepared.filtered)
            .with_context(|| format!("detector '{}' failed on camera {}", self.detector.name(), camera_id))?;
        let car_count = u32::try_from(detections.len()).unwrap_or(u32::MAX);

        let thumbnail =
            self.annotator
                .annotate(camera_id, &prepared.cropped, &detections, artifacts, hook)?;
        log::debug!("camera {}: {} vehicles", camera_id, car_count);
        Ok(DetectionOutcome::Counted {
            car_count,
            thumbnail_digest: thumbnail.digest,
        })
    }

    pub fn detect_camera(
        &self,
        record: &CameraRecord,
        frames: &dyn FrameSource,
        artifacts: &dyn ArtifactStore,
        hook: Option<&dyn ConfirmHook>,
    ) -> Result<DetectionOutcome> {
        let bytes = frames.load(record)?;
        self.detect_bytes(&record.id, bytes.as_deref(), artifacts, hook)
    }

    /// Detect every camera in store order, write each count back and persist
    /// once at the end. `on_progress` receives the number of cameras done.
    pub fn run_all(
        &self,
        store: &mut dyn RecordStore,
        frames: &dyn FrameSource,
        artifacts: &dyn ArtifactStore,
        hook: Option<&dyn ConfirmHook>,
        on_progress: &mut dyn FnMut(usize),
    ) -> Result<DetectionSummary> {
        let records = store.list()?;
        let mut summary = DetectionSummary {
            cameras: records.len(),
            ..DetectionSummary::default()
        };
        for (i, record) in records.iter().enumerate() {
            let outcome = self.detect_camera(record, frames, artifacts, hook)?;
            match &outcome {
                DetectionOutcome::Counted { car_count, .. } => {
                    summary.counted += 1;
                    summary.vehicles += u64::from(*car_count);
                }
                DetectionOutcome::NoData { .. } => summary.no_data += 1,
            }
            store.update(&record.id, outcome.car_count())?;
            on_progress(i + 1);
        }
        store.persist()?;
        log::info!(
            "detection finished: {} cameras, {} counted, {} without data, {} vehicles",
            summary.cameras,
            summary.counted,
            summary.no_data,
            summary.vehicles
        );
        Ok(summary)
    }
}

/// Plan the overlays and compose a popup for each visible camera.
pub fn plan_map(
    records: &[CameraRecord],
    artifacts: &dyn ArtifactStore,
    composer: &PopupComposer,
) -> Result<Vec<MapEntry>> {
    let planned = OverlayPlanner::new().plan(records, artifacts)?;
    planned
        .into_iter()
        .map(|camera| {
            let popup = composer.compose(&camera.record, artifacts)?;
            Ok(MapEntry { camera, popup })
        })
        .collect()
}

/// Read the store, plan and render the map to `path`. Returns the number of
/// cameras drawn.
pub fn build_map(
    store: &mut dyn RecordStore,
    artifacts: &dyn ArtifactStore,
    composer: &PopupComposer,
    renderer: &dyn MapRenderer,
    path: &Path,
) -> Result<usize> {
    let records = store.list()?;
    let entries = plan_map(&records, artifacts, composer)?;
    renderer.render_to_file(&entries, path)?;
    Ok(entries.len())
}
