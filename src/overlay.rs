//! Paint order and per-tier styling of map overlays.
//!
//! Each visible camera yields two circles: a wide translucent halo whose
//! strength follows the density tier, and a small opaque marker that stays
//! readable at any zoom. Cameras are emitted in ascending count order so the
//! busiest camera is painted last and ends up on top where halos overlap.

use anyhow::Result;
use serde::Serialize;

use crate::artifact::ArtifactStore;
use crate::density::{classify, DensityTier};
use crate::record::CameraRecord;

pub const HALO_RADIUS: f64 = 600.0;
pub const MARKER_RADIUS: f64 = 25.0;
const MARKER_OUTLINE: &str = "black";
const MARKER_WEIGHT: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Regional density indicator, in the "Heatmap" group.
    Halo,
    /// Per-camera indicator, in the "Camera Icons" group.
    Marker,
}

impl LayerKind {
    pub const ALL: [LayerKind; 2] = [LayerKind::Halo, LayerKind::Marker];

    /// Name of the toggleable map layer this kind belongs to.
    pub fn group_name(self) -> &'static str {
        match self {
            LayerKind::Halo => "Heatmap",
            LayerKind::Marker => "Camera Icons",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OverlayStyle {
    pub color: &'static str,
    pub fill_color: &'static str,
    pub fill_opacity: f64,
    pub opacity: f64,
    pub weight: u32,
    /// Circle radius in meters.
    pub radius: f64,
}

impl OverlayStyle {
    pub fn for_layer(tier: DensityTier, kind: LayerKind) -> Self {
        match kind {
            LayerKind::Halo => {
                let strength = halo_opacity(tier);
                OverlayStyle {
                    color: tier.color(),
                    fill_color: tier.color(),
                    fill_opacity: strength,
                    opacity: strength,
                    weight: 0,
                    radius: HALO_RADIUS,
                }
            }
            LayerKind::Marker => OverlayStyle {
                color: MARKER_OUTLINE,
                fill_color: tier.color(),
                fill_opacity: 1.0,
                opacity: 1.0,
                weight: MARKER_WEIGHT,
                radius: MARKER_RADIUS,
            },
        }
    }
}

fn halo_opacity(tier: DensityTier) -> f64 {
    match tier {
        DensityTier::Black => 0.4,
        DensityTier::DarkRed => 0.3,
        DensityTier::Orange => 0.2,
        DensityTier::Green => 0.1,
        DensityTier::None => 0.0,
    }
}

/// One camera as it will be drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedCamera {
    pub record: CameraRecord,
    pub car_count: u32,
    pub tier: DensityTier,
    pub halo: OverlayStyle,
    pub marker: OverlayStyle,
}

impl PlannedCamera {
    pub fn style(&self, kind: LayerKind) -> &OverlayStyle {
        match kind {
            LayerKind::Halo => &self.halo,
            LayerKind::Marker => &self.marker,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OverlayPlanner;

impl OverlayPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Visible cameras in paint order.
    ///
    /// Records without a count are left out, as are records whose thumbnail
    /// is missing. Neither case touches the record store.
    pub fn plan(
        &self,
        records: &[CameraRecord],
        artifacts: &dyn ArtifactStore,
    ) -> Result<Vec<PlannedCamera>> {
        let mut counted: Vec<(&CameraRecord, u32)> = Vec::with_capacity(records.len());
        for record in records {
            match record.car_count {
                Some(count) => counted.push((record, count)),
                None => log::debug!("camera {}: no car count, not rendered", record.id),
            }
        }
        // sort_by_key is stable: ties keep store order.
        counted.sort_by_key(|&(_, count)| count);

        let mut planned = Vec::with_capacity(counted.len());
        for (record, count) in counted {
            if !artifacts.has(&record.id)? {
                log::warn!("could not find thumbnail for camera {}, skipping", record.id);
                continue;
            }
            let tier = classify(count);
            planned.push(PlannedCamera {
                record: record.clone(),
                car_count: count,
                tier,
                halo: OverlayStyle::for_layer(tier, LayerKind::Halo),
                marker: OverlayStyle::for_layer(tier, LayerKind::Marker),
            });
        }
        Ok(planned)
    }
}
