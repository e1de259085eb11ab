// SPDX-License-Identifier: GPL-3.0-only

//! Capture results handed to the project layer

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ink::InkPlacement;
use crate::backends::camera::types::ColorCorrectionMode;
use crate::constants::capture::ASSET_NAME_FORMAT;
use crate::geometry::RectF;

/// Which sensor stream a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    HiResRgb,
    Depth,
    Ir,
    Composited,
}

impl StreamKind {
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::HiResRgb => "hiresrgb",
            StreamKind::Depth => "depth",
            StreamKind::Ir => "ir",
            StreamKind::Composited => "composited",
        }
    }
}

/// One raw image from one sensor
#[derive(Debug, Clone)]
pub struct SensorSnapshot {
    pub image: DynamicImage,
    pub device: String,
    pub stream: StreamKind,
    pub captured_at: DateTime<Local>,
    /// Opaque calibration data supplied by the driver
    pub calibration: serde_json::Value,
}

impl SensorSnapshot {
    pub fn new(image: DynamicImage, device: impl Into<String>, stream: StreamKind) -> Self {
        Self {
            image,
            device: device.into(),
            stream,
            captured_at: Local::now(),
            calibration: serde_json::Value::Null,
        }
    }

    pub fn with_calibration(mut self, calibration: serde_json::Value) -> Self {
        self.calibration = calibration;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentationState {
    /// A segmentation request was sent for this asset
    Pending,
    /// The capture cannot be segmented
    Disabled,
}

/// A finished capture. Immutable once published.
#[derive(Debug, Clone)]
pub struct CaptureAsset {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Local>,
    /// The composited viewfinder image
    pub image: RgbaImage,
    pub snapshots: Vec<SensorSnapshot>,
    /// Normalized region of the primary source that was captured
    pub captured_viewport: RectF,
    pub color_correction: ColorCorrectionMode,
    pub ink: InkPlacement,
    pub segmentation: SegmentationState,
}

/// `IMG_yyyyMMdd_HHmmss` for the given time
pub fn asset_name(at: &DateTime<Local>) -> String {
    at.format(ASSET_NAME_FORMAT).to_string()
}

/// Receives finished captures
pub trait ProjectSink: Send + Sync {
    fn publish(&self, asset: Arc<CaptureAsset>);
}

/// Starts segmentation of a published capture. Fire and forget.
pub trait SegmentationSink: Send + Sync {
    fn segment(&self, asset: Arc<CaptureAsset>);
}

/// In-memory project collection
#[derive(Debug, Default)]
pub struct ProjectCollection {
    assets: Mutex<Vec<Arc<CaptureAsset>>>,
}

impl ProjectCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assets(&self) -> Vec<Arc<CaptureAsset>> {
        self.assets.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.assets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.lock().unwrap().is_empty()
    }
}

impl ProjectSink for ProjectCollection {
    fn publish(&self, asset: Arc<CaptureAsset>) {
        self.assets.lock().unwrap().push(asset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_asset_name_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(asset_name(&at), "IMG_20240307_090502");
    }

    #[test]
    fn test_stream_kind_names() {
        assert_eq!(StreamKind::HiResRgb.name(), "hiresrgb");
        assert_eq!(StreamKind::Composited.name(), "composited");
    }
}
