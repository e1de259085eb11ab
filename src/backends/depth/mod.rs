// SPDX-License-Identifier: GPL-3.0-only

//! Depth sensor seam
//!
//! The combined depth/color sensor exposes an IR stream (lit by a flood
//! illuminator) and a depth stream (lit by a structured-light laser). The two
//! emitters interfere, so a capture reads IR with the flood on and the laser
//! off, then swaps them before reading depth.
//!
//! Calls are blocking. Failures are reported out of band: a grab that
//! returns no frames is followed by a look at [`DepthSensor::error`].

use std::time::Duration;

use image::{DynamicImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::errors::HardwareError;

/// Named streams of the depth sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthStream {
    Ir,
    Depth,
}

impl DepthStream {
    /// Streams kept running for live preview of a depth-capable source
    pub const LIVE: [DepthStream; 2] = [DepthStream::Ir, DepthStream::Depth];

    pub fn name(&self) -> &'static str {
        match self {
            DepthStream::Ir => "ir",
            DepthStream::Depth => "depth",
        }
    }
}

impl std::fmt::Display for DepthStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One 16-bit frame read from the sensor
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    pub stream: DepthStream,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
}

impl DepthFrame {
    /// Convert to an image, mirrored horizontally.
    ///
    /// The sensor reports frames as seen from the device, the mat is viewed
    /// from above.
    pub fn to_image(&self) -> Result<DynamicImage, HardwareError> {
        let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
                HardwareError::InvalidFrame(format!(
                    "{} frame has {} samples, expected {}x{}",
                    self.stream,
                    self.data.len(),
                    self.width,
                    self.height
                ))
            })?;
        Ok(DynamicImage::ImageLuma16(image::imageops::flip_horizontal(
            &buffer,
        )))
    }
}

/// Error code and message reported by the sensor after a failed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthSensorError {
    pub code: i32,
    pub message: String,
}

pub trait DepthSensor: Send + Sync {
    /// Device id recorded in snapshots
    fn device_id(&self) -> &str;

    /// Read one frame from each of `streams`. An empty result means failure.
    fn grab_frames(&self, streams: &[DepthStream], blocking: bool, timeout: Duration)
    -> Vec<DepthFrame>;

    fn enable_streams(&self, streams: &[DepthStream]);

    fn disable_streams(&self, streams: &[DepthStream]);

    fn enabled_streams(&self) -> Vec<DepthStream>;

    fn set_ir_flood_on(&self, on: bool);

    fn set_laser_on(&self, on: bool);

    /// Last error, if the most recent call failed
    fn error(&self) -> Option<DepthSensorError>;
}

/// Grab a single frame from `stream`, turning an empty result into an error
pub fn grab_single(
    sensor: &dyn DepthSensor,
    stream: DepthStream,
) -> Result<DepthFrame, HardwareError> {
    sensor
        .grab_frames(&[stream], true, Duration::ZERO)
        .into_iter()
        .find(|frame| frame.stream == stream)
        .ok_or_else(|| sensor_failure(sensor, stream))
}

fn sensor_failure(sensor: &dyn DepthSensor, stream: DepthStream) -> HardwareError {
    match sensor.error() {
        Some(DepthSensorError { code, message }) => HardwareError::SensorFailure {
            device: sensor.device_id().to_string(),
            code,
            message,
        },
        None => HardwareError::SensorFailure {
            device: sensor.device_id().to_string(),
            code: -1,
            message: format!("no {} frame returned", stream),
        },
    }
}
