// SPDX-License-Identifier: GPL-3.0-only

//! Depth sensor sequencing for captures

use tracing::{debug, info};

use super::asset::{SensorSnapshot, StreamKind};
use crate::backends::depth::{DepthFrame, DepthSensor, DepthStream, grab_single};
use crate::errors::HardwareError;

/// Turn the emitters on for IR capture: flood on, laser off
pub fn arm_for_capture(sensor: &dyn DepthSensor) {
    debug!(device = sensor.device_id(), "Arming depth sensor");
    sensor.set_ir_flood_on(true);
    sensor.set_laser_on(false);
}

/// Grab IR under the flood light, then switch to the laser and grab depth.
///
/// The depth stream is only enabled after the IR frame is in hand.
pub fn capture_ir_and_depth(sensor: &dyn DepthSensor) -> Result<Vec<SensorSnapshot>, HardwareError> {
    let ir = grab_single(sensor, DepthStream::Ir)?;
    sensor.set_ir_flood_on(false);
    sensor.enable_streams(&[DepthStream::Depth]);
    sensor.set_laser_on(true);
    let depth = grab_single(sensor, DepthStream::Depth)?;

    info!(device = sensor.device_id(), "Captured IR and depth frames");
    Ok(vec![
        snapshot(sensor, &ir, StreamKind::Ir)?,
        snapshot(sensor, &depth, StreamKind::Depth)?,
    ])
}

fn snapshot(
    sensor: &dyn DepthSensor,
    frame: &DepthFrame,
    kind: StreamKind,
) -> Result<SensorSnapshot, HardwareError> {
    Ok(SensorSnapshot::new(frame.to_image()?, sensor.device_id(), kind))
}

/// Bring the enabled streams in line with whether live preview wants depth.
///
/// Only streams whose state differs are touched.
pub fn apply_stream_policy(sensor: &dyn DepthSensor, live_depth_wanted: bool) {
    let enabled = sensor.enabled_streams();
    if live_depth_wanted {
        let missing: Vec<DepthStream> = DepthStream::LIVE
            .into_iter()
            .filter(|stream| !enabled.contains(stream))
            .collect();
        if !missing.is_empty() {
            debug!(streams = ?missing, "Enabling depth streams");
            sensor.enable_streams(&missing);
        }
    } else {
        let running: Vec<DepthStream> = DepthStream::LIVE
            .into_iter()
            .filter(|stream| enabled.contains(stream))
            .collect();
        if !running.is_empty() {
            debug!(streams = ?running, "Disabling depth streams");
            sensor.disable_streams(&running);
        }
    }
}
