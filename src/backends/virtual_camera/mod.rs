// SPDX-License-Identifier: GPL-3.0-only

//! Virtual devices for simulation and tests
//!
//! ```text
//! ┌──────────────┐  push_frame()  ┌───────────────┐  frame_ready()  ┌────────────┐
//! │ VirtualFeed  │ ─────────────► │ VirtualSource │ ──────────────► │ Compositor │
//! │ (worker)     │                │ (pipeline)    │ ◄── convert() ─ │            │
//! └──────────────┘                └───────────────┘                 └────────────┘
//! ```
//!
//! [`VirtualStillCamera`] and [`VirtualDepthSensor`] stand in for the still
//! pipeline and the depth sensor. Both can be told to fail, and the depth
//! sensor records every call so the emitter sequencing can be checked.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{DynamicImage, Rgba, RgbaImage};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::backends::camera::types::VideoSourceDescriptor;
use crate::backends::camera::{SourcePipeline, StillCamera};
use crate::backends::depth::{DepthFrame, DepthSensor, DepthSensorError, DepthStream};
use crate::capture::asset::{SensorSnapshot, StreamKind};
use crate::compositor::StreamCompositor;
use crate::compositor::framebuffer::Framebuffer;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::constants::virtual_camera::{DEPTH_FRAME_HEIGHT, DEPTH_FRAME_WIDTH, FRAME_INTERVAL};
use crate::errors::HardwareError;
use crate::geometry::FrameSize;
use crate::worker::{LoopAction, WorkerLoop};

/// A live source fed with images from code
pub struct VirtualSource {
    descriptor: VideoSourceDescriptor,
    latest: Mutex<Option<RgbaImage>>,
    frames: AtomicU64,
}

impl VirtualSource {
    pub fn new(descriptor: VideoSourceDescriptor) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            latest: Mutex::new(None),
            frames: AtomicU64::new(0),
        })
    }

    pub fn descriptor(&self) -> &VideoSourceDescriptor {
        &self.descriptor
    }

    /// Store `image` as the newest frame and announce it to `compositor`
    pub fn push_frame(&self, compositor: &StreamCompositor, image: RgbaImage) {
        let size = FrameSize::new(image.width(), image.height());
        *self.latest.lock().unwrap() = Some(image);

        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if count % FRAME_LOG_INTERVAL == 0 {
            debug!(source = %self.descriptor, frames = count, "Virtual frames pushed");
        }
        compositor.frame_ready(&self.descriptor.name, size);
    }
}

impl SourcePipeline for VirtualSource {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn convert(&self, surface: &mut Framebuffer) -> bool {
        match self.latest.lock().unwrap().as_ref() {
            Some(image) => {
                surface.upload(image);
                true
            }
            None => false,
        }
    }
}

/// Diagonal gradient tinted per source with a bar moving with `frame`
pub fn test_pattern(size: FrameSize, tint: Rgba<u8>, frame: u64) -> RgbaImage {
    let bar = if size.width == 0 {
        0
    } else {
        ((frame * 8) % size.width as u64) as u32
    };
    let span = (size.width + size.height).max(1);
    RgbaImage::from_fn(size.width, size.height, |x, y| {
        if x.abs_diff(bar) < 4 {
            return Rgba([255, 255, 255, 255]);
        }
        let level = ((x + y) * 255 / span) as u16;
        let mix = |channel: u8| ((channel as u16 * level) / 255) as u8;
        Rgba([mix(tint[0]), mix(tint[1]), mix(tint[2]), 255])
    })
}

const TINTS: [Rgba<u8>; 4] = [
    Rgba([255, 96, 64, 255]),
    Rgba([64, 200, 96, 255]),
    Rgba([80, 120, 255, 255]),
    Rgba([230, 200, 60, 255]),
];

/// Pushes test patterns into a set of virtual sources at a fixed rate
pub struct VirtualFeed {
    worker: WorkerLoop,
}

impl VirtualFeed {
    pub fn start(
        compositor: Arc<StreamCompositor>,
        sources: Vec<(Arc<VirtualSource>, FrameSize)>,
    ) -> std::io::Result<Self> {
        Self::start_with_interval(compositor, sources, FRAME_INTERVAL)
    }

    pub fn start_with_interval(
        compositor: Arc<StreamCompositor>,
        sources: Vec<(Arc<VirtualSource>, FrameSize)>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        info!(sources = sources.len(), interval_ms = interval.as_millis() as u64, "Starting virtual feed");
        let mut frame = 0u64;
        let worker = WorkerLoop::start("virtual-feed", move || {
            for (index, (source, size)) in sources.iter().enumerate() {
                let image = test_pattern(*size, TINTS[index % TINTS.len()], frame);
                source.push_frame(&compositor, image);
            }
            frame += 1;
            std::thread::sleep(interval);
            LoopAction::Continue
        })?;
        Ok(Self { worker })
    }

    pub fn stop(&mut self) {
        self.worker.stop();
    }
}

/// Still camera producing a pattern image per source
pub struct VirtualStillCamera {
    size: FrameSize,
    fail: AtomicBool,
    captures: AtomicUsize,
}

impl VirtualStillCamera {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            fail: AtomicBool::new(false),
            captures: AtomicUsize::new(0),
        }
    }

    /// Make every following capture fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl StillCamera for VirtualStillCamera {
    fn capture_still(
        &self,
        sources: &[VideoSourceDescriptor],
        with_flash: bool,
    ) -> Result<Vec<SensorSnapshot>, HardwareError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            warn!("Virtual still camera failing on request");
            return Err(HardwareError::Unavailable(
                "virtual still camera disabled".to_string(),
            ));
        }

        debug!(sources = sources.len(), flash = with_flash, "Virtual still capture");
        Ok(sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                let image = test_pattern(self.size, TINTS[index % TINTS.len()], 0);
                SensorSnapshot::new(DynamicImage::ImageRgba8(image), &source.name, StreamKind::HiResRgb)
                    .with_calibration(json!({
                        "device": source.name,
                        "width": self.size.width,
                        "height": self.size.height,
                        "flash": with_flash,
                    }))
            })
            .collect())
    }
}

#[derive(Default)]
struct SensorState {
    enabled: Vec<DepthStream>,
    flood_on: bool,
    laser_on: bool,
    failing: Option<DepthStream>,
    last_error: Option<DepthSensorError>,
    calls: Vec<String>,
}

/// Depth sensor with an inspectable call log.
///
/// Grabbing a stream that is not enabled fails, as it does on hardware.
pub struct VirtualDepthSensor {
    device_id: String,
    state: Mutex<SensorState>,
}

impl VirtualDepthSensor {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            state: Mutex::new(SensorState::default()),
        }
    }

    /// Make grabs of `stream` fail until cleared with `None`
    pub fn fail_stream(&self, stream: Option<DepthStream>) {
        self.state.lock().unwrap().failing = stream;
    }

    /// Every call so far, e.g. `"grab:ir"`, `"laser:on"`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn is_flood_on(&self) -> bool {
        self.state.lock().unwrap().flood_on
    }

    pub fn is_laser_on(&self) -> bool {
        self.state.lock().unwrap().laser_on
    }
}

fn stream_list(streams: &[DepthStream]) -> String {
    streams
        .iter()
        .map(DepthStream::name)
        .collect::<Vec<_>>()
        .join(",")
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

impl DepthSensor for VirtualDepthSensor {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn grab_frames(
        &self,
        streams: &[DepthStream],
        _blocking: bool,
        _timeout: Duration,
    ) -> Vec<DepthFrame> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("grab:{}", stream_list(streams)));

        let mut frames = Vec::with_capacity(streams.len());
        for stream in streams {
            if state.failing == Some(*stream) {
                state.last_error = Some(DepthSensorError {
                    code: 5,
                    message: format!("{} stream failed", stream),
                });
                return Vec::new();
            }
            if !state.enabled.contains(stream) {
                state.last_error = Some(DepthSensorError {
                    code: 2,
                    message: format!("{} stream not enabled", stream),
                });
                return Vec::new();
            }
            let base: u16 = match stream {
                DepthStream::Ir => 200,
                DepthStream::Depth => 1000,
            };
            let data = (0..DEPTH_FRAME_WIDTH * DEPTH_FRAME_HEIGHT)
                .map(|i| base + (i % DEPTH_FRAME_WIDTH) as u16)
                .collect();
            frames.push(DepthFrame {
                stream: *stream,
                width: DEPTH_FRAME_WIDTH,
                height: DEPTH_FRAME_HEIGHT,
                data,
            });
        }
        state.last_error = None;
        frames
    }

    fn enable_streams(&self, streams: &[DepthStream]) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("enable:{}", stream_list(streams)));
        for stream in streams {
            if !state.enabled.contains(stream) {
                state.enabled.push(*stream);
            }
        }
    }

    fn disable_streams(&self, streams: &[DepthStream]) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("disable:{}", stream_list(streams)));
        state.enabled.retain(|stream| !streams.contains(stream));
    }

    fn enabled_streams(&self) -> Vec<DepthStream> {
        self.state.lock().unwrap().enabled.clone()
    }

    fn set_ir_flood_on(&self, on: bool) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("flood:{}", on_off(on)));
        state.flood_on = on;
    }

    fn set_laser_on(&self, on: bool) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("laser:{}", on_off(on)));
        state.laser_on = on;
    }

    fn error(&self) -> Option<DepthSensorError> {
        self.state.lock().unwrap().last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::depth::grab_single;

    #[test]
    fn test_pattern_has_requested_size() {
        let image = test_pattern(FrameSize::new(64, 48), TINTS[0], 3);
        assert_eq!(image.dimensions(), (64, 48));
        // Bar at x = 24
        assert_eq!(*image.get_pixel(24, 10), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_depth_sensor_rejects_disabled_stream() {
        let sensor = VirtualDepthSensor::new("depth0");
        let err = grab_single(&sensor, DepthStream::Ir).unwrap_err();
        assert_eq!(
            err,
            HardwareError::SensorFailure {
                device: "depth0".to_string(),
                code: 2,
                message: "ir stream not enabled".to_string(),
            }
        );

        sensor.enable_streams(&[DepthStream::Ir]);
        let frame = grab_single(&sensor, DepthStream::Ir).unwrap();
        assert_eq!(frame.data.len(), (DEPTH_FRAME_WIDTH * DEPTH_FRAME_HEIGHT) as usize);
        assert!(sensor.error().is_none());
    }

    #[test]
    fn test_depth_sensor_records_calls() {
        let sensor = VirtualDepthSensor::new("depth0");
        sensor.enable_streams(&DepthStream::LIVE);
        sensor.set_ir_flood_on(true);
        sensor.set_laser_on(false);
        sensor.disable_streams(&[DepthStream::Depth]);

        assert_eq!(
            sensor.calls(),
            vec!["enable:ir,depth", "flood:on", "laser:off", "disable:depth"]
        );
        assert_eq!(sensor.enabled_streams(), vec![DepthStream::Ir]);
        assert!(sensor.is_flood_on());
        assert!(!sensor.is_laser_on());
    }

    #[test]
    fn test_still_camera_failure_toggle() {
        let camera = VirtualStillCamera::new(FrameSize::new(32, 24));
        let source = VideoSourceDescriptor::new(
            crate::backends::camera::types::VideoSourceKind::DownwardCamera,
            "down",
        );
        let stills = camera.capture_still(&[source.clone()], true).unwrap();
        assert_eq!(stills.len(), 1);
        assert_eq!(stills[0].stream, StreamKind::HiResRgb);
        assert_eq!(stills[0].calibration["flash"], true);

        camera.set_failing(true);
        assert!(camera.capture_still(&[source], false).is_err());
        assert_eq!(camera.captures(), 2);
    }
}
