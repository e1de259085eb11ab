// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture coordinator against virtual devices

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use capture_station::backends::camera::StillCamera;
use capture_station::backends::camera::types::ColorCorrectionMode;
use capture_station::backends::depth::{DepthSensor, DepthStream};
use capture_station::backends::virtual_camera::{
    VirtualDepthSensor, VirtualFeed, VirtualSource, VirtualStillCamera,
};
use capture_station::capture::asset::{
    CaptureAsset, ProjectCollection, SegmentationSink, SegmentationState, SensorSnapshot,
    StreamKind,
};
use capture_station::capture::ink::InkData;
use capture_station::compositor::{Framebuffer, RenderContext};
use capture_station::constants::capture::COMPOSITED_DEVICE_ID;
use capture_station::errors::{CaptureError, HardwareError};
use capture_station::events::EventLog;
use capture_station::geometry::{FrameSize, RectF};
use capture_station::session::{ApplicationMode, CaptureState, VideoStreamState};
use capture_station::{
    CaptureDevices, Config, MatMode, PerformRequest, Station, StationEvent, VideoSourceDescriptor,
    VideoSourceKind,
};

const FRAME: FrameSize = FrameSize::new(96, 72);
const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct RecordingSegmenter {
    requested: Mutex<Vec<String>>,
}

impl SegmentationSink for RecordingSegmenter {
    fn segment(&self, asset: Arc<CaptureAsset>) {
        self.requested.lock().unwrap().push(asset.name.clone());
    }
}

/// Still camera that blocks until the test lets each capture through
struct GatedStillCamera {
    gate: Mutex<Receiver<()>>,
}

impl StillCamera for GatedStillCamera {
    fn capture_still(
        &self,
        sources: &[VideoSourceDescriptor],
        _with_flash: bool,
    ) -> Result<Vec<SensorSnapshot>, HardwareError> {
        self.gate
            .lock()
            .unwrap()
            .recv()
            .map_err(|_| HardwareError::Unavailable("gate closed".to_string()))?;
        VirtualStillCamera::new(FRAME).capture_still(sources, false)
    }
}

struct Rig {
    station: Station,
    projects: Arc<ProjectCollection>,
    depth: Arc<VirtualDepthSensor>,
    segmenter: Arc<RecordingSegmenter>,
    log: Arc<EventLog>,
    sources: Vec<VideoSourceDescriptor>,
    virtual_sources: Vec<Arc<VirtualSource>>,
    feed: VirtualFeed,
    render_stop: Arc<AtomicBool>,
    render: Option<JoinHandle<()>>,
}

impl Rig {
    fn start(kinds: &[VideoSourceKind], config: Config, still: Arc<dyn StillCamera>) -> Self {
        let projects = Arc::new(ProjectCollection::new());
        let depth = Arc::new(VirtualDepthSensor::new("depth0"));
        let segmenter = Arc::new(RecordingSegmenter::default());
        let devices = CaptureDevices {
            still_camera: still,
            depth_sensor: Some(depth.clone() as Arc<dyn DepthSensor>),
            projects: projects.clone(),
            segmentation: Some(segmenter.clone() as Arc<dyn SegmentationSink>),
        };
        let station = Station::new(config, devices).unwrap();
        let log = EventLog::attach(station.bus());

        let sources: Vec<VideoSourceDescriptor> = kinds
            .iter()
            .enumerate()
            .map(|(index, kind)| VideoSourceDescriptor::new(*kind, format!("{}{}", kind, index)))
            .collect();
        let session = station.session();
        session.set_application_mode(ApplicationMode::LiveCapture);
        station.select_sources(sources.clone());
        session.set_video_stream_state(VideoStreamState::Starting);

        let compositor = station.compositor().clone();
        let virtual_sources: Vec<Arc<VirtualSource>> = sources
            .iter()
            .map(|descriptor| {
                let source = VirtualSource::new(descriptor.clone());
                compositor.attach_pipeline(source.clone()).unwrap();
                source
            })
            .collect();
        let feed = start_feed(&station, &virtual_sources);

        let render_stop = Arc::new(AtomicBool::new(false));
        let stop = render_stop.clone();
        let render = thread::spawn(move || {
            let context = RenderContext::new();
            let mut target = Framebuffer::new(FRAME);
            while !stop.load(Ordering::SeqCst) {
                let mappings = compositor.compute_placement(RectF::unit(), FRAME);
                compositor.render_frame(&context, &mut target, &mappings);
                thread::sleep(Duration::from_millis(5));
            }
            compositor.context_destroyed(context);
        });

        assert!(
            log.wait_for(TIMEOUT, |event| *event == StationEvent::CompositorUpdated)
                .is_some()
        );
        session.set_video_stream_state(VideoStreamState::Running);

        Self {
            station,
            projects,
            depth,
            segmenter,
            log,
            sources,
            virtual_sources,
            feed,
            render_stop,
            render: Some(render),
        }
    }

    fn with_virtual_still(kinds: &[VideoSourceKind]) -> (Self, Arc<VirtualStillCamera>) {
        let still = Arc::new(VirtualStillCamera::new(FRAME));
        let rig = Self::start(kinds, quiet_config(), still.clone());
        (rig, still)
    }

    fn request(&self, with_flash: bool) -> PerformRequest {
        PerformRequest {
            with_flash,
            capture_next_frame: true,
            color_correction: ColorCorrectionMode::LampOn,
            sources: self.sources.clone(),
            viewport: RectF::new(0.25, 0.25, 0.5, 0.5),
            ink: InkData::default(),
        }
    }

    fn capture(&self, with_flash: bool) {
        let capture = self.station.capture();
        capture
            .prepare_capture(with_flash, self.sources.clone())
            .unwrap();
        capture.perform_capture(self.request(with_flash)).unwrap();
    }

    /// Wait for the capture to finish and return whether it was published
    fn finished(&self) -> bool {
        let outcome = self.log.wait_for(TIMEOUT, |event| {
            matches!(
                event,
                StationEvent::CapturePublished(_) | StationEvent::CaptureFailed(_)
            )
        });
        let done = self.log.wait_for(TIMEOUT, |event| {
            *event == StationEvent::CaptureStateChanged(CaptureState::NotCapturing)
        });
        assert!(done.is_some(), "capture did not finish");
        matches!(outcome, Some(StationEvent::CapturePublished(_)))
    }

    fn failure(&self) -> Option<String> {
        self.log.events().into_iter().find_map(|event| match event {
            StationEvent::CaptureFailed(reason) => Some(reason),
            _ => None,
        })
    }
}

fn start_feed(station: &Station, sources: &[Arc<VirtualSource>]) -> VirtualFeed {
    let feeds = sources.iter().map(|source| (source.clone(), FRAME)).collect();
    VirtualFeed::start_with_interval(
        station.compositor().clone(),
        feeds,
        Duration::from_millis(5),
    )
    .unwrap()
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.render_stop.store(true, Ordering::SeqCst);
        if let Some(render) = self.render.take() {
            let _ = render.join();
        }
        self.feed.stop();
        self.station.shutdown();
    }
}

fn quiet_config() -> Config {
    Config {
        freeze_detection_timeout_ms: 0,
        ..Config::default()
    }
}

fn position(calls: &[String], call: &str) -> usize {
    calls
        .iter()
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("{} not called in {:?}", call, calls))
}

#[test]
fn test_single_source_capture_with_depth() {
    let (rig, still) = Rig::with_virtual_still(&[VideoSourceKind::DownwardCamera]);
    rig.capture(false);
    assert!(rig.finished(), "failed: {:?}", rig.failure());

    let assets = rig.projects.assets();
    assert_eq!(assets.len(), 1);
    let asset = &assets[0];
    let streams: Vec<StreamKind> = asset.snapshots.iter().map(|s| s.stream).collect();
    assert_eq!(streams, vec![StreamKind::HiResRgb, StreamKind::Ir, StreamKind::Depth]);
    assert_eq!(asset.snapshots[1].calibration, asset.snapshots[0].calibration);
    assert_eq!(asset.snapshots[2].calibration, asset.snapshots[0].calibration);
    assert_eq!(asset.captured_viewport, RectF::new(0.25, 0.25, 0.5, 0.5));
    assert_eq!(asset.segmentation, SegmentationState::Pending);
    assert_eq!(asset.image.dimensions(), (FRAME.width, FRAME.height));
    assert!(asset.name.starts_with("IMG_"));
    assert_eq!(still.captures(), 1);

    assert_eq!(*rig.segmenter.requested.lock().unwrap(), vec![asset.name.clone()]);
    let session = rig.station.session();
    assert_eq!(session.application_mode(), ApplicationMode::Preview);
    assert_eq!(session.capture_state(), CaptureState::NotCapturing);
}

#[test]
fn test_depth_emitters_sequenced_around_ir_grab() {
    let (rig, _still) = Rig::with_virtual_still(&[VideoSourceKind::DownwardCamera]);
    rig.capture(false);
    assert!(rig.finished());

    let calls = rig.depth.calls();
    let flood_on = position(&calls, "flood:on");
    let grab_ir = position(&calls, "grab:ir");
    let flood_off = position(&calls, "flood:off");
    let laser_on = position(&calls, "laser:on");
    let grab_depth = position(&calls, "grab:depth");
    assert!(flood_on < grab_ir);
    assert!(grab_ir < flood_off);
    assert!(flood_off < laser_on);
    assert!(laser_on < grab_depth);

    // Back in Preview the live streams are switched off
    assert!(rig.depth.enabled_streams().is_empty());
}

#[test]
fn test_depth_failure_publishes_nothing() {
    let (rig, _still) = Rig::with_virtual_still(&[VideoSourceKind::DownwardCamera]);
    rig.depth.fail_stream(Some(DepthStream::Depth));
    rig.capture(false);

    assert!(!rig.finished());
    assert!(rig.projects.is_empty());
    let reason = rig.failure().expect("CaptureFailed emitted");
    assert!(reason.contains("depth0"), "{}", reason);
    assert_eq!(
        rig.station.session().application_mode(),
        ApplicationMode::LiveCapture
    );
}

#[test]
fn test_still_failure_publishes_nothing() {
    let (rig, still) = Rig::with_virtual_still(&[VideoSourceKind::DownwardCamera]);
    still.set_failing(true);
    rig.capture(false);

    assert!(!rig.finished());
    assert!(rig.projects.is_empty());
    assert!(rig.failure().is_some());
    assert_eq!(
        rig.station.session().capture_state(),
        CaptureState::NotCapturing
    );
}

#[test]
fn test_multi_source_capture_is_composited() {
    let (rig, still) = Rig::with_virtual_still(&[
        VideoSourceKind::DownwardCamera,
        VideoSourceKind::ForwardCamera,
    ]);
    rig.capture(false);
    assert!(rig.finished(), "failed: {:?}", rig.failure());

    let asset = &rig.projects.assets()[0];
    assert_eq!(asset.snapshots.len(), 1);
    assert_eq!(asset.snapshots[0].device, COMPOSITED_DEVICE_ID);
    assert_eq!(asset.snapshots[0].stream, StreamKind::Composited);
    assert_eq!(asset.captured_viewport, RectF::unit());
    assert_eq!(asset.segmentation, SegmentationState::Disabled);
    // Only the viewport is captured: half of each dimension
    assert_eq!(asset.image.dimensions(), (FRAME.width / 2, FRAME.height / 2));
    assert_eq!(still.captures(), 0);
    assert!(!rig.depth.calls().iter().any(|call| call.starts_with("grab")));
    assert!(rig.segmenter.requested.lock().unwrap().is_empty());
}

#[test]
fn test_flash_capture_enters_flash_mode() {
    let (rig, _still) = Rig::with_virtual_still(&[VideoSourceKind::DownwardCamera]);
    rig.capture(true);
    assert!(rig.finished(), "failed: {:?}", rig.failure());

    let events = rig.log.events();
    assert!(events.contains(&StationEvent::Transitioned(MatMode::Flash)));
    assert!(events.contains(&StationEvent::StrobeRequested));
}

#[test]
fn test_flash_rejected_fails_preparation() {
    let (rig, _still) = Rig::with_virtual_still(&[VideoSourceKind::DownwardCamera]);
    rig.station
        .session()
        .set_video_stream_state(VideoStreamState::FailedToStart);

    rig.station
        .capture()
        .prepare_capture(true, rig.sources.clone())
        .unwrap();
    let failed = rig.log.wait_for(TIMEOUT, |event| {
        matches!(event, StationEvent::CaptureFailed(_))
    });

    assert!(failed.is_some());
    assert_eq!(rig.station.modes().current(), MatMode::None);
    assert_eq!(
        rig.station.session().capture_state(),
        CaptureState::NotCapturing
    );
}

#[test]
fn test_queue_holds_one_job_behind_running_one() {
    let (open, gate): (Sender<()>, Receiver<()>) = mpsc::channel();
    let still = Arc::new(GatedStillCamera {
        gate: Mutex::new(gate),
    });
    let rig = Rig::start(&[VideoSourceKind::Webcamera], quiet_config(), still);
    let capture = rig.station.capture();

    capture.perform_capture(rig.request(false)).unwrap();
    let busy = rig.log.wait_for(TIMEOUT, |event| {
        *event == StationEvent::CaptureStateChanged(CaptureState::Capturing)
    });
    assert!(busy.is_some());

    capture.perform_capture(rig.request(false)).unwrap();
    assert!(matches!(
        capture.perform_capture(rig.request(false)),
        Err(CaptureError::QueueFull)
    ));

    open.send(()).unwrap();
    open.send(()).unwrap();
    let deadline = Instant::now() + TIMEOUT;
    while rig.projects.len() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(rig.projects.len(), 2);
}

#[test]
fn test_reprojection_requested_after_capture() {
    let still = Arc::new(VirtualStillCamera::new(FRAME));
    let rig = Rig::start(
        &[VideoSourceKind::Webcamera],
        Config {
            reproject_after_capture: true,
            ..quiet_config()
        },
        still,
    );
    rig.capture(false);
    assert!(rig.finished());

    let entered = rig.log.wait_for(TIMEOUT, |event| {
        *event == StationEvent::Transitioned(MatMode::Reprojection)
    });
    assert!(entered.is_some());
}

#[test]
fn test_live_depth_streams_follow_application_mode() {
    let still = Arc::new(VirtualStillCamera::new(FRAME));
    let rig = Rig::start(
        &[VideoSourceKind::DownwardCamera],
        Config {
            run_depth_camera_in_live_capture: true,
            ..quiet_config()
        },
        still,
    );
    let mut enabled = rig.depth.enabled_streams();
    enabled.sort_by_key(|stream| stream.name());
    assert_eq!(enabled, vec![DepthStream::Depth, DepthStream::Ir]);

    rig.station
        .session()
        .set_application_mode(ApplicationMode::Preview);
    assert!(rig.depth.enabled_streams().is_empty());
}

#[test]
fn test_back_to_back_prepare_and_perform() {
    let (rig, still) = Rig::with_virtual_still(&[VideoSourceKind::Webcamera]);

    for round in 0..5 {
        rig.log.clear();
        rig.capture(false);
        assert!(rig.finished(), "round {} failed: {:?}", round, rig.failure());
    }
    assert_eq!(rig.projects.len(), 5);
    assert_eq!(still.captures(), 5);
}

#[test]
fn test_capture_succeeds_after_viewfinder_timeout() {
    let still = Arc::new(VirtualStillCamera::new(FRAME));
    let mut rig = Rig::start(
        &[VideoSourceKind::Webcamera, VideoSourceKind::ForwardCamera],
        Config {
            viewfinder_timeout_ms: 200,
            ..quiet_config()
        },
        still,
    );

    // No source delivers, so the viewfinder never arrives
    rig.feed.stop();
    rig.capture(false);
    assert!(!rig.finished());
    assert!(rig.failure().unwrap().contains("viewfinder"));

    // The forward camera is gone for good; capture with the webcam alone
    let webcam = vec![rig.sources[0].clone()];
    rig.station.select_sources(webcam.clone());
    rig.sources = webcam;
    rig.feed = start_feed(&rig.station, &rig.virtual_sources[..1]);
    rig.log.clear();

    rig.capture(false);
    assert!(rig.finished(), "failed: {:?}", rig.failure());
    assert_eq!(rig.projects.len(), 1);
    assert_eq!(rig.station.compositor().pending_captures(), 0);
}
