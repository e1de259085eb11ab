// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Running a capture against virtual devices
//! - Printing stream placement for a widget size
//! - Printing the effective configuration

use capture_station::backends::camera::types::{
    ColorCorrectionMode, VideoSourceDescriptor, VideoSourceKind,
};
use capture_station::backends::virtual_camera::{
    VirtualDepthSensor, VirtualFeed, VirtualSource, VirtualStillCamera,
};
use capture_station::capture::asset::{CaptureAsset, ProjectCollection};
use capture_station::capture::ink::InkData;
use capture_station::compositor::placement::{self, PrimaryLayout, SlotTable};
use capture_station::compositor::{Framebuffer, RenderContext};
use capture_station::constants::virtual_camera::FRAME_INTERVAL;
use capture_station::events::EventLog;
use capture_station::geometry::{FrameSize, RectF};
use capture_station::session::{ApplicationMode, VideoStreamState};
use capture_station::{CaptureDevices, Config, MatMode, PerformRequest, StationEvent, Station};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Default folder name for saved captures
const DEFAULT_SAVE_FOLDER: &str = "CaptureStation";

/// Options of the `simulate` command
pub struct SimulateOptions {
    pub config: Option<PathBuf>,
    pub sources: Vec<VideoSourceKind>,
    pub frame: FrameSize,
    pub widget: FrameSize,
    pub flash: bool,
    pub depth: bool,
    pub viewport: RectF,
    pub output: Option<PathBuf>,
}

/// Parse a normalized viewport given as `x,y,w,h`
pub fn parse_viewport(s: &str) -> Result<RectF, String> {
    let values = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid viewport value '{}': {}", v, e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [x, y, w, h] => Ok(RectF::new(*x, *y, *w, *h)),
        _ => Err(format!("expected x,y,w,h, got '{}'", s)),
    }
}

fn load_config(path: Option<&Path>) -> Config {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn descriptors(kinds: &[VideoSourceKind], frame: FrameSize) -> Vec<VideoSourceDescriptor> {
    kinds
        .iter()
        .enumerate()
        .map(|(index, kind)| {
            VideoSourceDescriptor::new(*kind, format!("{}-{}", kind.display_name(), index))
                .with_format(frame, Default::default())
        })
        .collect()
}

/// Run one capture against virtual devices and save the composited image
pub fn simulate(options: SimulateOptions) -> Result<(), Box<dyn std::error::Error>> {
    if options.sources.is_empty() {
        return Err("At least one source is required".into());
    }

    let config = load_config(options.config.as_deref());
    let projects = Arc::new(ProjectCollection::new());
    let depth_sensor = options
        .depth
        .then(|| Arc::new(VirtualDepthSensor::new("virtual-depth")));
    let devices = CaptureDevices {
        still_camera: Arc::new(VirtualStillCamera::new(options.frame)),
        depth_sensor: depth_sensor
            .clone()
            .map(|sensor| sensor as Arc<dyn capture_station::backends::depth::DepthSensor>),
        projects: projects.clone(),
        segmentation: None,
    };

    let station = Station::new(config, devices)?;
    let log = EventLog::attach(station.bus());
    let session = station.session();
    let compositor = station.compositor();

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    ctrlc::set_handler(move || {
        stop_clone.store(true, Ordering::SeqCst);
    })?;

    // Bring the live stream up
    let sources = descriptors(&options.sources, options.frame);
    println!("Sources: {}", list(&sources));
    session.set_application_mode(ApplicationMode::LiveCapture);
    session.set_viewport(options.viewport);
    station.select_sources(sources.clone());
    session.set_video_stream_state(VideoStreamState::Starting);

    let mut feeds = Vec::with_capacity(sources.len());
    for descriptor in &sources {
        let source = VirtualSource::new(descriptor.clone());
        compositor.attach_pipeline(source.clone())?;
        feeds.push((source, options.frame));
    }
    let mut feed = VirtualFeed::start(compositor.clone(), feeds)?;

    let render_stop = Arc::new(AtomicBool::new(false));
    let render = spawn_render_thread(compositor.clone(), options.widget, render_stop.clone())?;

    let result = run_capture(&station, &projects, &log, &stop, &options, &sources)
        .and_then(|asset| save_asset(&asset, options.output.as_deref()));

    render_stop.store(true, Ordering::SeqCst);
    let _ = render.join();
    feed.stop();
    station.shutdown();
    if let Some(sensor) = depth_sensor {
        println!("Depth sensor calls: {}", sensor.calls().join(" "));
    }
    result
}

fn list(sources: &[VideoSourceDescriptor]) -> String {
    sources
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The render thread owns its context; a context cannot leave its thread
fn spawn_render_thread(
    compositor: Arc<capture_station::StreamCompositor>,
    widget: FrameSize,
    stop: Arc<AtomicBool>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("render".to_string())
        .spawn(move || {
            let context = RenderContext::new();
            let mut target = Framebuffer::new(widget);
            let viewport = RectF::unit();
            while !stop.load(Ordering::SeqCst) {
                let mappings = compositor.compute_placement(viewport, widget);
                compositor.render_frame(&context, &mut target, &mappings);
                thread::sleep(FRAME_INTERVAL);
            }
            compositor.context_destroyed(context);
        })
}

fn wait_event<P>(
    log: &EventLog,
    stop: &AtomicBool,
    timeout: Duration,
    predicate: P,
) -> Option<StationEvent>
where
    P: Fn(&StationEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if stop.load(Ordering::SeqCst) {
            return None;
        }
        if let Some(event) = log.wait_for(Duration::from_millis(100), &predicate) {
            return Some(event);
        }
    }
    None
}

fn run_capture(
    station: &Station,
    projects: &ProjectCollection,
    log: &EventLog,
    stop: &AtomicBool,
    options: &SimulateOptions,
    sources: &[VideoSourceDescriptor],
) -> Result<Arc<CaptureAsset>, Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(10);

    wait_event(log, stop, timeout, |e| *e == StationEvent::CompositorUpdated)
        .ok_or("Sources did not start delivering frames")?;
    station
        .session()
        .set_video_stream_state(VideoStreamState::Running);
    println!("Live stream running");

    station.modes().transition_to(MatMode::LampOn)?;
    wait_event(log, stop, timeout, |e| {
        matches!(
            e,
            StationEvent::Transitioned(MatMode::LampOn) | StationEvent::TransitionFailed(MatMode::LampOn)
        )
    })
    .ok_or("Mat mode did not settle")?;
    println!("Mat mode: {}", station.modes().current());

    let capture = station.capture();
    capture.prepare_capture(options.flash, sources.to_vec())?;
    capture.perform_capture(PerformRequest {
        with_flash: options.flash,
        capture_next_frame: true,
        color_correction: ColorCorrectionMode::LampOn,
        sources: sources.to_vec(),
        viewport: options.viewport,
        ink: InkData::default(),
    })?;
    println!("Capturing...");

    let outcome = wait_event(log, stop, timeout * 3, |e| {
        matches!(
            e,
            StationEvent::CapturePublished(_) | StationEvent::CaptureFailed(_)
        )
    })
    .ok_or("Capture did not finish")?;

    match outcome {
        StationEvent::CapturePublished(name) => {
            // Publication precedes the event, so the asset is in the collection
            projects
                .assets()
                .into_iter()
                .find(|asset| asset.name == name)
                .ok_or_else(|| format!("Published asset {} not found", name).into())
        }
        StationEvent::CaptureFailed(reason) => Err(format!("Capture failed: {}", reason).into()),
        _ => Err("Unexpected event".into()),
    }
}

fn save_asset(asset: &CaptureAsset, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = output_path(output, &asset.name)?;
    asset.image.save(&path)?;
    println!(
        "Captured {} ({}x{}, {} snapshots)",
        asset.name,
        asset.image.width(),
        asset.image.height(),
        asset.snapshots.len()
    );
    println!("Saved: {}", path.display());
    Ok(())
}

fn output_path(output: Option<&Path>, name: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = match output {
        Some(path) if path.is_dir() => path.join(format!("{}.png", name)),
        Some(path) => path.to_path_buf(),
        None => get_default_capture_dir().join(format!("{}.png", name)),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(path)
}

/// Get default capture directory
fn get_default_capture_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}

/// Print where every source lands in a widget of `widget` pixels
pub fn print_placement(
    config: Option<PathBuf>,
    sources: Vec<VideoSourceKind>,
    frame: FrameSize,
    widget: FrameSize,
    viewport: RectF,
) -> Result<(), Box<dyn std::error::Error>> {
    if sources.is_empty() {
        return Err("At least one source is required".into());
    }
    let config = load_config(config.as_deref());
    let slots = SlotTable::from_config(&config.slot_positions);
    let layout = PrimaryLayout::from_viewport(viewport, frame, RectF::from_size(widget.to_f()))
        .ok_or("Viewport covers no area")?;

    let sized: Vec<(VideoSourceDescriptor, FrameSize)> = descriptors(&sources, frame)
        .into_iter()
        .map(|descriptor| (descriptor, frame))
        .collect();
    let mappings = placement::stream_mappings(&sized, &slots, &layout);

    println!("Widget {} viewport {:?}", widget, viewport);
    for (descriptor, _) in &sized {
        match mappings.get(descriptor) {
            Some(mapping) => println!(
                "  {}\n      source      ({}, {}, {}, {})\n      destination ({}, {}, {}, {})",
                descriptor,
                mapping.source.x,
                mapping.source.y,
                mapping.source.width,
                mapping.source.height,
                mapping.destination.x,
                mapping.destination.y,
                mapping.destination.width,
                mapping.destination.height,
            ),
            None => println!("  {}\n      not placed (no slot)", descriptor),
        }
    }
    Ok(())
}

/// Print the effective configuration as JSON
pub fn print_config(path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path.as_deref());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
