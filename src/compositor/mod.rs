// SPDX-License-Identifier: GPL-3.0-only

//! Live stream compositor
//!
//! Turns the asynchronously arriving frames of every selected source into one
//! rendered surface, and serves requests to freeze the composited view into
//! a still image.
//!
//! ```text
//!  pipeline threads          render thread               capture worker
//!  ────────────────          ─────────────               ──────────────
//!  frame_ready(name) ──► counts down head ◄── render_frame(ctx) ── request_capture()
//!                        capture request       │ blit surfaces         │
//!                                              └─ read back ──► PendingCapture
//! ```

pub mod capture_queue;
pub mod framebuffer;
pub mod placement;
pub mod registry;
pub mod watchdog;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{DynamicImage, RgbaImage};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backends::camera::SourcePipeline;
use crate::backends::camera::types::{VideoSourceDescriptor, VideoSourceKind};
use crate::config::Config;
use crate::constants::capture::DUMP_EXTENSION;
use crate::errors::StreamError;
use crate::events::{EventBus, EventListener, StationEvent};
use crate::geometry::{FrameSize, RectF, SizeF, Transform};
use crate::rendezvous::rendezvous;
use crate::session::{Session, VideoStreamState};

pub use capture_queue::{CaptureQueue, CaptureRequest, PendingCapture};
pub use framebuffer::{ContextId, Framebuffer, RenderContext};
pub use placement::{PrimaryLayout, SlotPlacement, SlotTable, StreamMapping, StreamMappings};
use registry::{SourceHandle, SourceRegistry};
use watchdog::FreezeWatchdog;

/// Compositor tuning taken from the startup configuration
#[derive(Debug, Clone)]
pub struct CompositorSettings {
    pub slots: SlotTable,
    pub default_skip_frame_count: i32,
    pub downward_camera_skip_frame_count: i32,
    pub startup_skip_frames: u32,
    pub freeze_timeout: Option<Duration>,
    pub suspend_while_inking: bool,
    pub captured_images_folder: Option<PathBuf>,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CompositorSettings {
    fn from(config: &Config) -> Self {
        Self {
            slots: SlotTable::from_config(&config.slot_positions),
            default_skip_frame_count: config.default_skip_frame_count,
            downward_camera_skip_frame_count: config.downward_camera_skip_frame_count,
            startup_skip_frames: config.startup_skip_frames,
            freeze_timeout: config.freeze_detection_timeout(),
            suspend_while_inking: config.suspend_livestream_inking,
            captured_images_folder: config.captured_images_folder.clone(),
        }
    }
}

impl CompositorSettings {
    fn skip_frame_count(&self, kind: VideoSourceKind) -> i32 {
        match kind {
            VideoSourceKind::DownwardCamera => self.downward_camera_skip_frame_count,
            _ => self.default_skip_frame_count,
        }
    }
}

pub struct StreamCompositor {
    session: Arc<Session>,
    bus: EventBus,
    settings: CompositorSettings,
    registry: Mutex<SourceRegistry>,
    captures: Mutex<CaptureQueue>,
    /// Sources that have not delivered a frame since the stream started
    awaiting_first_frame: Mutex<Option<HashSet<String>>>,
}

impl StreamCompositor {
    /// Create the compositor and subscribe it to selection and stream state
    /// changes on `bus`
    pub fn new(session: Arc<Session>, bus: EventBus, settings: CompositorSettings) -> Arc<Self> {
        let compositor = Arc::new(Self {
            session,
            bus,
            settings,
            registry: Mutex::new(SourceRegistry::default()),
            captures: Mutex::new(CaptureQueue::default()),
            awaiting_first_frame: Mutex::new(None),
        });
        compositor.bus.subscribe_weak(&compositor);
        compositor.set_selected_sources(&compositor.session.selected_sources());
        compositor
    }

    /// Reconcile source handles with `sources`: new descriptors get a
    /// handle, deselected ones are torn down.
    pub fn set_selected_sources(&self, sources: &[VideoSourceDescriptor]) {
        let removed = {
            let mut registry = self.registry.lock().unwrap();
            registry.reconcile(sources, |descriptor| self.create_handle(descriptor))
        };
        // Joins watchdog threads, keep it outside the lock
        drop(removed);

        let names: Vec<&str> = sources.iter().map(|source| source.name.as_str()).collect();
        self.captures.lock().unwrap().retain_sources(&names);
    }

    fn create_handle(&self, descriptor: &VideoSourceDescriptor) -> Option<SourceHandle> {
        let bus = self.bus.clone();
        let frozen = descriptor.clone();
        let watchdog = FreezeWatchdog::new(&descriptor.name, self.settings.freeze_timeout, move || {
            warn!(source = %frozen, "Video stream frozen");
            bus.emit(StationEvent::StreamFrozen(frozen.clone()));
        });
        match watchdog {
            Ok(watchdog) => Some(SourceHandle::new(
                descriptor.clone(),
                self.settings.startup_skip_frames,
                watchdog,
            )),
            Err(e) => {
                error!(source = %descriptor, error = %e, "Failed to start freeze detection");
                None
            }
        }
    }

    /// Attach a decoding pipeline to the selected source with the same name
    pub fn attach_pipeline(&self, pipeline: Arc<dyn SourcePipeline>) -> Result<(), StreamError> {
        let mut registry = self.registry.lock().unwrap();
        match registry.by_name_mut(pipeline.name()) {
            Some(handle) => {
                handle.attach_pipeline(pipeline);
                Ok(())
            }
            None => Err(StreamError::SourceNotSelected(pipeline.name().to_string())),
        }
    }

    /// Detach every pipeline, e.g. when the camera stream stops
    pub fn detach_pipelines(&self) {
        let mut registry = self.registry.lock().unwrap();
        for handle in registry.handles_mut() {
            handle.detach_pipeline();
        }
    }

    /// Called by a pipeline (any thread) whenever it decoded a frame
    pub fn frame_ready(&self, source_name: &str, size: FrameSize) {
        let fresh = {
            let mut registry = self.registry.lock().unwrap();
            match registry.by_name_mut(source_name) {
                Some(handle) => handle.on_frame_ready(size),
                None => {
                    debug!(source = source_name, "Frame from unselected source");
                    return;
                }
            }
        };
        if !fresh {
            return;
        }

        let all_delivered = {
            let mut awaiting = self.awaiting_first_frame.lock().unwrap();
            match awaiting.as_mut() {
                Some(missing) => {
                    missing.remove(source_name);
                    if missing.is_empty() {
                        *awaiting = None;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if all_delivered {
            info!("All selected sources delivering frames");
            self.bus.emit(StationEvent::CompositorUpdated);
        }

        self.captures.lock().unwrap().frame_arrived(source_name);
    }

    /// Frame size of the primary source
    pub fn frame_size(&self) -> Option<FrameSize> {
        let primary = self.session.selected_sources().into_iter().next()?;
        self.registry.lock().unwrap().get(&primary)?.frame_size()
    }

    /// Selected sources in order with their frame sizes. Empty when the
    /// primary source has no frame yet.
    fn sized_sources(&self) -> Vec<(VideoSourceDescriptor, FrameSize)> {
        let selected = self.session.selected_sources();
        let registry = self.registry.lock().unwrap();
        let sized: Vec<_> = selected
            .into_iter()
            .map(|descriptor| {
                let size = registry
                    .get(&descriptor)
                    .and_then(SourceHandle::frame_size)
                    .unwrap_or_default();
                (descriptor, size)
            })
            .collect();
        match sized.first() {
            Some((_, primary)) if !primary.is_empty() => sized,
            _ => Vec::new(),
        }
    }

    /// Mapping for showing `viewport` of the primary source letterboxed into
    /// a `destination`-sized surface, secondaries picture-in-picture
    pub fn compute_placement(&self, viewport: RectF, destination: FrameSize) -> StreamMappings {
        let sources = self.sized_sources();
        let Some((_, frame)) = sources.first() else {
            return StreamMappings::new();
        };
        match PrimaryLayout::from_viewport(viewport, *frame, RectF::from_size(destination.to_f())) {
            Some(layout) => placement::stream_mappings(&sources, &self.settings.slots, &layout),
            None => StreamMappings::new(),
        }
    }

    /// Mapping for a zoomed or panned view where `transform` maps primary
    /// frame pixels into a `widget`-sized surface
    pub fn compute_placement_transformed(
        &self,
        widget: FrameSize,
        transform: Transform,
    ) -> StreamMappings {
        let sources = self.sized_sources();
        let Some((_, frame)) = sources.first() else {
            return StreamMappings::new();
        };
        let layout =
            PrimaryLayout::from_transform(*frame, RectF::from_size(widget.to_f()), transform);
        placement::stream_mappings(&sources, &self.settings.slots, &layout)
    }

    /// Composite all selected sources into `target` and serve the head
    /// capture request if it is settled. Render thread only.
    pub fn render_frame(
        &self,
        context: &RenderContext,
        target: &mut Framebuffer,
        mappings: &StreamMappings,
    ) {
        let capture = self.captures.lock().unwrap().take_ready();
        let mut capture_target = capture
            .as_ref()
            .filter(|request| !request.image_size.is_empty())
            .map(|request| Framebuffer::new(request.image_size));
        let suspended =
            self.settings.suspend_while_inking && self.session.is_inking() && capture.is_none();
        let selected = self.session.selected_sources();
        // Sources the capture could not draw; the live view just skips them
        let mut missing = Vec::new();

        {
            let mut registry = self.registry.lock().unwrap();
            for (index, descriptor) in selected.iter().enumerate() {
                // Sources past the slot table are never composited
                let composited = index < self.settings.slots.len();
                let Some(handle) = registry.get_mut(descriptor) else {
                    if composited {
                        missing.push(descriptor.name.clone());
                    }
                    continue;
                };
                if !suspended {
                    handle.update_surface(context.id());
                }
                let Some(surface) = handle.surface(context.id()) else {
                    if composited {
                        missing.push(descriptor.name.clone());
                    }
                    continue;
                };

                if let Some(mapping) = mappings.get(descriptor) {
                    target.blit(mapping.destination, surface, mapping.source);
                }
                if let (Some(request), Some(framebuffer)) = (&capture, capture_target.as_mut()) {
                    match request.mappings.get(descriptor) {
                        Some(mapping) => {
                            framebuffer.blit(mapping.destination, surface, mapping.source)
                        }
                        None if composited => missing.push(descriptor.name.clone()),
                        None => {}
                    }
                }
            }
        }

        if let Some(request) = capture {
            self.fulfil(request, capture_target, &missing);
        }
    }

    /// Deliver the captured composite. A capture missing any selected
    /// source is abandoned, never delivered partially.
    fn fulfil(&self, request: CaptureRequest, framebuffer: Option<Framebuffer>, missing: &[String]) {
        let Some(framebuffer) = framebuffer else {
            warn!("Capture request without a frame size, abandoning");
            return;
        };
        if !missing.is_empty() {
            warn!(sources = ?missing, "Capture is missing sources, abandoning");
            return;
        }

        let image = framebuffer.to_image();
        if let Some(folder) = &self.settings.captured_images_folder {
            dump_capture(folder, &image);
        }

        let size = framebuffer.size();
        info!(size = %size, "Capture produced");
        if !request.deliver(image) {
            debug!("Capture requester no longer waiting");
        }
        self.bus.emit(StationEvent::CaptureProduced(size));
    }

    /// Queue a capture of the composited view.
    ///
    /// `size` defaults to the viewport's share of the primary frame; with
    /// `keep_aspect_ratio` the image is shrunk to the viewport's aspect
    /// ratio. With `wait_for_next_frame` every selected source must first
    /// deliver fresh frames (see [`CompositorSettings`]). The placement is
    /// fixed now, at request time.
    pub fn request_capture(
        &self,
        size: Option<FrameSize>,
        viewport: RectF,
        wait_for_next_frame: bool,
        keep_aspect_ratio: bool,
    ) -> PendingCapture {
        let sources = self.sized_sources();
        let full_frame = sources.first().map(|(_, size)| *size).unwrap_or_default();
        let full = full_frame.to_f();
        let viewport_frame = SizeF::new(
            (full.width * viewport.width).min(full.width),
            (full.height * viewport.height).min(full.height),
        );
        let viewport_frame = FrameSize::new(
            viewport_frame.width.round() as u32,
            viewport_frame.height.round() as u32,
        );

        let mut image_size = size.filter(|s| !s.is_empty()).unwrap_or(viewport_frame);
        if keep_aspect_ratio {
            image_size = viewport_frame.scaled_to_fit(image_size);
        }

        let mappings = match sources.first() {
            Some((_, frame)) => PrimaryLayout::from_viewport(
                viewport,
                *frame,
                RectF::from_size(image_size.to_f()),
            )
            .map(|layout| placement::stream_mappings(&sources, &self.settings.slots, &layout))
            .unwrap_or_default(),
            None => StreamMappings::new(),
        };

        let skip_frames: HashMap<String, i32> = if wait_for_next_frame {
            self.session
                .selected_sources()
                .into_iter()
                .map(|source| {
                    let count = self.settings.skip_frame_count(source.kind);
                    (source.name, count)
                })
                .collect()
        } else {
            HashMap::new()
        };

        info!(size = %image_size, wait = wait_for_next_frame, "Requesting capture");
        let (producer, consumer) = rendezvous();
        self.captures.lock().unwrap().push(CaptureRequest::new(
            image_size,
            viewport,
            mappings,
            skip_frames,
            producer,
        ));
        consumer
    }

    /// Number of capture requests not yet served
    pub fn pending_captures(&self) -> usize {
        self.captures.lock().unwrap().len()
    }

    /// Free every surface created for `context`
    pub fn context_destroyed(&self, context: RenderContext) {
        debug!(context = ?context.id(), "Render context destroyed");
        self.registry.lock().unwrap().release_context(context.id());
    }

    pub fn restart_freeze_detection(&self) {
        for handle in self.registry.lock().unwrap().handles() {
            handle.restart_freeze_detection();
        }
    }

    pub fn stop_freeze_detection(&self) {
        for handle in self.registry.lock().unwrap().handles() {
            handle.stop_freeze_detection();
        }
    }

    fn stream_starting(&self) {
        let names: HashSet<String> = self
            .session
            .selected_sources()
            .into_iter()
            .map(|source| source.name)
            .collect();
        debug!(sources = names.len(), "Waiting for first frames");
        *self.awaiting_first_frame.lock().unwrap() = Some(names);
    }
}

impl EventListener for StreamCompositor {
    fn on_event(&self, event: &StationEvent) {
        match event {
            StationEvent::SelectedSourcesChanged(sources) => self.set_selected_sources(sources),
            StationEvent::VideoStreamStateChanged(VideoStreamState::Starting) => {
                self.stream_starting()
            }
            _ => {}
        }
    }
}

fn dump_capture(folder: &std::path::Path, image: &RgbaImage) {
    let path = folder.join(format!("{}.{}", Uuid::new_v4(), DUMP_EXTENSION));
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let result = std::fs::create_dir_all(folder)
        .map_err(|e| e.to_string())
        .and_then(|_| rgb.save(&path).map_err(|e| e.to_string()));
    match result {
        Ok(()) => debug!(path = %path.display(), "Dumped captured composite"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to dump captured composite"),
    }
}
