// SPDX-License-Identifier: GPL-3.0-only

//! Capture coordinator
//!
//! One shutter action becomes two jobs on a dedicated worker thread:
//!
//! 1. **Prepare**: remember the lighting, switch to Flash if asked and wait
//!    until the mode worker confirms it, arm the depth sensor.
//! 2. **Perform**: under the capture section, take the composited viewfinder
//!    image, the hi-res still and the IR/depth pair in parallel, then build
//!    one [`CaptureAsset`] and publish it.
//!
//! Both steps first wait for an in-flight mat mode transition to settle, so
//! nothing is captured under changing light. The queue holds one prepare and
//! one perform behind the running job; a further shutter press is refused
//! with `QueueFull` until the worker picks the waiting ones up.
//!
//! Any failure ends the job with a single `CaptureFailed` event and nothing
//! published. Whatever happens, the depth streams go back to the live
//! preview policy and the capture state returns to NotCapturing.

pub mod asset;
pub mod depth;
pub mod ink;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, ScopedJoinHandle};
use std::time::Duration;

use chrono::Local;
use image::{DynamicImage, RgbaImage};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backends::camera::StillCamera;
use crate::backends::camera::types::{ColorCorrectionMode, VideoSourceDescriptor};
use crate::backends::depth::DepthSensor;
use crate::compositor::StreamCompositor;
use crate::config::Config;
use crate::constants::capture::COMPOSITED_DEVICE_ID;
use crate::errors::{AppResult, CaptureError, TransitionError};
use crate::events::{EventBus, EventListener, StationEvent};
use crate::geometry::{FrameSize, RectF};
use crate::mat_mode::{MatMode, MatModeStateMachine, TransitionOutcome};
use crate::rendezvous::RendezvousError;
use crate::session::{ApplicationMode, CaptureState, PreCaptureMode, Session};
use crate::worker::{LoopAction, WorkerLoop};

use asset::{
    CaptureAsset, ProjectSink, SegmentationSink, SegmentationState, SensorSnapshot, StreamKind,
    asset_name,
};
use ink::{InkData, place_ink};

/// External devices and sinks the coordinator drives
#[derive(Clone)]
pub struct CaptureDevices {
    pub still_camera: Arc<dyn StillCamera>,
    pub depth_sensor: Option<Arc<dyn DepthSensor>>,
    pub projects: Arc<dyn ProjectSink>,
    pub segmentation: Option<Arc<dyn SegmentationSink>>,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub flash_timeout: Duration,
    pub mode_settle_timeout: Duration,
    pub viewfinder_timeout: Duration,
    pub mat_size: FrameSize,
    pub reproject_after_capture: bool,
    pub run_depth_camera_in_live_capture: bool,
}

impl From<&Config> for CaptureSettings {
    fn from(config: &Config) -> Self {
        Self {
            flash_timeout: config.flash_timeout(),
            mode_settle_timeout: config.mode_settle_timeout(),
            viewfinder_timeout: config.viewfinder_timeout(),
            mat_size: config.mat_screen_size(),
            reproject_after_capture: config.reproject_after_capture,
            run_depth_camera_in_live_capture: config.run_depth_camera_in_live_capture,
        }
    }
}

/// Everything the UI passes along with the shutter action
#[derive(Debug, Clone)]
pub struct PerformRequest {
    pub with_flash: bool,
    /// Wait for fresh frames from every source before freezing the view
    pub capture_next_frame: bool,
    pub color_correction: ColorCorrectionMode,
    pub sources: Vec<VideoSourceDescriptor>,
    pub viewport: RectF,
    pub ink: InkData,
}

enum CaptureJob {
    Prepare {
        with_flash: bool,
        sources: Vec<VideoSourceDescriptor>,
    },
    Perform(PerformRequest),
}

impl CaptureJob {
    fn is_prepare(&self) -> bool {
        matches!(self, CaptureJob::Prepare { .. })
    }
}

/// Jobs accepted but not yet taken up by the worker
#[derive(Debug, Default)]
struct QueuedJobs {
    prepare: bool,
    perform: bool,
}

impl QueuedJobs {
    fn slot(&mut self, prepare: bool) -> &mut bool {
        if prepare {
            &mut self.prepare
        } else {
            &mut self.perform
        }
    }
}

struct CaptureResult {
    viewfinder: RgbaImage,
    snapshots: Vec<SensorSnapshot>,
}

struct Engine {
    session: Arc<Session>,
    bus: EventBus,
    compositor: Arc<StreamCompositor>,
    modes: Arc<MatModeStateMachine>,
    devices: CaptureDevices,
    settings: CaptureSettings,
    /// Held from preparation through the sensor captures
    capture_section: Mutex<()>,
    /// Serializes depth sensor access
    depth_lock: Mutex<()>,
}

/// Restores live-preview state when a perform job ends, however it ends
struct FinalizeCapture<'a>(&'a Engine);

impl Drop for FinalizeCapture<'_> {
    fn drop(&mut self) {
        self.0.update_depth_streams();
        self.0.session.set_capture_state(CaptureState::NotCapturing);
    }
}

impl Engine {
    fn run(&self, job: CaptureJob) {
        let outcome = catch_unwind(AssertUnwindSafe(|| match job {
            CaptureJob::Prepare {
                with_flash,
                sources,
            } => self.prepare(with_flash, &sources),
            CaptureJob::Perform(request) => self.perform(&request).map(|_| ()),
        }));

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(_) => CaptureError::Aborted("capture job panicked".to_string()),
        };
        error!(error = %failure, "Capture failed");
        self.bus.emit(StationEvent::CaptureFailed(failure.to_string()));
    }

    fn supports_depth(&self, sources: &[VideoSourceDescriptor]) -> bool {
        self.devices.depth_sensor.is_some()
            && sources.iter().any(|source| source.kind.supports_depth_capture())
    }

    fn update_depth_streams(&self) {
        let Some(sensor) = &self.devices.depth_sensor else {
            return;
        };
        let _depth = self.depth_lock.lock().unwrap();
        let wanted = self.session.application_mode() == ApplicationMode::LiveCapture
            && self.supports_depth(&self.session.selected_sources());
        depth::apply_stream_policy(sensor.as_ref(), wanted);
    }

    /// The current mat mode once no transition is in flight
    fn wait_for_steady_mode(&self) -> Result<MatMode, CaptureError> {
        self.session
            .wait_for_steady_mat_mode(self.settings.mode_settle_timeout)
            .map_err(CaptureError::ModeNotSettled)
    }

    fn prepare(&self, with_flash: bool, sources: &[VideoSourceDescriptor]) -> Result<(), CaptureError> {
        let _section = self.capture_section.lock().unwrap();
        self.session.set_capture_state(CaptureState::PreparingCapture);

        let result = self.prepare_devices(with_flash, sources);
        match &result {
            Ok(()) => self.session.set_capture_state(CaptureState::CapturePrepared),
            Err(_) => self.session.set_capture_state(CaptureState::NotCapturing),
        }
        result
    }

    fn prepare_devices(
        &self,
        with_flash: bool,
        sources: &[VideoSourceDescriptor],
    ) -> Result<(), CaptureError> {
        let mat_mode = self.wait_for_steady_mode()?;
        self.session
            .set_pre_capture_mode(PreCaptureMode::from_mat_mode(mat_mode));

        let flash_ack = if with_flash && mat_mode != MatMode::Flash {
            if sources.len() == 1 {
                debug!("Requesting flash");
                Some(self.modes.request_with_ack(MatMode::Flash)?)
            } else {
                info!(sources = sources.len(), "Flash suppressed for multi-source capture");
                None
            }
        } else {
            None
        };

        if self.supports_depth(sources) {
            self.update_depth_streams();
            if let Some(sensor) = &self.devices.depth_sensor {
                let _depth = self.depth_lock.lock().unwrap();
                depth::arm_for_capture(sensor.as_ref());
            }
        }

        if let Some(ack) = flash_ack {
            match ack.wait(Some(self.settings.flash_timeout)) {
                Ok(TransitionOutcome::Entered(_)) | Ok(TransitionOutcome::Unchanged(_)) => {
                    info!("Flash mode on");
                }
                Ok(TransitionOutcome::Rejected(mode)) => {
                    return Err(TransitionError::PreconditionFailed(mode).into());
                }
                Err(RendezvousError::TimedOut) => {
                    return Err(TransitionError::AckTimeout(MatMode::Flash).into());
                }
                Err(RendezvousError::Abandoned) => {
                    return Err(TransitionError::WorkerStopped.into());
                }
            }
        }
        Ok(())
    }

    fn perform(&self, request: &PerformRequest) -> Result<Arc<CaptureAsset>, CaptureError> {
        let _finalize = FinalizeCapture(self);

        let result = {
            debug!("Waiting for preparation to finish");
            let _section = self.capture_section.lock().unwrap();
            let mat_mode = self.wait_for_steady_mode()?;
            debug!(mode = %mat_mode, "Mat mode steady");
            self.session.set_capture_state(CaptureState::Capturing);
            let result = self.capture(request)?;
            self.session.set_capture_state(CaptureState::FinalizingCapture);
            result
        };

        let asset = self.assemble(request, result)?;
        self.devices.projects.publish(Arc::clone(&asset));
        info!(name = %asset.name, snapshots = asset.snapshots.len(), "Capture published");

        if asset.segmentation == SegmentationState::Pending {
            if let Some(segmentation) = &self.devices.segmentation {
                segmentation.segment(Arc::clone(&asset));
            }
        }

        self.session.set_application_mode(ApplicationMode::Preview);
        if self.settings.reproject_after_capture {
            if let Err(e) = self.modes.transition_to(MatMode::Reprojection) {
                warn!(error = %e, "Could not request reprojection");
            }
        }
        self.bus
            .emit(StationEvent::CapturePublished(asset.name.clone()));
        Ok(asset)
    }

    /// Run the viewfinder, still and depth captures in parallel and wait
    /// for all of them before looking at any result
    fn capture(&self, request: &PerformRequest) -> Result<CaptureResult, CaptureError> {
        let single = request.sources.len() == 1;
        let depth_sensor = self
            .devices
            .depth_sensor
            .as_ref()
            .filter(|_| single && self.supports_depth(&request.sources));
        // A multi-source capture shows the viewport; a single source is
        // captured whole and cropped later
        let viewfinder_viewport = if single {
            RectF::unit()
        } else {
            request.viewport
        };

        info!(sources = request.sources.len(), depth = depth_sensor.is_some(), "Capturing");
        let (viewfinder, stills, depth) = thread::scope(|scope| {
            let viewfinder = scope.spawn(|| {
                self.capture_viewfinder(request.capture_next_frame, viewfinder_viewport)
            });
            let stills = single.then(|| {
                scope.spawn(|| {
                    self.devices
                        .still_camera
                        .capture_still(&request.sources, request.with_flash)
                })
            });
            let depth = depth_sensor.map(|sensor| {
                scope.spawn(move || {
                    let _depth = self.depth_lock.lock().unwrap();
                    depth::capture_ir_and_depth(sensor.as_ref())
                })
            });

            (
                join_step(viewfinder, "viewfinder"),
                stills.map(|handle| join_step(handle, "still")),
                depth.map(|handle| join_step(handle, "depth")),
            )
        });

        let viewfinder = viewfinder??;
        let mut snapshots = match stills {
            Some(stills) => stills??,
            None => Vec::new(),
        };
        if let Some(depth) = depth {
            let calibration = snapshots
                .first()
                .map(|still| still.calibration.clone())
                .unwrap_or_default();
            snapshots.extend(depth??.into_iter().map(|snapshot| {
                snapshot.with_calibration(calibration.clone())
            }));
        }
        if !single {
            snapshots.push(SensorSnapshot::new(
                DynamicImage::ImageRgba8(viewfinder.clone()),
                COMPOSITED_DEVICE_ID,
                StreamKind::Composited,
            ));
        }

        Ok(CaptureResult {
            viewfinder,
            snapshots,
        })
    }

    fn capture_viewfinder(&self, next_frame: bool, viewport: RectF) -> Result<RgbaImage, CaptureError> {
        let pending = self
            .compositor
            .request_capture(None, viewport, next_frame, false);
        pending
            .wait(Some(self.settings.viewfinder_timeout))
            .map_err(|e| match e {
                RendezvousError::TimedOut => CaptureError::ViewfinderTimeout,
                RendezvousError::Abandoned => CaptureError::NoViewfinderImage,
            })
    }

    fn assemble(
        &self,
        request: &PerformRequest,
        result: CaptureResult,
    ) -> Result<Arc<CaptureAsset>, CaptureError> {
        let multi_source = request.sources.len() > 1;
        let (width, height) = result.viewfinder.dimensions();
        let ink = place_ink(
            &request.ink,
            request.viewport,
            FrameSize::new(width, height),
            self.settings.mat_size,
            multi_source,
        )?;
        let segmentation = if !multi_source && self.supports_depth(&request.sources) {
            SegmentationState::Pending
        } else {
            SegmentationState::Disabled
        };
        let created_at = Local::now();

        Ok(Arc::new(CaptureAsset {
            id: Uuid::new_v4(),
            name: asset_name(&created_at),
            created_at,
            image: result.viewfinder,
            snapshots: result.snapshots,
            // A composited capture already shows just the viewport
            captured_viewport: if multi_source {
                RectF::unit()
            } else {
                request.viewport
            },
            color_correction: request.color_correction,
            ink,
            segmentation,
        }))
    }
}

fn join_step<T>(handle: ScopedJoinHandle<'_, T>, step: &str) -> Result<T, CaptureError> {
    handle
        .join()
        .map_err(|_| CaptureError::Aborted(format!("{} step panicked", step)))
}

impl EventListener for Engine {
    fn on_event(&self, event: &StationEvent) {
        if !self.settings.run_depth_camera_in_live_capture {
            return;
        }
        if matches!(
            event,
            StationEvent::ApplicationModeChanged(_) | StationEvent::SelectedSourcesChanged(_)
        ) {
            self.update_depth_streams();
        }
    }
}

pub struct CaptureCoordinator {
    engine: Arc<Engine>,
    jobs: Mutex<Option<SyncSender<CaptureJob>>>,
    queued: Arc<Mutex<QueuedJobs>>,
    worker: Mutex<Option<WorkerLoop>>,
}

impl CaptureCoordinator {
    pub fn new(
        session: Arc<Session>,
        bus: EventBus,
        compositor: Arc<StreamCompositor>,
        modes: Arc<MatModeStateMachine>,
        devices: CaptureDevices,
        settings: CaptureSettings,
    ) -> AppResult<Self> {
        session.set_depth_camera_present(devices.depth_sensor.is_some());
        let engine = Arc::new(Engine {
            session,
            bus: bus.clone(),
            compositor,
            modes,
            devices,
            settings,
            capture_section: Mutex::new(()),
            depth_lock: Mutex::new(()),
        });
        bus.subscribe_weak(&engine);
        if engine.settings.run_depth_camera_in_live_capture {
            engine.update_depth_streams();
        }

        // Room for one prepare and one perform
        let (tx, rx) = mpsc::sync_channel::<CaptureJob>(2);
        let queued = Arc::new(Mutex::new(QueuedJobs::default()));
        let worker_engine = Arc::clone(&engine);
        let worker_queued = Arc::clone(&queued);
        let worker = WorkerLoop::start("capture-worker", move || match rx.recv() {
            Ok(job) => {
                *worker_queued.lock().unwrap().slot(job.is_prepare()) = false;
                worker_engine.run(job);
                LoopAction::Continue
            }
            Err(_) => LoopAction::Stop,
        })?;

        Ok(Self {
            engine,
            jobs: Mutex::new(Some(tx)),
            queued,
            worker: Mutex::new(Some(worker)),
        })
    }

    fn submit(&self, job: CaptureJob) -> Result<(), CaptureError> {
        let jobs = self.jobs.lock().unwrap();
        let Some(jobs) = jobs.as_ref() else {
            return Err(CaptureError::WorkerStopped);
        };

        let prepare = job.is_prepare();
        {
            let mut queued = self.queued.lock().unwrap();
            // A waiting perform belongs to the previous shutter press, so a
            // new preparation has to wait for it as well
            let occupied = if prepare {
                queued.prepare || queued.perform
            } else {
                queued.perform
            };
            if occupied {
                return Err(CaptureError::QueueFull);
            }
            *queued.slot(prepare) = true;
        }

        jobs.try_send(job).map_err(|e| {
            *self.queued.lock().unwrap().slot(prepare) = false;
            match e {
                TrySendError::Full(_) => CaptureError::QueueFull,
                TrySendError::Disconnected(_) => CaptureError::WorkerStopped,
            }
        })
    }

    /// Queue preparation for a capture of `sources`
    pub fn prepare_capture(
        &self,
        with_flash: bool,
        sources: Vec<VideoSourceDescriptor>,
    ) -> Result<(), CaptureError> {
        info!(flash = with_flash, sources = sources.len(), "Queueing capture preparation");
        self.submit(CaptureJob::Prepare {
            with_flash,
            sources,
        })
    }

    /// Queue the capture itself
    pub fn perform_capture(&self, request: PerformRequest) -> Result<(), CaptureError> {
        info!(sources = request.sources.len(), "Queueing capture");
        self.submit(CaptureJob::Perform(request))
    }

    /// Apply the live-preview depth stream policy now
    pub fn update_depth_streams(&self) {
        self.engine.update_depth_streams();
    }

    /// Stop accepting jobs, finish the queued ones and join the worker
    pub fn shutdown(&self) {
        let jobs = self.jobs.lock().unwrap().take();
        drop(jobs);
        if let Some(mut worker) = self.worker.lock().unwrap().take() {
            info!("Stopping capture worker");
            worker.join();
        }
    }
}

impl Drop for CaptureCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
