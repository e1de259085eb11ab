// SPDX-License-Identifier: GPL-3.0-only

//! Wiring of the shared session, the compositor, the mat mode worker and
//! the capture coordinator

use std::sync::Arc;

use tracing::info;

use crate::backends::camera::types::VideoSourceDescriptor;
use crate::capture::{CaptureCoordinator, CaptureDevices, CaptureSettings};
use crate::compositor::{CompositorSettings, StreamCompositor};
use crate::config::Config;
use crate::errors::AppResult;
use crate::events::EventBus;
use crate::mat_mode::MatModeStateMachine;
use crate::session::Session;

pub struct Station {
    config: Config,
    bus: EventBus,
    session: Arc<Session>,
    compositor: Arc<StreamCompositor>,
    modes: Arc<MatModeStateMachine>,
    capture: CaptureCoordinator,
}

impl Station {
    pub fn new(config: Config, devices: CaptureDevices) -> AppResult<Self> {
        let bus = EventBus::new();
        let session = Session::new(bus.clone());
        let compositor = StreamCompositor::new(
            Arc::clone(&session),
            bus.clone(),
            CompositorSettings::from(&config),
        );
        let modes = MatModeStateMachine::new(Arc::clone(&session), bus.clone())?;
        let capture = CaptureCoordinator::new(
            Arc::clone(&session),
            bus.clone(),
            Arc::clone(&compositor),
            Arc::clone(&modes),
            devices,
            CaptureSettings::from(&config),
        )?;
        info!(version = crate::constants::app_info::version(), "Station ready");

        Ok(Self {
            config,
            bus,
            session,
            compositor,
            modes,
            capture,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn compositor(&self) -> &Arc<StreamCompositor> {
        &self.compositor
    }

    pub fn modes(&self) -> &Arc<MatModeStateMachine> {
        &self.modes
    }

    pub fn capture(&self) -> &CaptureCoordinator {
        &self.capture
    }

    pub fn select_sources(&self, sources: Vec<VideoSourceDescriptor>) {
        self.session.set_selected_sources(sources);
    }

    /// Drain the capture and mode workers and stop freeze detection
    pub fn shutdown(&self) {
        info!("Shutting down station");
        self.capture.shutdown();
        self.modes.shutdown();
        self.compositor.detach_pipelines();
        self.compositor.stop_freeze_detection();
    }
}
