// SPDX-License-Identifier: GPL-3.0-only

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::{MatMode, TransitionOutcome};
use crate::events::{EventBus, StationEvent};
use crate::rendezvous::Producer;
use crate::session::{ApplicationMode, Session, VideoStreamState};

/// Runs transitions one at a time on the mode worker thread
pub(super) struct TransitionWorker {
    session: Arc<Session>,
    bus: EventBus,
    pending: Arc<Mutex<Option<MatMode>>>,
}

impl TransitionWorker {
    pub(super) fn new(
        session: Arc<Session>,
        bus: EventBus,
        pending: Arc<Mutex<Option<MatMode>>>,
    ) -> Self {
        Self {
            session,
            bus,
            pending,
        }
    }

    pub(super) fn process(&self, target: MatMode, ack: Option<Producer<TransitionOutcome>>) {
        let outcome = self.run(target);
        if let Some(ack) = ack {
            ack.fulfil(outcome);
        }
    }

    fn run(&self, target: MatMode) -> TransitionOutcome {
        let previous = self.session.mat_mode();
        if previous == target {
            debug!(mode = %target, "Already in requested mode");
            return TransitionOutcome::Unchanged(target);
        }

        info!(from = %previous, to = %target, "Mat mode transition");
        self.session.set_mat_mode(target.transitioning());

        if target.requires_camera() && !self.camera_ready() {
            warn!(
                target = %target,
                app_mode = ?self.session.application_mode(),
                stream = ?self.session.video_stream_state(),
                "Camera not ready, rolling back"
            );
            self.session.set_mat_mode(previous);
            *self.pending.lock().unwrap() = Some(target);
            self.bus.emit(StationEvent::TransitionFailed(target));
            return TransitionOutcome::Rejected(target);
        }

        if target == MatMode::Flash {
            self.request_strobe();
        }

        self.session.set_mat_mode(target);
        *self.pending.lock().unwrap() = None;
        self.bus.emit(StationEvent::Transitioned(target));
        TransitionOutcome::Entered(target)
    }

    /// The camera counts as ready while previewing, or while the live stream
    /// is running in any of the live-capture application modes
    fn camera_ready(&self) -> bool {
        match self.session.application_mode() {
            ApplicationMode::Preview => true,
            ApplicationMode::LiveCapture
            | ApplicationMode::CameraFailedToStart
            | ApplicationMode::NoCalibrationData => {
                self.session.video_stream_state() == VideoStreamState::Running
            }
            _ => false,
        }
    }

    /// The strobe only lights a single captured source
    fn request_strobe(&self) {
        let sources = self.session.selected_sources().len();
        if sources == 1 {
            self.bus.emit(StationEvent::StrobeRequested);
        } else {
            info!(sources, "Strobe suppressed for multi-source capture");
        }
    }
}
