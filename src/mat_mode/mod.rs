// SPDX-License-Identifier: GPL-3.0-only

//! Hardware mode state machine
//!
//! Sequences the projector, lamp and camera through named [`MatMode`]s.
//! Requests are queued to a single worker thread and served strictly in
//! order. Each transition passes through the matching `TransitioningTo*`
//! value, then either settles on the target or rolls back to the previous
//! mode. A target rejected because the camera was not ready is remembered
//! and retried once when the video stream reaches Running.

mod worker;

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{AppResult, TransitionError};
use crate::events::{EventBus, EventListener, StationEvent};
use crate::rendezvous::{Consumer, Producer, rendezvous};
use crate::session::{Session, VideoStreamState};
use crate::worker::{LoopAction, WorkerLoop};

use worker::TransitionWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatMode {
    #[default]
    None,
    TransitioningToNone,
    LampOff,
    TransitioningToLampOff,
    LampOn,
    TransitioningToLampOn,
    Desktop,
    TransitioningToDesktop,
    Flash,
    TransitioningToFlash,
    Reprojection,
    TransitioningToReprojection,
}

impl MatMode {
    /// Modes a transition can target
    pub const STEADY: [MatMode; 6] = [
        MatMode::None,
        MatMode::LampOff,
        MatMode::LampOn,
        MatMode::Desktop,
        MatMode::Flash,
        MatMode::Reprojection,
    ];

    /// The in-between value shown while moving to `self`
    pub fn transitioning(self) -> MatMode {
        match self.steady() {
            MatMode::None => MatMode::TransitioningToNone,
            MatMode::LampOff => MatMode::TransitioningToLampOff,
            MatMode::LampOn => MatMode::TransitioningToLampOn,
            MatMode::Desktop => MatMode::TransitioningToDesktop,
            MatMode::Flash => MatMode::TransitioningToFlash,
            _ => MatMode::TransitioningToReprojection,
        }
    }

    /// The mode a transitioning value leads to (steady modes map to
    /// themselves)
    pub fn steady(self) -> MatMode {
        match self {
            MatMode::TransitioningToNone => MatMode::None,
            MatMode::TransitioningToLampOff => MatMode::LampOff,
            MatMode::TransitioningToLampOn => MatMode::LampOn,
            MatMode::TransitioningToDesktop => MatMode::Desktop,
            MatMode::TransitioningToFlash => MatMode::Flash,
            MatMode::TransitioningToReprojection => MatMode::Reprojection,
            steady => steady,
        }
    }

    pub fn is_transitioning(self) -> bool {
        self.steady() != self
    }

    /// Whether entering this mode needs a running camera
    pub fn requires_camera(self) -> bool {
        matches!(
            self.steady(),
            MatMode::LampOff | MatMode::LampOn | MatMode::Flash
        )
    }
}

impl std::fmt::Display for MatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Result of one transition request, as seen through an acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The target mode was entered
    Entered(MatMode),
    /// The target was already the current mode
    Unchanged(MatMode),
    /// The precondition failed and the previous mode was restored
    Rejected(MatMode),
}

pub(crate) struct TransitionCommand {
    target: MatMode,
    ack: Option<Producer<TransitionOutcome>>,
}

struct Shared {
    session: Arc<Session>,
    sender: Mutex<Option<Sender<TransitionCommand>>>,
    pending: Arc<Mutex<Option<MatMode>>>,
}

impl Shared {
    fn submit(&self, command: TransitionCommand) -> Result<(), TransitionError> {
        let sender = self.sender.lock().unwrap();
        match sender.as_ref() {
            Some(sender) => sender
                .send(command)
                .map_err(|_| TransitionError::WorkerStopped),
            None => Err(TransitionError::WorkerStopped),
        }
    }
}

impl EventListener for Shared {
    fn on_event(&self, event: &StationEvent) {
        if let StationEvent::VideoStreamStateChanged(VideoStreamState::Running) = event {
            let retry = self.pending.lock().unwrap().take();
            if let Some(target) = retry {
                info!(target = %target, "Camera running, retrying transition");
                if let Err(e) = self.submit(TransitionCommand { target, ack: None }) {
                    debug!(error = %e, "Retry not submitted");
                }
            }
        }
    }
}

pub struct MatModeStateMachine {
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerLoop>>,
}

impl MatModeStateMachine {
    pub fn new(session: Arc<Session>, bus: EventBus) -> AppResult<Arc<Self>> {
        let (tx, rx) = mpsc::channel::<TransitionCommand>();
        let pending = Arc::new(Mutex::new(None));
        let worker = TransitionWorker::new(Arc::clone(&session), bus.clone(), Arc::clone(&pending));

        let worker_loop = WorkerLoop::start("mat-mode-worker", move || match rx.recv() {
            Ok(command) => {
                worker.process(command.target, command.ack);
                LoopAction::Continue
            }
            Err(_) => LoopAction::Stop,
        })?;

        let shared = Arc::new(Shared {
            session,
            sender: Mutex::new(Some(tx)),
            pending,
        });
        bus.subscribe_weak(&shared);

        Ok(Arc::new(Self {
            shared,
            worker: Mutex::new(Some(worker_loop)),
        }))
    }

    /// Current mode, possibly a transitioning value
    pub fn current(&self) -> MatMode {
        self.shared.session.mat_mode()
    }

    /// Queue a transition to `target`
    pub fn transition_to(&self, target: MatMode) -> Result<(), TransitionError> {
        let target = target.steady();
        debug!(target = %target, "Transition requested");
        self.shared.submit(TransitionCommand { target, ack: None })
    }

    /// Queue a transition and get a handle resolved with the outcome of
    /// exactly this request
    pub fn request_with_ack(
        &self,
        target: MatMode,
    ) -> Result<Consumer<TransitionOutcome>, TransitionError> {
        let target = target.steady();
        let (producer, consumer) = rendezvous();
        debug!(target = %target, "Transition requested with acknowledgement");
        self.shared.submit(TransitionCommand {
            target,
            ack: Some(producer),
        })?;
        Ok(consumer)
    }

    /// Target remembered for retry after a rejected transition
    pub fn pending_transition(&self) -> Option<MatMode> {
        *self.shared.pending.lock().unwrap()
    }

    /// Stop accepting requests, let the worker drain its queue and join it
    pub fn shutdown(&self) {
        let sender = self.shared.sender.lock().unwrap().take();
        drop(sender);
        if let Some(mut worker) = self.worker.lock().unwrap().take() {
            info!("Stopping mat mode worker");
            worker.join();
        }
    }
}

impl Drop for MatModeStateMachine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
