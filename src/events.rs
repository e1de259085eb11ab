// SPDX-License-Identifier: GPL-3.0-only

//! Station-wide notifications
//!
//! Components publish [`StationEvent`]s on an [`EventBus`] that is handed to
//! them at construction. Events are always emitted after the publisher has
//! released its own locks, so a listener may call back into any component.

use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

use crate::backends::camera::types::VideoSourceDescriptor;
use crate::geometry::FrameSize;
use crate::mat_mode::MatMode;
use crate::session::{ApplicationMode, CaptureState, VideoStreamState};

#[derive(Debug, Clone, PartialEq)]
pub enum StationEvent {
    /// The current mat mode changed (steady or transitioning)
    MatModeChanged(MatMode),
    /// A requested transition settled on its target
    Transitioned(MatMode),
    /// A requested transition was rejected and rolled back
    TransitionFailed(MatMode),
    /// The projector should fire its strobe
    StrobeRequested,
    ApplicationModeChanged(ApplicationMode),
    VideoStreamStateChanged(VideoStreamState),
    CaptureStateChanged(CaptureState),
    SelectedSourcesChanged(Vec<VideoSourceDescriptor>),
    /// Every selected source has delivered a frame, repaint
    CompositorUpdated,
    /// A source stopped delivering frames
    StreamFrozen(VideoSourceDescriptor),
    /// A composited capture image was read back
    CaptureProduced(FrameSize),
    /// A capture asset reached the project sink
    CapturePublished(String),
    /// A capture job failed and nothing was published
    CaptureFailed(String),
}

/// Observer of station events
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &StationEvent);
}

impl<F> EventListener for F
where
    F: Fn(&StationEvent) + Send + Sync,
{
    fn on_event(&self, event: &StationEvent) {
        self(event)
    }
}

/// Forwards to a component without keeping it alive
struct WeakListener<T>(Weak<T>);

impl<T: EventListener> EventListener for WeakListener<T> {
    fn on_event(&self, event: &StationEvent) {
        if let Some(target) = self.0.upgrade() {
            target.on_event(event);
        }
    }
}

/// Synchronous fan-out to registered listeners
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<Vec<Arc<dyn EventListener>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    /// Subscribe a component through a weak reference so the bus does not
    /// keep it alive
    pub fn subscribe_weak<T: EventListener + 'static>(&self, target: &Arc<T>) {
        self.subscribe(Arc::new(WeakListener(Arc::downgrade(target))));
    }

    /// Deliver `event` to every listener on the calling thread
    pub fn emit(&self, event: StationEvent) {
        let listeners = self.listeners.read().unwrap().clone();
        for listener in listeners {
            listener.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().unwrap().len())
            .finish()
    }
}

/// Listener that records every event, with blocking waits for tests and the
/// command line simulation
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<StationEvent>>,
    changed: Condvar,
}

impl EventLog {
    /// Create a log and subscribe it to `bus`
    pub fn attach(bus: &EventBus) -> Arc<Self> {
        let log = Arc::new(Self::default());
        bus.subscribe(log.clone());
        log
    }

    pub fn events(&self) -> Vec<StationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Block until an event matching `predicate` has been recorded.
    ///
    /// Returns the first matching event, or `None` on timeout.
    pub fn wait_for<P>(&self, timeout: Duration, predicate: P) -> Option<StationEvent>
    where
        P: Fn(&StationEvent) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock().unwrap();
        loop {
            if let Some(found) = events.iter().find(|e| predicate(e)) {
                return Some(found.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            events = self.changed.wait_timeout(events, deadline - now).unwrap().0;
        }
    }
}

impl EventListener for EventLog {
    fn on_event(&self, event: &StationEvent) {
        self.events.lock().unwrap().push(event.clone());
        self.changed.notify_all();
    }
}
