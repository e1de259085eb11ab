// SPDX-License-Identifier: GPL-3.0-only

//! Shared session state
//!
//! The UI layer owns what is selected and how the live view is framed. The
//! components read it from here and change only the parts they own (the
//! mode worker owns the mat mode, the capture worker owns the capture state).
//! Every setter emits a change event only when the value actually changed,
//! after the state lock is released.

use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backends::camera::types::VideoSourceDescriptor;
use crate::events::{EventBus, StationEvent};
use crate::geometry::RectF;
use crate::mat_mode::MatMode;

/// What the application as a whole is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ApplicationMode {
    #[default]
    None,
    LiveCapture,
    Preview,
    CameraFailedToStart,
    NoCalibrationData,
    NoVideoSource,
    ColorCorrectionCalibration,
    KeystoneCorrectionCalibration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VideoStreamState {
    #[default]
    Stopped,
    Starting,
    Running,
    FailedToStart,
    CalibrationDataMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CaptureState {
    #[default]
    NotCapturing,
    PreparingCapture,
    CapturePrepared,
    Capturing,
    FinalizingCapture,
}

/// Lighting that was active when a capture was prepared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreCaptureMode {
    LampOff,
    LampOn,
    Desktop,
}

impl PreCaptureMode {
    pub fn from_mat_mode(mode: MatMode) -> Option<Self> {
        match mode {
            MatMode::LampOff => Some(PreCaptureMode::LampOff),
            MatMode::LampOn => Some(PreCaptureMode::LampOn),
            MatMode::Desktop => Some(PreCaptureMode::Desktop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    application_mode: ApplicationMode,
    video_stream_state: VideoStreamState,
    capture_state: CaptureState,
    mat_mode: MatMode,
    pre_capture_mode: Option<PreCaptureMode>,
    selected_sources: Vec<VideoSourceDescriptor>,
    viewport: RectF,
    inking: bool,
    depth_camera_present: bool,
}

/// Thread-safe session state shared by all components
#[derive(Debug)]
pub struct Session {
    state: RwLock<SessionState>,
    bus: EventBus,
    /// Notified on every mat mode change
    mat_mode_changed: (Mutex<()>, Condvar),
}

impl Session {
    pub fn new(bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(SessionState {
                viewport: RectF::unit(),
                ..Default::default()
            }),
            bus,
            mat_mode_changed: (Mutex::new(()), Condvar::new()),
        })
    }

    /// Apply `update` and emit `event` if the field selected by `field`
    /// changed
    fn update<T, F, E>(&self, value: T, field: F, event: E)
    where
        T: PartialEq + Clone,
        F: FnOnce(&mut SessionState) -> &mut T,
        E: FnOnce(T) -> StationEvent,
    {
        let changed = {
            let mut state = self.state.write().unwrap();
            let slot = field(&mut state);
            if *slot == value {
                false
            } else {
                *slot = value.clone();
                true
            }
        };
        if changed {
            self.bus.emit(event(value));
        }
    }

    pub fn application_mode(&self) -> ApplicationMode {
        self.state.read().unwrap().application_mode
    }

    pub fn set_application_mode(&self, mode: ApplicationMode) {
        debug!(mode = ?mode, "Application mode");
        self.update(
            mode,
            |s| &mut s.application_mode,
            StationEvent::ApplicationModeChanged,
        );
    }

    pub fn video_stream_state(&self) -> VideoStreamState {
        self.state.read().unwrap().video_stream_state
    }

    pub fn set_video_stream_state(&self, state: VideoStreamState) {
        debug!(state = ?state, "Video stream state");
        self.update(
            state,
            |s| &mut s.video_stream_state,
            StationEvent::VideoStreamStateChanged,
        );
    }

    pub fn capture_state(&self) -> CaptureState {
        self.state.read().unwrap().capture_state
    }

    pub fn set_capture_state(&self, state: CaptureState) {
        debug!(state = ?state, "Capture state");
        self.update(
            state,
            |s| &mut s.capture_state,
            StationEvent::CaptureStateChanged,
        );
    }

    pub fn mat_mode(&self) -> MatMode {
        self.state.read().unwrap().mat_mode
    }

    /// Only the mode transition worker should call this
    pub(crate) fn set_mat_mode(&self, mode: MatMode) {
        self.update(mode, |s| &mut s.mat_mode, StationEvent::MatModeChanged);
        let (lock, changed) = &self.mat_mode_changed;
        let _guard = lock.lock().unwrap();
        changed.notify_all();
    }

    /// Block until the mat mode is not a `TransitioningTo*` value.
    ///
    /// Returns the steady mode, or `Err` with the transitioning mode still
    /// current when `timeout` runs out.
    pub fn wait_for_steady_mat_mode(&self, timeout: Duration) -> Result<MatMode, MatMode> {
        let deadline = Instant::now() + timeout;
        let (lock, changed) = &self.mat_mode_changed;
        let mut guard = lock.lock().unwrap();
        loop {
            let mode = self.mat_mode();
            if !mode.is_transitioning() {
                return Ok(mode);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(mode);
            }
            debug!(mode = %mode, "Waiting for mat mode to settle");
            guard = changed.wait_timeout(guard, deadline - now).unwrap().0;
        }
    }

    pub fn pre_capture_mode(&self) -> Option<PreCaptureMode> {
        self.state.read().unwrap().pre_capture_mode
    }

    pub fn set_pre_capture_mode(&self, mode: Option<PreCaptureMode>) {
        self.state.write().unwrap().pre_capture_mode = mode;
    }

    pub fn selected_sources(&self) -> Vec<VideoSourceDescriptor> {
        self.state.read().unwrap().selected_sources.clone()
    }

    /// Replace the selection. Duplicates are dropped, keeping the first
    /// occurrence, so index 0 stays the primary source.
    pub fn set_selected_sources(&self, sources: Vec<VideoSourceDescriptor>) {
        let mut unique: Vec<VideoSourceDescriptor> = Vec::with_capacity(sources.len());
        for source in sources {
            if !unique.contains(&source) {
                unique.push(source);
            }
        }
        self.update(
            unique,
            |s| &mut s.selected_sources,
            StationEvent::SelectedSourcesChanged,
        );
    }

    /// Normalized region of the primary source shown in the live view
    pub fn viewport(&self) -> RectF {
        self.state.read().unwrap().viewport
    }

    pub fn set_viewport(&self, viewport: RectF) {
        self.state.write().unwrap().viewport = viewport;
    }

    /// Whether the operator is currently drawing on the live view
    pub fn is_inking(&self) -> bool {
        self.state.read().unwrap().inking
    }

    pub fn set_inking(&self, inking: bool) {
        self.state.write().unwrap().inking = inking;
    }

    pub fn depth_camera_present(&self) -> bool {
        self.state.read().unwrap().depth_camera_present
    }

    pub fn set_depth_camera_present(&self, present: bool) {
        self.state.write().unwrap().depth_camera_present = present;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::VideoSourceKind;
    use crate::events::EventLog;

    #[test]
    fn test_setter_emits_only_on_change() {
        let bus = EventBus::new();
        let log = EventLog::attach(&bus);
        let session = Session::new(bus);

        session.set_video_stream_state(VideoStreamState::Running);
        session.set_video_stream_state(VideoStreamState::Running);

        assert_eq!(
            log.events(),
            vec![StationEvent::VideoStreamStateChanged(VideoStreamState::Running)]
        );
    }

    #[test]
    fn test_selection_is_deduplicated_in_order() {
        let session = Session::new(EventBus::new());
        let down = VideoSourceDescriptor::new(VideoSourceKind::DownwardCamera, "down");
        let mat = VideoSourceDescriptor::new(VideoSourceKind::MatDesktop, "mat");

        session.set_selected_sources(vec![down.clone(), mat.clone(), down.clone()]);

        assert_eq!(session.selected_sources(), vec![down, mat]);
    }

    #[test]
    fn test_pre_capture_mode_from_mat_mode() {
        assert_eq!(
            PreCaptureMode::from_mat_mode(MatMode::LampOn),
            Some(PreCaptureMode::LampOn)
        );
        assert_eq!(PreCaptureMode::from_mat_mode(MatMode::Flash), None);
    }

    #[test]
    fn test_wait_for_steady_mode_returns_settled_mode() {
        let session = Session::new(EventBus::new());
        session.set_mat_mode(MatMode::TransitioningToLampOn);

        let setter = Arc::clone(&session);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            setter.set_mat_mode(MatMode::LampOn);
        });

        assert_eq!(
            session.wait_for_steady_mat_mode(Duration::from_secs(5)),
            Ok(MatMode::LampOn)
        );
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_steady_mode_times_out() {
        let session = Session::new(EventBus::new());
        session.set_mat_mode(MatMode::TransitioningToLampOff);

        assert_eq!(
            session.wait_for_steady_mat_mode(Duration::from_millis(20)),
            Err(MatMode::TransitioningToLampOff)
        );
        assert_eq!(
            Session::new(EventBus::new()).wait_for_steady_mat_mode(Duration::ZERO),
            Ok(MatMode::None)
        );
    }
}
