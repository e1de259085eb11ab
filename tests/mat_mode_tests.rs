// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the mat mode state machine

use std::sync::Arc;
use std::time::Duration;

use capture_station::errors::TransitionError;
use capture_station::events::{EventBus, EventLog};
use capture_station::mat_mode::TransitionOutcome;
use capture_station::session::{ApplicationMode, Session, VideoStreamState};
use capture_station::{
    MatMode, MatModeStateMachine, StationEvent, VideoSourceDescriptor, VideoSourceKind,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn setup() -> (Arc<Session>, Arc<MatModeStateMachine>, Arc<EventLog>) {
    let bus = EventBus::new();
    let log = EventLog::attach(&bus);
    let session = Session::new(bus.clone());
    let modes = MatModeStateMachine::new(Arc::clone(&session), bus).unwrap();
    (session, modes, log)
}

fn select(session: &Session, count: usize) {
    session.set_selected_sources(
        (0..count)
            .map(|index| {
                VideoSourceDescriptor::new(VideoSourceKind::DownwardCamera, format!("cam{}", index))
            })
            .collect(),
    );
}

fn enter(modes: &MatModeStateMachine, target: MatMode) -> TransitionOutcome {
    modes
        .request_with_ack(target)
        .unwrap()
        .wait(Some(TIMEOUT))
        .unwrap()
}

fn mode_changes(log: &EventLog) -> Vec<MatMode> {
    log.events()
        .into_iter()
        .filter_map(|event| match event {
            StationEvent::MatModeChanged(mode) => Some(mode),
            _ => None,
        })
        .collect()
}

#[test]
fn test_transition_passes_through_transitioning_mode() {
    let (session, modes, log) = setup();
    session.set_application_mode(ApplicationMode::Preview);

    assert_eq!(enter(&modes, MatMode::LampOn), TransitionOutcome::Entered(MatMode::LampOn));
    assert_eq!(modes.current(), MatMode::LampOn);
    assert_eq!(
        mode_changes(&log),
        vec![MatMode::TransitioningToLampOn, MatMode::LampOn]
    );
    assert!(log.events().contains(&StationEvent::Transitioned(MatMode::LampOn)));
}

#[test]
fn test_transition_to_current_mode_is_noop() {
    let (_session, modes, log) = setup();

    assert_eq!(enter(&modes, MatMode::None), TransitionOutcome::Unchanged(MatMode::None));
    assert!(mode_changes(&log).is_empty());
    assert!(
        !log.events()
            .iter()
            .any(|event| matches!(event, StationEvent::Transitioned(_)))
    );
}

#[test]
fn test_desktop_needs_no_camera() {
    let (_session, modes, _log) = setup();
    assert_eq!(enter(&modes, MatMode::Desktop), TransitionOutcome::Entered(MatMode::Desktop));
}

#[test]
fn test_rejected_flash_is_retried_when_stream_runs() {
    let (session, modes, log) = setup();
    select(&session, 1);
    session.set_application_mode(ApplicationMode::LiveCapture);

    assert_eq!(enter(&modes, MatMode::Flash), TransitionOutcome::Rejected(MatMode::Flash));
    assert_eq!(modes.current(), MatMode::None);
    assert_eq!(modes.pending_transition(), Some(MatMode::Flash));
    assert!(log.events().contains(&StationEvent::TransitionFailed(MatMode::Flash)));
    assert_eq!(
        mode_changes(&log),
        vec![MatMode::TransitioningToFlash, MatMode::None]
    );

    session.set_video_stream_state(VideoStreamState::Running);
    let entered = log.wait_for(TIMEOUT, |event| {
        *event == StationEvent::Transitioned(MatMode::Flash)
    });
    assert!(entered.is_some());
    assert_eq!(modes.current(), MatMode::Flash);
    assert_eq!(modes.pending_transition(), None);
    assert!(log.events().contains(&StationEvent::StrobeRequested));
}

#[test]
fn test_flash_strobe_suppressed_for_several_sources() {
    let (session, modes, log) = setup();
    select(&session, 2);
    session.set_application_mode(ApplicationMode::Preview);

    assert_eq!(enter(&modes, MatMode::Flash), TransitionOutcome::Entered(MatMode::Flash));
    assert!(!log.events().contains(&StationEvent::StrobeRequested));
}

#[test]
fn test_requests_processed_in_order() {
    let (session, modes, log) = setup();
    session.set_application_mode(ApplicationMode::Preview);

    modes.transition_to(MatMode::LampOn).unwrap();
    modes.transition_to(MatMode::Desktop).unwrap();
    assert_eq!(enter(&modes, MatMode::LampOff), TransitionOutcome::Entered(MatMode::LampOff));

    let entered: Vec<MatMode> = log
        .events()
        .into_iter()
        .filter_map(|event| match event {
            StationEvent::Transitioned(mode) => Some(mode),
            _ => None,
        })
        .collect();
    assert_eq!(entered, vec![MatMode::LampOn, MatMode::Desktop, MatMode::LampOff]);
}

#[test]
fn test_transitioning_target_is_normalized() {
    let (session, modes, _log) = setup();
    session.set_application_mode(ApplicationMode::Preview);

    assert_eq!(
        enter(&modes, MatMode::TransitioningToReprojection),
        TransitionOutcome::Entered(MatMode::Reprojection)
    );
}

#[test]
fn test_requests_after_shutdown_fail() {
    let (_session, modes, _log) = setup();
    modes.shutdown();

    assert_eq!(
        modes.transition_to(MatMode::LampOn),
        Err(TransitionError::WorkerStopped)
    );
}
