// SPDX-License-Identifier: GPL-3.0-only

//! Per-source freeze detection

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::worker::{LoopAction, WorkerLoop};

/// Longest the watchdog thread sleeps before re-checking its stop signal
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Deadline {
    at: Mutex<Option<Instant>>,
    changed: Condvar,
}

/// Fires a callback once when no frame arrived for the configured timeout.
///
/// Armed by [`FreezeWatchdog::restart`] (on every frame), disarmed by
/// [`FreezeWatchdog::stop`] or by firing. Without a timeout no thread is
/// started and every call is a no-op.
pub struct FreezeWatchdog {
    deadline: Arc<Deadline>,
    timeout: Option<Duration>,
    worker: Option<WorkerLoop>,
}

impl FreezeWatchdog {
    pub fn new<F>(name: &str, timeout: Option<Duration>, on_frozen: F) -> std::io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let deadline = Arc::new(Deadline::default());
        let worker = match timeout {
            Some(_) => {
                let shared = Arc::clone(&deadline);
                Some(WorkerLoop::start(&format!("freeze-{}", name), move || {
                    let mut at = shared.at.lock().unwrap();
                    let current = *at;
                    match current {
                        Some(expiry) if Instant::now() >= expiry => {
                            *at = None;
                            drop(at);
                            on_frozen();
                        }
                        Some(expiry) => {
                            let wait = expiry.saturating_duration_since(Instant::now());
                            drop(shared.changed.wait_timeout(at, wait.min(POLL_INTERVAL)).unwrap());
                        }
                        None => {
                            drop(shared.changed.wait_timeout(at, POLL_INTERVAL).unwrap());
                        }
                    }
                    LoopAction::Continue
                })?)
            }
            None => None,
        };

        Ok(Self {
            deadline,
            timeout,
            worker,
        })
    }

    /// Arm (or re-arm) the watchdog for a full timeout from now
    pub fn restart(&self) {
        if let Some(timeout) = self.timeout {
            *self.deadline.at.lock().unwrap() = Some(Instant::now() + timeout);
            self.deadline.changed.notify_all();
        }
    }

    /// Disarm without firing
    pub fn stop(&self) {
        *self.deadline.at.lock().unwrap() = None;
        self.deadline.changed.notify_all();
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.at.lock().unwrap().is_some()
    }
}

impl Drop for FreezeWatchdog {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.request_stop();
        }
        self.deadline.changed.notify_all();
    }
}
