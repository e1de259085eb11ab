// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for worker loops
//!
//! Every long-lived thread in the station (mode transitions, capture jobs,
//! freeze watchdogs, simulated sources) runs through [`WorkerLoop`] so that
//! starting, stopping and joining behave the same everywhere.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a loop running on its own named thread
///
/// The closure is called repeatedly until it returns [`LoopAction::Stop`] or
/// [`WorkerLoop::stop`] is called. The stop signal is checked between
/// iterations, so a closure that blocks (on a channel, a condvar) must be
/// woken by its owner for a stop to take effect promptly.
///
/// ```ignore
/// let worker = WorkerLoop::start("mat-mode-worker", move || match rx.recv() {
///     Ok(command) => {
///         handle(command);
///         LoopAction::Continue
///     }
///     Err(_) => LoopAction::Stop,
/// })?;
/// ```
pub struct WorkerLoop {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl WorkerLoop {
    /// Start a new loop on a thread named `name`
    pub fn start<F>(name: &str, mut loop_fn: F) -> std::io::Result<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting worker loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Worker thread started");

                loop {
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    match loop_fn() {
                        LoopAction::Continue => {}
                        LoopAction::Stop => {
                            debug!(name = %name_clone, "Loop requested stop");
                            break;
                        }
                    }
                }

                info!(name = %name_clone, "Worker thread exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting worker loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending the stop signal.
    ///
    /// A loop may end up dropping its own controller (a listener running on
    /// the worker thread tears the owner down). Joining from the worker
    /// thread itself would never return, so that case only detaches.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                debug!(name = %self.name, "Worker dropped from its own thread, detaching");
                return;
            }
            debug!(name = %self.name, "Waiting for worker thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Worker thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Worker thread finished");
            }
        }
    }
}

impl Drop for WorkerLoop {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "WorkerLoop dropped, stopping loop");
            self.stop();
        }
    }
}
