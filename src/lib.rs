// SPDX-License-Identifier: GPL-3.0-only

//! Capture Station - live capture orchestration for a projected capture mat
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: device seams and virtual devices
//! - [`compositor`]: multi-source live compositing and viewfinder capture
//! - [`mat_mode`]: serialized lighting mode transitions of the mat
//! - [`capture`]: the prepare/perform capture sequence and its results
//! - [`session`]: shared application state
//! - [`events`]: the event bus connecting everything
//! - [`config`]: user configuration handling
//! - [`station`]: wiring of all of the above

pub mod backends;
pub mod capture;
pub mod compositor;
pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod geometry;
pub mod mat_mode;
pub mod rendezvous;
pub mod session;
pub mod station;
pub mod worker;

// Re-export commonly used types
pub use backends::camera::types::{VideoSourceDescriptor, VideoSourceKind};
pub use capture::{CaptureCoordinator, CaptureDevices, PerformRequest};
pub use compositor::StreamCompositor;
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use events::{EventBus, StationEvent};
pub use mat_mode::{MatMode, MatModeStateMachine};
pub use session::Session;
pub use station::Station;
