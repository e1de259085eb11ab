// SPDX-License-Identifier: GPL-3.0-only

//! Camera seams
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │   Stream Compositor  │        │  Capture Coordinator │
//! └──────────┬───────────┘        └──────────┬───────────┘
//!            │ convert()                     │ capture_still()
//!            ▼                               ▼
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │ SourcePipeline trait │        │   StillCamera trait  │
//! └──────────────────────┘        └──────────────────────┘
//! ```
//!
//! Concrete drivers live outside this crate; the virtual backend implements
//! both traits for simulation and tests.

pub mod types;

pub use types::*;

use crate::capture::asset::SensorSnapshot;
use crate::compositor::framebuffer::Framebuffer;
use crate::errors::HardwareError;

/// A decoding pipeline delivering frames for one live source.
///
/// The driver tells the compositor about each new frame through
/// `StreamCompositor::frame_ready`, from whatever thread it decodes on. It
/// must not hold any lock that [`SourcePipeline::convert`] needs while doing
/// so.
pub trait SourcePipeline: Send + Sync {
    /// Pipeline name, matching the source descriptor name
    fn name(&self) -> &str;

    /// Run the filter chain on the most recent frame and write the result
    /// into `surface`. Called on the render thread only.
    ///
    /// Returns `false` when no frame is available yet.
    fn convert(&self, surface: &mut Framebuffer) -> bool;
}

/// Blocking hi-res still capture through the camera pipeline
pub trait StillCamera: Send + Sync {
    /// Capture one still per sensor involved in `sources`.
    ///
    /// `with_flash` tells the driver the projector strobe is lighting the
    /// scene.
    fn capture_still(
        &self,
        sources: &[VideoSourceDescriptor],
        with_flash: bool,
    ) -> Result<Vec<SensorSnapshot>, HardwareError>;
}
