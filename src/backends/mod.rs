// SPDX-License-Identifier: GPL-3.0-only

//! Device seams and the virtual devices implementing them
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │     Compositor / Capture Coordinator        │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌─────────────┐    ┌──────────────────┐   │
//! │  │   Camera    │    │      Depth       │   │
//! │  │  (traits)   │    │     (trait)      │   │
//! │  └─────────────┘    └──────────────────┘   │
//! │           ┌──────────────────┐              │
//! │           │ Virtual devices  │              │
//! │           └──────────────────┘              │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! - [`camera`]: source descriptors, live pipeline and still capture traits
//! - [`depth`]: depth sensor trait and frame conversion
//! - [`virtual_camera`]: in-process devices for simulation and tests

pub mod camera;
pub mod depth;
pub mod virtual_camera;
