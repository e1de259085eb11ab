// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture station

use std::fmt;

use crate::mat_mode::MatMode;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Top-level error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera or depth sensor failures
    Hardware(HardwareError),
    /// Mat mode transitions
    Transition(TransitionError),
    /// Capture pipeline failures
    Capture(CaptureError),
    /// Live stream compositing
    Stream(StreamError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Failures reported by external devices
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareError {
    /// A device the operation needs is not connected
    Unavailable(String),
    /// The device answered with an error code
    SensorFailure {
        device: String,
        code: i32,
        message: String,
    },
    /// The device returned data that cannot be interpreted
    InvalidFrame(String),
}

/// Mat mode transition errors
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionError {
    /// The camera was not ready for the requested mode
    PreconditionFailed(MatMode),
    /// No acknowledgement arrived in time
    AckTimeout(MatMode),
    /// The transition worker has shut down
    WorkerStopped,
}

/// Capture pipeline errors
#[derive(Debug, Clone)]
pub enum CaptureError {
    /// A capture job is already queued
    QueueFull,
    /// The capture worker has shut down
    WorkerStopped,
    /// The compositor produced no viewfinder image
    NoViewfinderImage,
    /// Viewfinder image did not arrive in time
    ViewfinderTimeout,
    /// The flash mode could not be entered
    FlashUnavailable(TransitionError),
    /// The mat mode was still transitioning when the wait ran out
    ModeNotSettled(MatMode),
    /// Ink could not be mapped onto the captured image
    InkTransform(String),
    /// A device failed during capture
    Hardware(HardwareError),
    /// Writing a capture artifact failed
    SaveFailed(String),
    /// A capture step panicked
    Aborted(String),
}

/// Live stream errors
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    /// No source with this name is selected
    UnknownSource(String),
    /// A pipeline was attached to a source that is not selected
    SourceNotSelected(String),
    /// The render side dropped a capture request without fulfilling it
    Abandoned,
    /// A capture request was not fulfilled in time
    TimedOut,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Hardware(e) => write!(f, "Hardware error: {}", e),
            AppError::Transition(e) => write!(f, "Mode transition error: {}", e),
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Stream(e) => write!(f, "Stream error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareError::Unavailable(device) => write!(f, "Device not available: {}", device),
            HardwareError::SensorFailure {
                device,
                code,
                message,
            } => write!(f, "{} failed with code {}: {}", device, code, message),
            HardwareError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
        }
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::PreconditionFailed(mode) => {
                write!(f, "Camera not ready for {}", mode)
            }
            TransitionError::AckTimeout(mode) => {
                write!(f, "Timed out waiting for {} transition", mode)
            }
            TransitionError::WorkerStopped => write!(f, "Transition worker stopped"),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::QueueFull => write!(f, "A capture is already queued"),
            CaptureError::WorkerStopped => write!(f, "Capture worker stopped"),
            CaptureError::NoViewfinderImage => write!(f, "No viewfinder image available"),
            CaptureError::ViewfinderTimeout => write!(f, "Timed out waiting for viewfinder image"),
            CaptureError::FlashUnavailable(e) => write!(f, "Flash unavailable: {}", e),
            CaptureError::ModeNotSettled(mode) => {
                write!(f, "Mat mode still {} when capturing", mode)
            }
            CaptureError::InkTransform(msg) => write!(f, "Cannot place ink: {}", msg),
            CaptureError::Hardware(e) => write!(f, "{}", e),
            CaptureError::SaveFailed(msg) => write!(f, "Save failed: {}", msg),
            CaptureError::Aborted(msg) => write!(f, "Capture aborted: {}", msg),
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::UnknownSource(name) => write!(f, "Unknown source: {}", name),
            StreamError::SourceNotSelected(name) => write!(f, "Source not selected: {}", name),
            StreamError::Abandoned => write!(f, "Capture request abandoned"),
            StreamError::TimedOut => write!(f, "Capture request timed out"),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for HardwareError {}
impl std::error::Error for TransitionError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for StreamError {}

// Conversions from sub-errors to AppError
impl From<HardwareError> for AppError {
    fn from(err: HardwareError) -> Self {
        AppError::Hardware(err)
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::Transition(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<StreamError> for AppError {
    fn from(err: StreamError) -> Self {
        AppError::Stream(err)
    }
}

impl From<HardwareError> for CaptureError {
    fn from(err: HardwareError) -> Self {
        CaptureError::Hardware(err)
    }
}

impl From<TransitionError> for CaptureError {
    fn from(err: TransitionError) -> Self {
        CaptureError::FlashUnavailable(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::SaveFailed(err.to_string())
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::SaveFailed(err.to_string())
    }
}
