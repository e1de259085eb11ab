// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{capture, placement, timing};
use crate::geometry::FrameSize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Startup configuration of the capture station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Picture-in-picture slots as `"x;y;width;height"` in primary-relative
    /// normalized units. Entry 0 is the primary slot.
    pub slot_positions: Vec<String>,
    /// Frames every source must deliver before a waiting capture is served
    pub default_skip_frame_count: i32,
    /// Frames the downward camera must deliver before a waiting capture is served
    pub downward_camera_skip_frame_count: i32,
    /// Frames ignored after a pipeline is attached to a source
    pub startup_skip_frames: u32,
    /// Silence after which a source is reported frozen (0 disables)
    pub freeze_detection_timeout_ms: u64,
    /// How long capture preparation waits for the flash to be entered
    pub flash_timeout_ms: u64,
    /// How long a capture waits for a mode transition in flight to settle
    pub mode_settle_timeout_ms: u64,
    /// How long a capture waits for its composited viewfinder image
    pub viewfinder_timeout_ms: u64,
    /// Dump every captured composite as `<uuid>.jpg` into this folder
    pub captured_images_folder: Option<PathBuf>,
    /// Freeze live surfaces while the operator is inking
    pub suspend_livestream_inking: bool,
    /// Keep the depth streams running during live preview
    pub run_depth_camera_in_live_capture: bool,
    /// Request a Reprojection mode after each capture
    pub reproject_after_capture: bool,
    /// Resolution of the projected mat screen
    pub mat_screen_width: u32,
    pub mat_screen_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slot_positions: placement::DEFAULT_SLOT_POSITIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_skip_frame_count: capture::DEFAULT_SKIP_FRAME_COUNT,
            downward_camera_skip_frame_count: capture::DOWNWARD_CAMERA_SKIP_FRAME_COUNT,
            startup_skip_frames: 0,
            freeze_detection_timeout_ms: timing::FREEZE_DETECTION_TIMEOUT_MS,
            flash_timeout_ms: timing::FLASH_TIMEOUT_MS,
            mode_settle_timeout_ms: timing::MODE_SETTLE_TIMEOUT_MS,
            viewfinder_timeout_ms: timing::VIEWFINDER_TIMEOUT_MS,
            captured_images_folder: None,
            suspend_livestream_inking: false,
            run_depth_camera_in_live_capture: false,
            reproject_after_capture: false,
            mat_screen_width: capture::MAT_SCREEN_WIDTH,
            mat_screen_height: capture::MAT_SCREEN_HEIGHT,
        }
    }
}

impl Config {
    /// Default location: `$XDG_CONFIG_HOME/capture-station/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(crate::constants::app_info::CONFIG_DIR).join("config.json"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("No configuration directory available, using defaults");
                Self::default()
            }
        }
    }

    /// Load from `path`.
    ///
    /// A missing file yields the defaults silently. An unreadable or invalid
    /// file yields the defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read configuration, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str::<Config>(&contents) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid configuration, using defaults");
                Self::default()
            }
        }
    }

    /// Write the configuration as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> crate::errors::AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn mat_screen_size(&self) -> FrameSize {
        FrameSize::new(self.mat_screen_width, self.mat_screen_height)
    }

    /// `None` when freeze detection is disabled
    pub fn freeze_detection_timeout(&self) -> Option<Duration> {
        (self.freeze_detection_timeout_ms > 0)
            .then(|| Duration::from_millis(self.freeze_detection_timeout_ms))
    }

    pub fn flash_timeout(&self) -> Duration {
        Duration::from_millis(self.flash_timeout_ms)
    }

    pub fn mode_settle_timeout(&self) -> Duration {
        Duration::from_millis(self.mode_settle_timeout_ms)
    }

    pub fn viewfinder_timeout(&self) -> Duration {
        Duration::from_millis(self.viewfinder_timeout_ms)
    }
}
