// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Picture-in-picture layout
pub mod placement {
    /// Slot table entries as `"x;y;width;height"`, relative to the primary
    /// destination. Slot 0 covers the primary, the rest are the four corners.
    pub const DEFAULT_SLOT_POSITIONS: [&str; 5] = [
        "0;0;1;1",
        "0.6;0.05;0.3;0.3",
        "0.05;0.05;0.3;0.3",
        "0.05;0.65;0.3;0.3",
        "0.6;0.65;0.3;0.3",
    ];

    /// Separator between the four numbers of a slot entry
    pub const SLOT_SEPARATOR: char = ';';
}

/// Capture defaults
pub mod capture {
    /// Fresh frames required from each source before a waiting capture is served
    pub const DEFAULT_SKIP_FRAME_COUNT: i32 = 1;

    /// The downward camera needs longer to settle after the lighting changes
    pub const DOWNWARD_CAMERA_SKIP_FRAME_COUNT: i32 = 3;

    /// Projected mat screen resolution
    pub const MAT_SCREEN_WIDTH: u32 = 1920;
    pub const MAT_SCREEN_HEIGHT: u32 = 1280;

    /// Device id of the synthetic snapshot used for multi-source captures
    pub const COMPOSITED_DEVICE_ID: &str = "composited_stream";

    /// Capture asset names, formatted with chrono
    pub const ASSET_NAME_FORMAT: &str = "IMG_%Y%m%d_%H%M%S";

    /// Extension of debug dumps of captured composites
    pub const DUMP_EXTENSION: &str = "jpg";
}

/// Timing constants
pub mod timing {
    /// Silence after which a live source is reported frozen
    pub const FREEZE_DETECTION_TIMEOUT_MS: u64 = 5000;

    /// Wait for the Flash mode to be entered before capturing
    pub const FLASH_TIMEOUT_MS: u64 = 5000;

    /// Wait for an in-flight mode transition to settle before capturing
    pub const MODE_SETTLE_TIMEOUT_MS: u64 = 5000;

    /// Wait for the render thread to produce the viewfinder image
    pub const VIEWFINDER_TIMEOUT_MS: u64 = 10000;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;
}

/// Simulated hardware used by the `simulate` command and the tests
pub mod virtual_camera {
    use std::time::Duration;

    /// Delay between generated test-pattern frames (about 30 fps)
    pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// Resolution of generated depth and IR frames
    pub const DEPTH_FRAME_WIDTH: u32 = 640;
    pub const DEPTH_FRAME_HEIGHT: u32 = 480;

    /// Resolution of simulated hi-res stills
    pub const STILL_WIDTH: u32 = 4352;
    pub const STILL_HEIGHT: u32 = 3264;
}

/// Application information utilities
pub mod app_info {
    /// Directory name below the user configuration directory
    pub const CONFIG_DIR: &str = "capture-station";

    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
