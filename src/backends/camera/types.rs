// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for live video sources

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::geometry::FrameSize;

/// Physical or virtual origin of a live feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoSourceKind {
    /// Camera looking down at the mat
    DownwardCamera,
    /// Camera facing the operator
    ForwardCamera,
    /// Combined depth and color sensor
    CombinedDepthColorCamera,
    /// The monitor desktop
    PrimaryDesktop,
    /// The projected mat desktop
    MatDesktop,
    /// Generic USB webcam
    Webcamera,
}

impl VideoSourceKind {
    pub const ALL: [VideoSourceKind; 6] = [
        VideoSourceKind::DownwardCamera,
        VideoSourceKind::ForwardCamera,
        VideoSourceKind::CombinedDepthColorCamera,
        VideoSourceKind::PrimaryDesktop,
        VideoSourceKind::MatDesktop,
        VideoSourceKind::Webcamera,
    ];

    /// Sources that can be paired with a depth and IR capture
    pub fn supports_depth_capture(&self) -> bool {
        matches!(
            self,
            VideoSourceKind::DownwardCamera | VideoSourceKind::CombinedDepthColorCamera
        )
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            VideoSourceKind::DownwardCamera => "downward",
            VideoSourceKind::ForwardCamera => "forward",
            VideoSourceKind::CombinedDepthColorCamera => "depth-color",
            VideoSourceKind::PrimaryDesktop => "desktop",
            VideoSourceKind::MatDesktop => "mat",
            VideoSourceKind::Webcamera => "webcam",
        }
    }
}

impl std::fmt::Display for VideoSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for VideoSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.display_name() == s)
            .ok_or_else(|| format!("unknown source kind '{}'", s))
    }
}

/// Framerate as a fraction (numerator/denominator)
/// Stores exact framerate to handle NTSC rates like 59.94fps (60000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show decimal for non-integer framerates (NTSC)
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

/// Identity of a live source plus its last known format.
///
/// Two descriptors are the same source when kind and name match; the format
/// fields are informational and excluded from equality and hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSourceDescriptor {
    pub kind: VideoSourceKind,
    /// Pipeline name, unique per source
    pub name: String,
    pub resolution: Option<FrameSize>,
    pub framerate: Option<Framerate>,
}

impl VideoSourceDescriptor {
    pub fn new(kind: VideoSourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            resolution: None,
            framerate: None,
        }
    }

    pub fn with_format(mut self, resolution: FrameSize, framerate: Framerate) -> Self {
        self.resolution = Some(resolution);
        self.framerate = Some(framerate);
        self
    }
}

impl PartialEq for VideoSourceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.name == other.name
    }
}

impl Eq for VideoSourceDescriptor {}

impl Hash for VideoSourceDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.name.hash(state);
    }
}

impl std::fmt::Display for VideoSourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// Lighting compensation applied to a captured image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorCorrectionMode {
    #[default]
    None,
    LampOff,
    LampOn,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_descriptor_identity_ignores_format() {
        let plain = VideoSourceDescriptor::new(VideoSourceKind::DownwardCamera, "down");
        let with_format = plain
            .clone()
            .with_format(FrameSize::new(1600, 1200), Framerate::from_int(15));

        assert_eq!(plain, with_format);
        let set: HashSet<_> = [plain, with_format].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_descriptor_kind_is_part_of_identity() {
        let a = VideoSourceDescriptor::new(VideoSourceKind::DownwardCamera, "cam");
        let b = VideoSourceDescriptor::new(VideoSourceKind::ForwardCamera, "cam");
        assert_ne!(a, b);
    }

    #[test]
    fn test_kind_round_trips_through_display_name() {
        for kind in VideoSourceKind::ALL {
            assert_eq!(kind.display_name().parse::<VideoSourceKind>(), Ok(kind));
        }
        assert!("scanner".parse::<VideoSourceKind>().is_err());
    }

    #[test]
    fn test_framerate_display() {
        assert_eq!(Framerate::new(60000, 1001).to_string(), "59.94");
        assert_eq!(Framerate::from_int(30).to_string(), "30");
        assert_eq!(Framerate::new(30, 0).denom, 1);
    }
}
