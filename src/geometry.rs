// SPDX-License-Identifier: GPL-3.0-only

//! Plane geometry used by placement and capture math
//!
//! Rectangles carry signed extents: a negative height is how the compositor
//! expresses a vertically inverted blit, the same way a GL framebuffer blit
//! flips when its source and destination rectangles disagree in orientation.

use serde::{Deserialize, Serialize};

/// Pixel dimensions of a frame or framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A size with either dimension zero cannot be composited
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn to_f(self) -> SizeF {
        SizeF::new(self.width as f64, self.height as f64)
    }

    /// Largest size with this aspect ratio that fits inside `bound`
    pub fn scaled_to_fit(self, bound: FrameSize) -> FrameSize {
        if self.is_empty() {
            return bound;
        }
        let scaled = self.to_f().scaled_to_fit(bound.to_f());
        FrameSize::new(scaled.width.round() as u32, scaled.height.round() as u32)
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for FrameSize {
    type Err = String;

    /// Parse `WxH`, e.g. `1920x1080`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid dimension '{}': {}", v, e))
        };
        Ok(FrameSize::new(parse(width)?, parse(height)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SizeF {
    pub width: f64,
    pub height: f64,
}

impl SizeF {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Keep-aspect-ratio scaling into `bound`
    pub fn scaled_to_fit(self, bound: SizeF) -> SizeF {
        if self.is_empty() {
            return bound;
        }
        let width_for_bound_height = bound.height * self.width / self.height;
        if width_for_bound_height <= bound.width {
            SizeF::new(width_for_bound_height, bound.height)
        } else {
            SizeF::new(bound.width, bound.width * self.height / self.width)
        }
    }
}

/// Floating point rectangle, also used for normalized viewports
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole-frame viewport `(0, 0, 1, 1)`
    pub const fn unit() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    pub fn from_size(size: SizeF) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn size(&self) -> SizeF {
        SizeF::new(self.width, self.height)
    }

    pub fn center(&self) -> PointF {
        PointF::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Same area with non-negative extents
    pub fn normalized(&self) -> RectF {
        let (x, width) = if self.width < 0.0 {
            (self.x + self.width, -self.width)
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.height < 0.0 {
            (self.y + self.height, -self.height)
        } else {
            (self.y, self.height)
        };
        RectF::new(x, y, width, height)
    }

    /// Restrict a normalized viewport to the `[0, 1]` frame on every edge.
    ///
    /// Moving one edge keeps the opposite edge where it was.
    pub fn clamped_to_unit(&self) -> RectF {
        let left = self.left().max(0.0);
        let top = self.top().max(0.0);
        let right = self.right().min(1.0);
        let bottom = self.bottom().min(1.0);
        RectF::new(left, top, (right - left).max(0.0), (bottom - top).max(0.0))
    }

    /// Shrink `self` so that none of its edges lies outside `bounds`
    pub fn bounded_by(&self, bounds: &RectF) -> RectF {
        let left = self.left().max(bounds.left());
        let top = self.top().max(bounds.top());
        let right = self.right().min(bounds.right());
        let bottom = self.bottom().min(bounds.bottom());
        RectF::new(left, top, right - left, bottom - top)
    }

    /// Scale a normalized rectangle into absolute coordinates of `size`
    pub fn denormalized(&self, size: SizeF) -> RectF {
        RectF::new(
            self.x * size.width,
            self.y * size.height,
            self.width * size.width,
            self.height * size.height,
        )
    }

    /// Flip vertically inside a surface of the given height
    pub fn inverted_y(&self, surface_height: f64) -> RectF {
        RectF::new(self.x, surface_height - self.y, self.width, -self.height)
    }

    pub fn corners(&self) -> [PointF; 4] {
        [
            PointF::new(self.left(), self.top()),
            PointF::new(self.right(), self.top()),
            PointF::new(self.right(), self.bottom()),
            PointF::new(self.left(), self.bottom()),
        ]
    }

    /// Integer rectangle with each component rounded independently
    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.x.round() as i32,
            self.y.round() as i32,
            self.width.round() as i32,
            self.height.round() as i32,
        )
    }
}

/// Integer rectangle with signed extents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(size: FrameSize) -> Self {
        Self::new(0, 0, size.width as i32, size.height as i32)
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn to_f(self) -> RectF {
        RectF::new(
            self.x as f64,
            self.y as f64,
            self.width as f64,
            self.height as f64,
        )
    }
}

/// Axis-aligned affine transform (scale then translate)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub m11: f64,
    pub m22: f64,
    pub dx: f64,
    pub dy: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub const fn identity() -> Self {
        Self {
            m11: 1.0,
            m22: 1.0,
            dx: 0.0,
            dy: 0.0,
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            m11: sx,
            m22: sy,
            dx: 0.0,
            dy: 0.0,
        }
    }

    /// Translate after scaling
    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self {
            dx: self.dx + dx,
            dy: self.dy + dy,
            ..self
        }
    }

    /// Transform mapping the corners of `from` onto the corners of `to`.
    ///
    /// Returns `None` when `from` has no area.
    pub fn rect_to_rect(from: &RectF, to: &RectF) -> Option<Self> {
        if from.width == 0.0 || from.height == 0.0 {
            return None;
        }
        let m11 = to.width / from.width;
        let m22 = to.height / from.height;
        Some(Self {
            m11,
            m22,
            dx: to.x - from.x * m11,
            dy: to.y - from.y * m22,
        })
    }

    pub fn map_point(&self, point: PointF) -> PointF {
        PointF::new(point.x * self.m11 + self.dx, point.y * self.m22 + self.dy)
    }

    /// Bounding rectangle of the mapped corners (always normalized)
    pub fn map_rect(&self, rect: &RectF) -> RectF {
        let a = self.map_point(PointF::new(rect.left(), rect.top()));
        let b = self.map_point(PointF::new(rect.right(), rect.bottom()));
        RectF::new(a.x, a.y, b.x - a.x, b.y - a.y).normalized()
    }
}

/// Clamp `viewport` to the frame and build the transform that letterboxes the
/// visible part of a `source_size` frame into `target`.
///
/// The transform maps viewport-local frame pixels (origin at the viewport's
/// top-left corner) onto `target`.
pub fn transform_from_viewport(
    viewport: &mut RectF,
    source_size: SizeF,
    target: &RectF,
) -> Option<Transform> {
    *viewport = viewport.clamped_to_unit();

    let video_frame_size = SizeF::new(
        viewport.width * source_size.width,
        viewport.height * source_size.height,
    );
    let scaled = video_frame_size.scaled_to_fit(target.size());
    let center = target.center();
    let window = RectF::new(
        center.x - scaled.width / 2.0,
        center.y - scaled.height / 2.0,
        scaled.width,
        scaled.height,
    );

    Transform::rect_to_rect(&RectF::from_size(video_frame_size), &window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_parse() {
        assert_eq!("1920x1080".parse::<FrameSize>(), Ok(FrameSize::new(1920, 1080)));
        assert!("1920".parse::<FrameSize>().is_err());
        assert!("axb".parse::<FrameSize>().is_err());
    }

    #[test]
    fn test_viewport_clamped_on_each_edge() {
        let clamped = RectF::new(-0.25, 0.5, 1.0, 0.75).clamped_to_unit();
        assert_eq!(clamped, RectF::new(0.0, 0.5, 0.75, 0.5));
    }

    #[test]
    fn test_scaled_to_fit_keeps_aspect() {
        let scaled = SizeF::new(1920.0, 1080.0).scaled_to_fit(SizeF::new(240.0, 180.0));
        assert_eq!(scaled, SizeF::new(240.0, 135.0));

        let scaled = SizeF::new(640.0, 480.0).scaled_to_fit(SizeF::new(240.0, 240.0));
        assert_eq!(scaled, SizeF::new(240.0, 180.0));
    }

    #[test]
    fn test_rect_to_rect_maps_corners() {
        let from = RectF::new(100.0, 50.0, 200.0, 100.0);
        let to = RectF::new(0.0, 0.0, 400.0, 400.0);
        let transform = Transform::rect_to_rect(&from, &to).unwrap();

        assert_eq!(transform.map_point(PointF::new(100.0, 50.0)), PointF::new(0.0, 0.0));
        assert_eq!(transform.map_point(PointF::new(300.0, 150.0)), PointF::new(400.0, 400.0));
        assert!(Transform::rect_to_rect(&RectF::default(), &to).is_none());
    }

    #[test]
    fn test_transform_from_viewport_letterboxes() {
        let mut viewport = RectF::unit();
        let target = RectF::new(0.0, 0.0, 800.0, 800.0);
        let transform =
            transform_from_viewport(&mut viewport, SizeF::new(1600.0, 1200.0), &target).unwrap();

        let mapped = transform.map_rect(&RectF::new(0.0, 0.0, 1600.0, 1200.0));
        assert_eq!(mapped, RectF::new(0.0, 100.0, 800.0, 600.0));
    }

    #[test]
    fn test_map_rect_normalizes_inverted_input() {
        let transform = Transform::scale(0.5, 0.5);
        let mapped = transform.map_rect(&RectF::new(0.0, 600.0, 800.0, -600.0));
        assert_eq!(mapped, RectF::new(0.0, 0.0, 400.0, 300.0));
    }
}
