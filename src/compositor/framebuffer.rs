// SPDX-License-Identifier: GPL-3.0-only

//! CPU framebuffers with GL-style blits
//!
//! Rows are stored bottom-up like a GL framebuffer: uploading an image puts
//! its first row at `y = 0` and [`Framebuffer::to_image`] flips on read-back.
//! Blit rectangles are signed, so opposite orientations between source and
//! destination flip the copy.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use image::{Rgba, RgbaImage};

use crate::geometry::{FrameSize, Rect};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a render context, used to key per-context surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

/// Rendering context owned by the render thread.
///
/// Deliberately neither `Send` nor `Sync`: surfaces created for a context
/// are only ever touched from the thread that owns it.
#[derive(Debug)]
pub struct RenderContext {
    id: ContextId,
    _not_send: PhantomData<*const ()>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            _not_send: PhantomData,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

/// RGBA8 pixel storage addressed in GL orientation
#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer {
    pixels: RgbaImage,
}

impl Framebuffer {
    /// Transparent framebuffer of the given size
    pub fn new(size: FrameSize) -> Self {
        Self {
            pixels: RgbaImage::new(size.width, size.height),
        }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.pixels.width(), self.pixels.height())
    }

    /// Replace the contents with `image` (top row first), resizing if needed
    pub fn upload(&mut self, image: &RgbaImage) {
        if self.pixels.dimensions() == image.dimensions() {
            self.pixels.copy_from_slice(image.as_raw());
        } else {
            self.pixels = image.clone();
        }
    }

    pub fn clear(&mut self, color: Rgba<u8>) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = color;
        }
    }

    /// Pixel at GL coordinates (origin bottom-left)
    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// Read back as an image with the first row at the top
    pub fn to_image(&self) -> RgbaImage {
        image::imageops::flip_vertical(&self.pixels)
    }

    /// Copy `src_rect` of `source` into `dst_rect` of `self` with bilinear
    /// filtering.
    ///
    /// Rectangles are `(x0, y0)` plus signed extents. For every destination
    /// pixel center inside `dst_rect` and inside this framebuffer, the
    /// matching source position is interpolated linearly between the source
    /// rectangle edges and sampled with edge clamping.
    pub fn blit(&mut self, dst_rect: Rect, source: &Framebuffer, src_rect: Rect) {
        if dst_rect.is_degenerate() || src_rect.is_degenerate() || source.size().is_empty() {
            return;
        }

        let (dx0, dx1) = (dst_rect.x as f64, (dst_rect.x + dst_rect.width) as f64);
        let (dy0, dy1) = (dst_rect.y as f64, (dst_rect.y + dst_rect.height) as f64);
        let (sx0, sx1) = (src_rect.x as f64, (src_rect.x + src_rect.width) as f64);
        let (sy0, sy1) = (src_rect.y as f64, (src_rect.y + src_rect.height) as f64);

        let width = self.pixels.width() as i64;
        let height = self.pixels.height() as i64;
        let x_range = (dx0.min(dx1) as i64).max(0)..(dx0.max(dx1) as i64).min(width);
        let y_range = (dy0.min(dy1) as i64).max(0)..(dy0.max(dy1) as i64).min(height);

        for py in y_range {
            let t = (py as f64 + 0.5 - dy0) / (dy1 - dy0);
            let sy = sy0 + t * (sy1 - sy0);
            for px in x_range.clone() {
                let s = (px as f64 + 0.5 - dx0) / (dx1 - dx0);
                let sx = sx0 + s * (sx1 - sx0);
                let sample = source.sample_bilinear(sx, sy);
                self.pixels.put_pixel(px as u32, py as u32, sample);
            }
        }
    }

    /// Bilinear sample at a continuous position where pixel `i` covers
    /// `[i, i + 1)`
    fn sample_bilinear(&self, x: f64, y: f64) -> Rgba<u8> {
        let max_x = self.pixels.width() as i64 - 1;
        let max_y = self.pixels.height() as i64 - 1;

        let u = x - 0.5;
        let v = y - 0.5;
        let fx = u - u.floor();
        let fy = v - v.floor();
        let x0 = (u.floor() as i64).clamp(0, max_x) as u32;
        let x1 = (u.floor() as i64 + 1).clamp(0, max_x) as u32;
        let y0 = (v.floor() as i64).clamp(0, max_y) as u32;
        let y1 = (v.floor() as i64 + 1).clamp(0, max_y) as u32;

        let p00 = self.pixels.get_pixel(x0, y0).0;
        let p10 = self.pixels.get_pixel(x1, y0).0;
        let p01 = self.pixels.get_pixel(x0, y1).0;
        let p11 = self.pixels.get_pixel(x1, y1).0;

        let mut out = [0u8; 4];
        for c in 0..4 {
            let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
            let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
            out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
        Rgba(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// 2x2 image, top row red, bottom row blue
    fn two_band_image() -> RgbaImage {
        RgbaImage::from_fn(2, 2, |_, y| if y == 0 { RED } else { BLUE })
    }

    #[test]
    fn test_upload_and_read_back_preserve_orientation() {
        let mut fb = Framebuffer::new(FrameSize::new(2, 2));
        fb.upload(&two_band_image());

        // First image row lands at GL y = 0
        assert_eq!(fb.pixel(0, 0), RED);
        assert_eq!(fb.to_image(), image::imageops::flip_vertical(&two_band_image()));
    }

    #[test]
    fn test_identity_blit_copies_pixels() {
        let mut source = Framebuffer::new(FrameSize::new(2, 2));
        source.upload(&two_band_image());
        let mut target = Framebuffer::new(FrameSize::new(2, 2));

        target.blit(Rect::new(0, 0, 2, 2), &source, Rect::new(0, 0, 2, 2));

        assert_eq!(target, source);
    }

    #[test]
    fn test_inverted_source_flips_rows() {
        let mut source = Framebuffer::new(FrameSize::new(2, 2));
        source.upload(&two_band_image());
        let mut target = Framebuffer::new(FrameSize::new(2, 2));

        target.blit(Rect::new(0, 0, 2, 2), &source, Rect::new(0, 2, 2, -2));

        assert_eq!(target.pixel(0, 0), BLUE);
        assert_eq!(target.pixel(1, 1), RED);
        assert_eq!(target.to_image(), two_band_image());
    }

    #[test]
    fn test_blit_upscales_uniform_color() {
        let mut source = Framebuffer::new(FrameSize::new(1, 1));
        source.clear(RED);
        let mut target = Framebuffer::new(FrameSize::new(4, 4));

        target.blit(Rect::new(1, 1, 2, 2), &source, Rect::new(0, 0, 1, 1));

        assert_eq!(target.pixel(1, 1), RED);
        assert_eq!(target.pixel(2, 2), RED);
        assert_eq!(target.pixel(0, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(target.pixel(3, 3), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_blit_clips_to_target() {
        let mut source = Framebuffer::new(FrameSize::new(2, 2));
        source.clear(BLUE);
        let mut target = Framebuffer::new(FrameSize::new(2, 2));

        target.blit(Rect::new(-4, -4, 10, 10), &source, Rect::new(0, 0, 2, 2));

        assert_eq!(target.pixel(0, 0), BLUE);
        assert_eq!(target.pixel(1, 1), BLUE);
    }

    #[test]
    fn test_context_ids_are_unique() {
        assert_ne!(RenderContext::new().id(), RenderContext::new().id());
    }
}
