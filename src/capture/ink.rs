// SPDX-License-Identifier: GPL-3.0-only

//! Projecting live ink onto a captured image
//!
//! Ink is drawn on the mat screen in mat pixels. A capture of a single
//! source keeps it in mat space. A composited capture only shows the
//! viewport, so its ink is mapped from the viewport's share of the mat onto
//! the captured image scaled to fit the mat.

use crate::errors::CaptureError;
use crate::geometry::{FrameSize, PointF, RectF, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InkPoint {
    pub position: PointF,
    /// Pen width in the same units as `position`
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InkStroke {
    pub points: Vec<InkPoint>,
}

/// Strokes drawn by the operator on the live view
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InkData {
    pub strokes: Vec<InkStroke>,
}

impl InkData {
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}

/// Ink positioned for a capture asset
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InkPlacement {
    pub strokes: Vec<InkStroke>,
    /// Corners of the area the strokes are placed in
    pub corners: [PointF; 4],
}

/// Place `ink` on a capture of `captured` pixels.
///
/// With several sources the strokes are transformed from the viewport
/// region of the mat onto the captured image scaled to the mat size.
pub fn place_ink(
    ink: &InkData,
    viewport: RectF,
    captured: FrameSize,
    mat: FrameSize,
    multi_source: bool,
) -> Result<InkPlacement, CaptureError> {
    let mat_rect = RectF::from_size(mat.to_f());
    if !multi_source {
        return Ok(InkPlacement {
            strokes: ink.strokes.clone(),
            corners: mat_rect.corners(),
        });
    }

    let region = viewport.denormalized(mat.to_f());
    let source = RectF::new(
        region.x.round().max(0.0),
        region.y.round().max(0.0),
        region.width.round().min(mat.width as f64),
        region.height.round().min(mat.height as f64),
    );
    let image_on_mat = captured.scaled_to_fit(mat);
    let destination = RectF::from_size(image_on_mat.to_f());

    let transform = Transform::rect_to_rect(&source, &destination).ok_or_else(|| {
        CaptureError::InkTransform(format!(
            "viewport {:?} covers no area of the {} mat",
            viewport, mat
        ))
    })?;

    let strokes = ink
        .strokes
        .iter()
        .map(|stroke| InkStroke {
            points: stroke
                .points
                .iter()
                .map(|point| InkPoint {
                    position: transform.map_point(point.position),
                    size: point.size * transform.m22,
                })
                .collect(),
        })
        .collect();

    Ok(InkPlacement {
        strokes,
        corners: destination.corners(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_point(x: f64, y: f64, size: f64) -> InkData {
        InkData {
            strokes: vec![InkStroke {
                points: vec![InkPoint {
                    position: PointF::new(x, y),
                    size,
                }],
            }],
        }
    }

    #[test]
    fn test_single_source_keeps_mat_space() {
        let ink = single_point(100.0, 200.0, 3.0);
        let placement = place_ink(
            &ink,
            RectF::new(0.25, 0.25, 0.5, 0.5),
            FrameSize::new(800, 600),
            FrameSize::new(1920, 1280),
            false,
        )
        .unwrap();

        assert_eq!(placement.strokes, ink.strokes);
        assert_eq!(placement.corners[2], PointF::new(1920.0, 1280.0));
    }

    #[test]
    fn test_multi_source_maps_viewport_onto_image() {
        // Right half of the mat, captured at the mat's own aspect
        let ink = single_point(1440.0, 640.0, 4.0);
        let placement = place_ink(
            &ink,
            RectF::new(0.5, 0.0, 0.5, 1.0),
            FrameSize::new(960, 1280),
            FrameSize::new(1920, 1280),
            true,
        )
        .unwrap();

        let point = placement.strokes[0].points[0];
        assert_eq!(point.position, PointF::new(480.0, 640.0));
        assert_eq!(point.size, 4.0);
        assert_eq!(placement.corners[2], PointF::new(960.0, 1280.0));
    }

    #[test]
    fn test_empty_viewport_fails() {
        let result = place_ink(
            &InkData::default(),
            RectF::new(0.5, 0.5, 0.0, 0.0),
            FrameSize::new(800, 600),
            FrameSize::new(1920, 1280),
            true,
        );
        assert!(matches!(result, Err(CaptureError::InkTransform(_))));
    }
}
