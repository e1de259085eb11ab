// SPDX-License-Identifier: GPL-3.0-only

//! Where each selected source lands in a composited surface
//!
//! The primary source (index 0) fills the destination; every further source
//! is drawn picture-in-picture into the slot with its index, positioned
//! relative to the primary's destination rectangle.

use std::collections::HashMap;

use tracing::warn;

use crate::backends::camera::types::VideoSourceDescriptor;
use crate::constants::placement::{DEFAULT_SLOT_POSITIONS, SLOT_SEPARATOR};
use crate::geometry::{FrameSize, Rect, RectF, SizeF, Transform, transform_from_viewport};

/// One entry of the slot table: a rectangle relative to the primary
/// destination, in `[0, 1]` units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotPlacement {
    pub index: usize,
    pub rect: RectF,
}

impl SlotPlacement {
    /// Parse `"x;y;width;height"`
    pub fn parse(index: usize, entry: &str) -> Option<Self> {
        let values: Vec<f64> = entry
            .split(SLOT_SEPARATOR)
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match values.as_slice() {
            [x, y, width, height] => Some(Self {
                index,
                rect: RectF::new(*x, *y, *width, *height),
            }),
            _ => None,
        }
    }
}

/// The picture-in-picture slot table
#[derive(Debug, Clone, PartialEq)]
pub struct SlotTable {
    slots: Vec<SlotPlacement>,
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::from_config(&[])
    }
}

impl SlotTable {
    /// Build from configured entries. Missing or malformed entries fall back
    /// to the default for that slot.
    pub fn from_config(entries: &[String]) -> Self {
        let slots = DEFAULT_SLOT_POSITIONS
            .iter()
            .enumerate()
            .map(|(index, default)| {
                let fallback = || {
                    SlotPlacement::parse(index, default)
                        .unwrap_or(SlotPlacement {
                            index,
                            rect: RectF::unit(),
                        })
                };
                match entries.get(index) {
                    Some(entry) => SlotPlacement::parse(index, entry).unwrap_or_else(|| {
                        warn!(slot = index, entry = %entry, "Malformed slot position, using default");
                        fallback()
                    }),
                    None => fallback(),
                }
            })
            .collect();
        Self { slots }
    }

    pub fn get(&self, index: usize) -> Option<&SlotPlacement> {
        self.slots.get(index)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Source rectangle in frame pixels and destination rectangle in target
/// pixels for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMapping {
    pub source: Rect,
    pub destination: Rect,
}

pub type StreamMappings = HashMap<VideoSourceDescriptor, StreamMapping>;

/// How the primary source is framed in the destination
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimaryLayout {
    /// Bounds of the destination surface
    pub widget: RectF,
    /// Part of the primary frame to draw, in frame pixels (signed)
    pub source: RectF,
    /// Rectangle that `transform` maps onto the destination
    pub transform_rect: RectF,
    pub transform: Transform,
    /// Flip the primary destination vertically inside the widget
    pub invert_destination: bool,
    /// Position secondaries inside the primary destination clipped to the
    /// widget, rather than the unclipped destination
    pub clamp_to_widget: bool,
}

impl PrimaryLayout {
    /// Show `viewport` of a `frame`-sized primary, letterboxed into `widget`.
    ///
    /// This is the framing used for the live view without zoom and for
    /// captures, so both produce identical layouts.
    pub fn from_viewport(viewport: RectF, frame: FrameSize, widget: RectF) -> Option<Self> {
        let mut viewport = viewport;
        let transform = transform_from_viewport(&mut viewport, frame.to_f(), &widget)?;
        let frame_rect = viewport.denormalized(frame.to_f());
        let viewport_size = frame_rect.size();

        Some(Self {
            widget,
            source: frame_rect,
            transform_rect: RectF::from_size(viewport_size),
            transform,
            invert_destination: true,
            clamp_to_widget: false,
        })
    }

    /// Show the whole primary frame through a zoom/pan `transform` into
    /// `widget`. Secondaries are positioned inside the visible part.
    pub fn from_transform(frame: FrameSize, widget: RectF, transform: Transform) -> Self {
        let full = RectF::from_size(frame.to_f());
        Self {
            widget,
            source: full.inverted_y(frame.height as f64),
            transform_rect: full,
            transform,
            invert_destination: false,
            clamp_to_widget: true,
        }
    }
}

/// Compute the mapping of every selected source.
///
/// `sources` lists the selection in order with each source's current frame
/// size; sources without a valid size are left out. Sources beyond the slot
/// table are skipped with a warning.
pub fn stream_mappings(
    sources: &[(VideoSourceDescriptor, FrameSize)],
    slots: &SlotTable,
    layout: &PrimaryLayout,
) -> StreamMappings {
    let mut mappings = StreamMappings::new();
    let Some((primary, _)) = sources.first() else {
        return mappings;
    };

    let destination = layout.transform.map_rect(&layout.transform_rect);
    let background = if layout.clamp_to_widget {
        destination.bounded_by(&layout.widget)
    } else {
        destination
    };

    let primary_destination = if layout.invert_destination {
        destination.inverted_y(layout.widget.height)
    } else {
        destination
    };
    mappings.insert(
        primary.clone(),
        StreamMapping {
            source: layout.source.to_rect(),
            destination: primary_destination.to_rect(),
        },
    );

    for (index, (descriptor, frame)) in sources.iter().enumerate().skip(1) {
        if frame.is_empty() {
            continue;
        }
        let Some(slot) = slots.get(index) else {
            warn!(source = %descriptor, index, "No picture-in-picture slot for source");
            continue;
        };
        mappings.insert(
            descriptor.clone(),
            StreamMapping {
                source: RectF::from_size(frame.to_f())
                    .inverted_y(frame.height as f64)
                    .to_rect(),
                destination: secondary_destination(&background, &slot.rect, *frame),
            },
        );
    }

    mappings
}

/// Fit a `frame`-sized secondary into `slot` of `background`, keeping its
/// aspect ratio and anchoring it at the slot origin.
///
/// The secondary is fitted into the whole slot box rather than scaled to
/// the slot height alone, so a source wider than the slot's aspect ratio
/// stays inside its slot instead of spilling past the slot width.
fn secondary_destination(background: &RectF, slot: &RectF, frame: FrameSize) -> Rect {
    let slot_box = SizeF::new(slot.width * background.width, slot.height * background.height);
    let size = frame.to_f().scaled_to_fit(slot_box);
    Rect::new(
        background.x as i32 + (slot.x * background.width) as i32,
        background.y as i32 + (slot.y * background.height) as i32,
        size.width as i32,
        size.height as i32,
    )
}
